//! Abstract syntax tree for SIMPLE programs.
//!
//! The tree is plain owned data: a program owns its procedures, each
//! procedure owns its body, and statement lists hold their statements
//! behind `Rc` so the knowledge base can keep cheap handles to them
//! without back-pointers. Statement ids are assigned by the design
//! extractor's numbering phase and live in a `Cell` on the node; they
//! are 1-based and dense over the whole program.

pub mod matcher;

use smol_str::SmolStr;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A byte range into source text.
pub type Span = std::ops::Range<usize>;

/// 1-based statement number; 0 means "none".
pub type StmtId = usize;

/// A binary operator in a SIMPLE expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinOp {
    /// Returns true for `<`, `>`, `<=`, `>=`, `==`, `!=`.
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Eq | BinOp::NotEq
        )
    }

    /// Returns true for `&&` and `||`.
    pub fn is_conditional(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "<=",
            BinOp::GtEq => ">=",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{text}")
    }
}

/// A unary operator in a SIMPLE expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!")
    }
}

/// A SIMPLE expression: variable reference, constant, or operator node.
///
/// Constants keep their lexeme; SIMPLE rejects leading zeros at lex
/// time, so lexeme equality coincides with numeric equality for
/// accepted programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var(SmolStr),
    Const(SmolStr),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Unary { op, operand } => write!(f, "{op}({operand})"),
        }
    }
}

/// A list of statements, e.g. a procedure body or an if/while branch.
///
/// Statement lists are non-empty in any tree the parser produces.
#[derive(Debug, Clone, Default)]
pub struct StmtList {
    pub stmts: Vec<Rc<Stmt>>,
}

impl StmtList {
    /// The statement id of the first statement in this list.
    pub fn first_id(&self) -> StmtId {
        self.stmts.first().map(|s| s.id.get()).unwrap_or(0)
    }
}

/// A single SIMPLE statement.
#[derive(Debug)]
pub struct Stmt {
    /// 1-based statement number, assigned by the design extractor.
    pub id: Cell<StmtId>,
    pub kind: StmtKind,
}

impl Stmt {
    /// Creates an unnumbered statement.
    pub fn new(kind: StmtKind) -> Self {
        Self {
            id: Cell::new(0),
            kind,
        }
    }
}

/// The kind of a statement, together with its kind-specific payload.
#[derive(Debug)]
pub enum StmtKind {
    Assign {
        lhs: SmolStr,
        rhs: Expr,
    },
    Read {
        var: SmolStr,
    },
    Print {
        var: SmolStr,
    },
    Call {
        proc: SmolStr,
    },
    If {
        cond: Expr,
        then_body: StmtList,
        else_body: StmtList,
    },
    While {
        cond: Expr,
        body: StmtList,
    },
}

/// A procedure definition.
#[derive(Debug)]
pub struct Procedure {
    pub name: SmolStr,
    pub body: StmtList,
}

/// A whole SIMPLE program: one or more procedures in source order.
#[derive(Debug, Default)]
pub struct Program {
    pub procedures: Vec<Procedure>,
}
