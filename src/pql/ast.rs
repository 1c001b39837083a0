//! Abstract syntax tree for PQL queries.
//!
//! Every place the grammar allows "one of several shapes" is a sum type
//! with a single dispatch site: statement references, entity
//! references, relation conditions, pattern conditions, with-refs, and
//! result clauses. Synonym identity is an `Rc<Declaration>` shared by
//! every reference to the synonym within one query.

use crate::ast::{Expr, StmtId};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The design entity a synonym ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesignEnt {
    Stmt,
    Read,
    Print,
    Call,
    While,
    If,
    Assign,
    Variable,
    Constant,
    Procedure,
    ProgLine,
}

impl DesignEnt {
    /// All statement-like design entities, `prog_line` included.
    pub const STATEMENT_KINDS: [DesignEnt; 8] = [
        DesignEnt::Stmt,
        DesignEnt::Read,
        DesignEnt::Print,
        DesignEnt::Call,
        DesignEnt::While,
        DesignEnt::If,
        DesignEnt::Assign,
        DesignEnt::ProgLine,
    ];

    /// Parses a design-entity keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "stmt" => DesignEnt::Stmt,
            "read" => DesignEnt::Read,
            "print" => DesignEnt::Print,
            "call" => DesignEnt::Call,
            "while" => DesignEnt::While,
            "if" => DesignEnt::If,
            "assign" => DesignEnt::Assign,
            "variable" => DesignEnt::Variable,
            "constant" => DesignEnt::Constant,
            "procedure" => DesignEnt::Procedure,
            "prog_line" => DesignEnt::ProgLine,
            _ => return None,
        })
    }

    /// The keyword for this design entity.
    pub fn keyword(self) -> &'static str {
        match self {
            DesignEnt::Stmt => "stmt",
            DesignEnt::Read => "read",
            DesignEnt::Print => "print",
            DesignEnt::Call => "call",
            DesignEnt::While => "while",
            DesignEnt::If => "if",
            DesignEnt::Assign => "assign",
            DesignEnt::Variable => "variable",
            DesignEnt::Constant => "constant",
            DesignEnt::Procedure => "procedure",
            DesignEnt::ProgLine => "prog_line",
        }
    }

    /// Returns true if synonyms of this entity bind to statement numbers.
    pub fn is_statement_kind(self) -> bool {
        Self::STATEMENT_KINDS.contains(&self)
    }
}

impl fmt::Display for DesignEnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A synonym declaration, e.g. the `a` of `assign a;`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub name: SmolStr,
    pub ent: DesignEnt,
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ent, self.name)
    }
}

/// Shared handle to a declaration; one per synonym per query.
pub type DeclRef = Rc<Declaration>;

/// The declaration section of a query.
#[derive(Debug, Default)]
pub struct DeclarationList {
    declarations: HashMap<SmolStr, DeclRef>,
}

impl DeclarationList {
    /// Adds a declaration; returns false if the name is already taken.
    pub fn add(&mut self, name: SmolStr, ent: DesignEnt) -> bool {
        if self.declarations.contains_key(&name) {
            return false;
        }
        let decl = Rc::new(Declaration {
            name: name.clone(),
            ent,
        });
        self.declarations.insert(name, decl);
        true
    }

    /// Looks up a synonym by name.
    pub fn get(&self, name: &str) -> Option<&DeclRef> {
        self.declarations.get(name)
    }

    /// Iterates over all declarations.
    pub fn iter(&self) -> impl Iterator<Item = &DeclRef> {
        self.declarations.values()
    }

    /// Number of declared synonyms.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if no synonyms are declared.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// A statement argument of a relation: synonym, literal id, or `_`.
#[derive(Debug, Clone)]
pub enum StmtRef {
    Decl(DeclRef),
    Id(StmtId),
    Wildcard,
}

/// An entity argument of a relation: synonym, quoted name, or `_`.
#[derive(Debug, Clone)]
pub enum EntRef {
    Decl(DeclRef),
    Name(SmolStr),
    Wildcard,
}

/// One `such that` relation condition.
#[derive(Debug, Clone)]
pub enum RelCond {
    Follows(StmtRef, StmtRef),
    FollowsT(StmtRef, StmtRef),
    Parent(StmtRef, StmtRef),
    ParentT(StmtRef, StmtRef),
    Calls(EntRef, EntRef),
    CallsT(EntRef, EntRef),
    Next(StmtRef, StmtRef),
    NextT(StmtRef, StmtRef),
    NextBip(StmtRef, StmtRef),
    NextBipT(StmtRef, StmtRef),
    Affects(StmtRef, StmtRef),
    AffectsT(StmtRef, StmtRef),
    AffectsBip(StmtRef, StmtRef),
    AffectsBipT(StmtRef, StmtRef),
    UsesS(StmtRef, EntRef),
    UsesP(EntRef, EntRef),
    ModifiesS(StmtRef, EntRef),
    ModifiesP(EntRef, EntRef),
}

impl RelCond {
    /// The relation name as written in queries, for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            RelCond::Follows(..) => "Follows",
            RelCond::FollowsT(..) => "Follows*",
            RelCond::Parent(..) => "Parent",
            RelCond::ParentT(..) => "Parent*",
            RelCond::Calls(..) => "Calls",
            RelCond::CallsT(..) => "Calls*",
            RelCond::Next(..) => "Next",
            RelCond::NextT(..) => "Next*",
            RelCond::NextBip(..) => "NextBip",
            RelCond::NextBipT(..) => "NextBip*",
            RelCond::Affects(..) => "Affects",
            RelCond::AffectsT(..) => "Affects*",
            RelCond::AffectsBip(..) => "AffectsBip",
            RelCond::AffectsBipT(..) => "AffectsBip*",
            RelCond::UsesS(..) | RelCond::UsesP(..) => "Uses",
            RelCond::ModifiesS(..) | RelCond::ModifiesP(..) => "Modifies",
        }
    }
}

/// The expression part of an assign pattern: `_`, `"expr"`, or `_"expr"_`.
#[derive(Debug, Clone)]
pub struct ExprSpec {
    /// Whether the expression is surrounded by `_`s.
    pub is_subexpr: bool,
    /// The expression, if one was written.
    pub expr: Option<Expr>,
}

/// One pattern condition.
#[derive(Debug, Clone)]
pub enum PatternCond {
    /// `pattern a(entRef, exprSpec)` where `a` is an assign synonym.
    Assign {
        assign: DeclRef,
        ent: EntRef,
        spec: ExprSpec,
    },
    /// `pattern w(varRef, _)` where `w` is a while synonym.
    While { decl: DeclRef, var: EntRef },
    /// `pattern i(varRef, _, _)` where `i` is an if synonym.
    If { decl: DeclRef, var: EntRef },
}

/// An attribute of a synonym, e.g. `p.procName` or `s.stmt#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrName {
    ProcName,
    VarName,
    Value,
    StmtNum,
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrName::ProcName => write!(f, "procName"),
            AttrName::VarName => write!(f, "varName"),
            AttrName::Value => write!(f, "value"),
            AttrName::StmtNum => write!(f, "stmt#"),
        }
    }
}

impl AttrName {
    /// Returns true if `ent` synonyms carry this attribute.
    pub fn applies_to(self, ent: DesignEnt) -> bool {
        match self {
            AttrName::ProcName => matches!(ent, DesignEnt::Procedure | DesignEnt::Call),
            AttrName::VarName => {
                matches!(ent, DesignEnt::Variable | DesignEnt::Read | DesignEnt::Print)
            }
            AttrName::Value => ent == DesignEnt::Constant,
            AttrName::StmtNum => ent.is_statement_kind() && ent != DesignEnt::ProgLine,
        }
    }
}

/// A synonym together with an attribute.
#[derive(Debug, Clone)]
pub struct AttrRef {
    pub decl: DeclRef,
    pub attr: AttrName,
}

/// One element of a tuple result clause.
#[derive(Debug, Clone)]
pub enum Elem {
    Decl(DeclRef),
    Attr(AttrRef),
}

impl Elem {
    /// The declaration this element projects from.
    pub fn decl(&self) -> &DeclRef {
        match self {
            Elem::Decl(decl) => decl,
            Elem::Attr(attr) => &attr.decl,
        }
    }
}

/// The result clause of a query.
#[derive(Debug, Clone)]
pub enum ResultCl {
    /// `Select BOOLEAN`
    Bool,
    /// `Select s`, `Select s.stmt#`, or `Select <a, b, c.value>`
    Tuple(Vec<Elem>),
}

impl ResultCl {
    /// Returns true for `Select BOOLEAN`.
    pub fn is_bool(&self) -> bool {
        matches!(self, ResultCl::Bool)
    }
}

/// One side of a with-clause equality.
#[derive(Debug, Clone)]
pub enum WithRef {
    /// A bare integer literal.
    Int(StmtId),
    /// A quoted string literal.
    Str(SmolStr),
    /// A bare synonym; only `prog_line` synonyms are allowed here.
    Decl(DeclRef),
    /// An attribute reference.
    Attr(AttrRef),
}

/// One `with` condition: `ref = ref`.
#[derive(Debug, Clone)]
pub struct WithCond {
    pub lhs: WithRef,
    pub rhs: WithRef,
}

/// The select clause: result plus constraint vectors in source order.
#[derive(Debug)]
pub struct Select {
    pub result: ResultCl,
    pub relations: Vec<RelCond>,
    pub patterns: Vec<PatternCond>,
    pub withs: Vec<WithCond>,
}

/// A complete PQL query.
#[derive(Debug)]
pub struct Query {
    pub declarations: DeclarationList,
    pub select: Select,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_ent_keywords_round_trip() {
        for ent in [
            DesignEnt::Stmt,
            DesignEnt::Read,
            DesignEnt::Print,
            DesignEnt::Call,
            DesignEnt::While,
            DesignEnt::If,
            DesignEnt::Assign,
            DesignEnt::Variable,
            DesignEnt::Constant,
            DesignEnt::Procedure,
            DesignEnt::ProgLine,
        ] {
            assert_eq!(DesignEnt::from_keyword(ent.keyword()), Some(ent));
        }
        assert_eq!(DesignEnt::from_keyword("Select"), None);
    }

    #[test]
    fn statement_kinds() {
        assert!(DesignEnt::Assign.is_statement_kind());
        assert!(DesignEnt::ProgLine.is_statement_kind());
        assert!(!DesignEnt::Variable.is_statement_kind());
        assert!(!DesignEnt::Procedure.is_statement_kind());
    }

    #[test]
    fn attr_applicability() {
        assert!(AttrName::ProcName.applies_to(DesignEnt::Call));
        assert!(AttrName::ProcName.applies_to(DesignEnt::Procedure));
        assert!(!AttrName::ProcName.applies_to(DesignEnt::Assign));
        assert!(AttrName::VarName.applies_to(DesignEnt::Read));
        assert!(!AttrName::VarName.applies_to(DesignEnt::Constant));
        assert!(AttrName::Value.applies_to(DesignEnt::Constant));
        assert!(AttrName::StmtNum.applies_to(DesignEnt::While));
        assert!(!AttrName::StmtNum.applies_to(DesignEnt::Variable));
    }

    #[test]
    fn declaration_list_rejects_duplicates() {
        let mut decls = DeclarationList::default();
        assert!(decls.add("a".into(), DesignEnt::Assign));
        assert!(!decls.add("a".into(), DesignEnt::While));
        assert_eq!(decls.get("a").unwrap().ent, DesignEnt::Assign);
        assert_eq!(decls.len(), 1);
    }
}
