//! The Program Knowledge Base.
//!
//! A [`Pkb`] is the set of pre-computed design relations of one SIMPLE
//! program: per-statement records (Follows/Parent closures, uses and
//! modifies sets, condition variables, control-flow memo slots),
//! per-procedure records (call graph and its closures), per-variable
//! records, global indexes, and the control-flow graph. It is built in
//! one pass by the [`extractor`] and is logically immutable afterwards;
//! the only writes the evaluator performs go through the write-once
//! memo slots on statement records.

pub mod cfg;
pub mod extractor;

use crate::ast::{self, Expr, StmtId};
use crate::pql::ast::DesignEnt;
use cfg::Cfg;
use smol_str::SmolStr;
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

pub use extractor::extract;

/// A set of statement numbers.
pub type StatementSet = HashSet<StmtId>;
/// A set of variable or procedure names.
pub type NameSet = HashSet<SmolStr>;

/// Errors raised by the extractor and by PKB accessors.
///
/// Extractor variants are fatal for the whole session; accessor
/// variants surface when a query refers to entities the program does
/// not have, and are contained by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PkbError {
    DuplicateProcedure(SmolStr),
    UndefinedProcedure(SmolStr),
    CyclicCalls,
    StmtOutOfRange(StmtId),
    UnknownProcedure(SmolStr),
    UnknownVariable(SmolStr),
}

impl fmt::Display for PkbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkbError::DuplicateProcedure(name) => {
                write!(f, "duplicate definition of procedure '{name}'")
            }
            PkbError::UndefinedProcedure(name) => {
                write!(f, "call to undefined procedure '{name}'")
            }
            PkbError::CyclicCalls => write!(f, "illegal cyclic/recursive call"),
            PkbError::StmtOutOfRange(id) => {
                write!(f, "statement number {id} is out of range")
            }
            PkbError::UnknownProcedure(name) => write!(f, "procedure '{name}' does not exist"),
            PkbError::UnknownVariable(name) => write!(f, "variable '{name}' does not exist"),
        }
    }
}

impl std::error::Error for PkbError {}

/// Write-once memo slots for CFG-derived statement sets.
///
/// One slot per relation and direction; the evaluator fills a slot the
/// first time it needs it and reads it ever after. Single-threaded by
/// construction, per the engine's execution model.
#[derive(Debug, Default)]
pub struct CfgCaches {
    pub(crate) next: OnceCell<StatementSet>,
    pub(crate) next_t: OnceCell<StatementSet>,
    pub(crate) prev: OnceCell<StatementSet>,
    pub(crate) prev_t: OnceCell<StatementSet>,
    pub(crate) next_bip: OnceCell<StatementSet>,
    pub(crate) next_bip_t: OnceCell<StatementSet>,
    pub(crate) prev_bip: OnceCell<StatementSet>,
    pub(crate) prev_bip_t: OnceCell<StatementSet>,
    pub(crate) affected: OnceCell<StatementSet>,
    pub(crate) affecting: OnceCell<StatementSet>,
    pub(crate) affected_t: OnceCell<StatementSet>,
    pub(crate) affecting_t: OnceCell<StatementSet>,
    pub(crate) affected_bip: OnceCell<StatementSet>,
    pub(crate) affecting_bip: OnceCell<StatementSet>,
    pub(crate) affected_bip_t: OnceCell<StatementSet>,
    pub(crate) affecting_bip_t: OnceCell<StatementSet>,
}

/// Per-statement record.
#[derive(Debug)]
pub struct Statement {
    pub(crate) ast: Rc<ast::Stmt>,
    pub(crate) proc: SmolStr,

    pub(crate) directly_before: StmtId,
    pub(crate) directly_after: StmtId,
    pub(crate) before: StatementSet,
    pub(crate) after: StatementSet,

    pub(crate) parent: Option<StmtId>,
    pub(crate) children: StatementSet,
    pub(crate) ancestors: StatementSet,
    pub(crate) descendants: StatementSet,

    pub(crate) uses: NameSet,
    pub(crate) modifies: NameSet,
    pub(crate) condition_uses: NameSet,

    pub(crate) caches: CfgCaches,
}

impl Statement {
    pub(crate) fn new(ast: Rc<ast::Stmt>, proc: SmolStr) -> Self {
        Self {
            ast,
            proc,
            directly_before: 0,
            directly_after: 0,
            before: StatementSet::new(),
            after: StatementSet::new(),
            parent: None,
            children: StatementSet::new(),
            ancestors: StatementSet::new(),
            descendants: StatementSet::new(),
            uses: NameSet::new(),
            modifies: NameSet::new(),
            condition_uses: NameSet::new(),
            caches: CfgCaches::default(),
        }
    }

    /// The statement's 1-based number.
    pub fn id(&self) -> StmtId {
        self.ast.id.get()
    }

    /// The AST node this record describes.
    pub fn ast_stmt(&self) -> &ast::Stmt {
        &self.ast
    }

    /// Name of the enclosing procedure.
    pub fn proc_name(&self) -> &SmolStr {
        &self.proc
    }

    // --- Follows ---

    pub fn has_follower(&self) -> bool {
        self.directly_after != 0
    }

    pub fn is_follower(&self) -> bool {
        self.directly_before != 0
    }

    /// Follows(id, self)?
    pub fn follows(&self, id: StmtId) -> bool {
        self.directly_before == id && id != 0
    }

    /// Follows*(id, self)?
    pub fn follows_transitively(&self, id: StmtId) -> bool {
        self.before.contains(&id)
    }

    /// Follows(self, id)?
    pub fn is_followed_by(&self, id: StmtId) -> bool {
        self.directly_after == id && id != 0
    }

    /// Follows*(self, id)?
    pub fn is_followed_transitively_by(&self, id: StmtId) -> bool {
        self.after.contains(&id)
    }

    pub fn stmt_directly_after(&self) -> StmtId {
        self.directly_after
    }

    pub fn stmt_directly_before(&self) -> StmtId {
        self.directly_before
    }

    pub fn stmts_transitively_after(&self) -> &StatementSet {
        &self.after
    }

    pub fn stmts_transitively_before(&self) -> &StatementSet {
        &self.before
    }

    // --- Parent ---

    pub fn parent_stmt(&self) -> Option<StmtId> {
        self.parent
    }

    pub fn is_parent_of(&self, id: StmtId) -> bool {
        self.children.contains(&id)
    }

    pub fn is_ancestor_of(&self, id: StmtId) -> bool {
        self.descendants.contains(&id)
    }

    pub fn is_child_of(&self, id: StmtId) -> bool {
        self.parent == Some(id)
    }

    pub fn is_descendant_of(&self, id: StmtId) -> bool {
        self.ancestors.contains(&id)
    }

    pub fn children(&self) -> &StatementSet {
        &self.children
    }

    pub fn descendants(&self) -> &StatementSet {
        &self.descendants
    }

    pub fn ancestors(&self) -> &StatementSet {
        &self.ancestors
    }

    // --- Uses / Modifies ---

    pub fn uses_variable(&self, var: &str) -> bool {
        self.uses.contains(var)
    }

    pub fn modifies_variable(&self, var: &str) -> bool {
        self.modifies.contains(var)
    }

    pub fn used_variables(&self) -> &NameSet {
        &self.uses
    }

    pub fn modified_variables(&self) -> &NameSet {
        &self.modifies
    }

    /// Variables appearing in the controlling condition of an if/while.
    pub fn condition_variables(&self) -> &NameSet {
        &self.condition_uses
    }

    // --- kind helpers ---

    /// The design entity of this statement's kind.
    pub fn design_ent(&self) -> DesignEnt {
        match &self.ast.kind {
            ast::StmtKind::Assign { .. } => DesignEnt::Assign,
            ast::StmtKind::Read { .. } => DesignEnt::Read,
            ast::StmtKind::Print { .. } => DesignEnt::Print,
            ast::StmtKind::Call { .. } => DesignEnt::Call,
            ast::StmtKind::If { .. } => DesignEnt::If,
            ast::StmtKind::While { .. } => DesignEnt::While,
        }
    }

    /// LHS variable and RHS expression, if this is an assignment.
    pub fn assign_parts(&self) -> Option<(&SmolStr, &Expr)> {
        match &self.ast.kind {
            ast::StmtKind::Assign { lhs, rhs } => Some((lhs, rhs)),
            _ => None,
        }
    }

    /// Callee name, if this is a call statement.
    pub fn callee(&self) -> Option<&SmolStr> {
        match &self.ast.kind {
            ast::StmtKind::Call { proc } => Some(proc),
            _ => None,
        }
    }

    /// The variable mentioned by a read or print statement.
    pub fn mentioned_variable(&self) -> Option<&SmolStr> {
        match &self.ast.kind {
            ast::StmtKind::Read { var } | ast::StmtKind::Print { var } => Some(var),
            _ => None,
        }
    }
}

/// Per-procedure record.
#[derive(Debug, Default)]
pub struct Procedure {
    pub(crate) uses: NameSet,
    pub(crate) modifies: NameSet,
    pub(crate) calls: NameSet,
    pub(crate) called_by: NameSet,
    pub(crate) calls_transitive: NameSet,
    pub(crate) called_by_transitive: NameSet,
    /// Ids of call statements targeting this procedure.
    pub(crate) call_stmts: StatementSet,
}

impl Procedure {
    pub fn uses_variable(&self, var: &str) -> bool {
        self.uses.contains(var)
    }

    pub fn modifies_variable(&self, var: &str) -> bool {
        self.modifies.contains(var)
    }

    pub fn used_variables(&self) -> &NameSet {
        &self.uses
    }

    pub fn modified_variables(&self) -> &NameSet {
        &self.modifies
    }

    pub fn calls(&self) -> &NameSet {
        &self.calls
    }

    pub fn called_by(&self) -> &NameSet {
        &self.called_by
    }

    pub fn all_transitive_callees(&self) -> &NameSet {
        &self.calls_transitive
    }

    pub fn all_transitive_callers(&self) -> &NameSet {
        &self.called_by_transitive
    }

    /// Call statements whose callee is this procedure.
    pub fn call_stmts(&self) -> &StatementSet {
        &self.call_stmts
    }
}

/// Per-variable record.
#[derive(Debug, Default)]
pub struct Variable {
    pub(crate) used_by: StatementSet,
    pub(crate) modified_by: StatementSet,
    pub(crate) used_by_procs: NameSet,
    pub(crate) modified_by_procs: NameSet,
    pub(crate) read_stmts: StatementSet,
    pub(crate) print_stmts: StatementSet,
}

impl Variable {
    pub fn used_by(&self) -> &StatementSet {
        &self.used_by
    }

    pub fn modified_by(&self) -> &StatementSet {
        &self.modified_by
    }

    pub fn used_by_procs(&self) -> &NameSet {
        &self.used_by_procs
    }

    pub fn modified_by_procs(&self) -> &NameSet {
        &self.modified_by_procs
    }

    pub fn read_stmts(&self) -> &StatementSet {
        &self.read_stmts
    }

    pub fn print_stmts(&self) -> &StatementSet {
        &self.print_stmts
    }
}

/// The knowledge base itself.
#[derive(Debug)]
pub struct Pkb {
    /// The program AST; statement records alias its nodes through `Rc`.
    pub(crate) program: ast::Program,
    pub(crate) statements: Vec<Statement>,
    pub(crate) procedures: HashMap<SmolStr, Procedure>,
    pub(crate) variables: HashMap<SmolStr, Variable>,
    pub(crate) constants: NameSet,
    pub(crate) stmt_kinds: HashMap<DesignEnt, StatementSet>,
    pub(crate) follows_exists: bool,
    pub(crate) parent_exists: bool,
    pub(crate) calls_exists: bool,
    pub(crate) cfg: Cfg,
}

impl Pkb {
    /// The program this knowledge base was extracted from.
    pub fn program(&self) -> &ast::Program {
        &self.program
    }

    /// Total number of statements.
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Looks up a statement record by number.
    pub fn get_statement(&self, id: StmtId) -> Result<&Statement, PkbError> {
        if id == 0 || id > self.statements.len() {
            return Err(PkbError::StmtOutOfRange(id));
        }
        Ok(&self.statements[id - 1])
    }

    /// Like [`Pkb::get_statement`], but without the error.
    pub fn maybe_statement(&self, id: StmtId) -> Option<&Statement> {
        if id == 0 { None } else { self.statements.get(id - 1) }
    }

    /// Returns true if `id` is a valid statement number.
    pub fn has_statement(&self, id: StmtId) -> bool {
        id >= 1 && id <= self.statements.len()
    }

    pub fn get_procedure(&self, name: &str) -> Result<&Procedure, PkbError> {
        self.procedures
            .get(name)
            .ok_or_else(|| PkbError::UnknownProcedure(name.into()))
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn get_variable(&self, name: &str) -> Result<&Variable, PkbError> {
        self.variables
            .get(name)
            .ok_or_else(|| PkbError::UnknownVariable(name.into()))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn all_statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn all_procedures(&self) -> &HashMap<SmolStr, Procedure> {
        &self.procedures
    }

    pub fn all_variables(&self) -> &HashMap<SmolStr, Variable> {
        &self.variables
    }

    pub fn all_constants(&self) -> &NameSet {
        &self.constants
    }

    /// Statement numbers whose kind matches the design entity.
    pub fn statements_of_kind(&self, ent: DesignEnt) -> impl Iterator<Item = StmtId> + '_ {
        self.stmt_kinds.get(&ent).into_iter().flatten().copied()
    }

    /// Membership test for [`Pkb::statements_of_kind`].
    pub fn statement_is_kind(&self, id: StmtId, ent: DesignEnt) -> bool {
        self.stmt_kinds
            .get(&ent)
            .is_some_and(|set| set.contains(&id))
    }

    // --- relation existence (for the wildcard-wildcard case) ---

    pub fn follows_relation_exists(&self) -> bool {
        self.follows_exists
    }

    pub fn parent_relation_exists(&self) -> bool {
        self.parent_exists
    }

    pub fn calls_relation_exists(&self) -> bool {
        self.calls_exists
    }

    // --- Follows / Parent convenience used by the evaluator ---

    pub fn is_follows(&self, before: StmtId, after: StmtId) -> bool {
        self.maybe_statement(after)
            .is_some_and(|stmt| stmt.follows(before))
    }

    pub fn is_follows_transitive(&self, before: StmtId, after: StmtId) -> bool {
        self.maybe_statement(after)
            .is_some_and(|stmt| stmt.follows_transitively(before))
    }

    pub fn is_parent(&self, parent: StmtId, child: StmtId) -> bool {
        self.maybe_statement(child)
            .is_some_and(|stmt| stmt.is_child_of(parent))
    }

    pub fn is_parent_transitive(&self, ancestor: StmtId, descendant: StmtId) -> bool {
        self.maybe_statement(descendant)
            .is_some_and(|stmt| stmt.is_descendant_of(ancestor))
    }

    // --- Uses / Modifies convenience ---

    pub fn stmt_uses(&self, id: StmtId, var: &str) -> bool {
        self.maybe_statement(id).is_some_and(|s| s.uses_variable(var))
    }

    pub fn stmt_modifies(&self, id: StmtId, var: &str) -> bool {
        self.maybe_statement(id)
            .is_some_and(|s| s.modifies_variable(var))
    }

    pub fn proc_uses(&self, name: &str, var: &str) -> bool {
        self.procedures
            .get(name)
            .is_some_and(|p| p.uses_variable(var))
    }

    pub fn proc_modifies(&self, name: &str, var: &str) -> bool {
        self.procedures
            .get(name)
            .is_some_and(|p| p.modifies_variable(var))
    }

    // --- Calls convenience ---

    pub fn is_calls(&self, caller: &str, callee: &str) -> bool {
        self.procedures
            .get(caller)
            .is_some_and(|p| p.calls.contains(callee))
    }

    pub fn is_calls_transitive(&self, caller: &str, callee: &str) -> bool {
        self.procedures
            .get(caller)
            .is_some_and(|p| p.calls_transitive.contains(callee))
    }
}
