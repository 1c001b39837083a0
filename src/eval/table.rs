//! Entries, domains, joins, and the query's working table.
//!
//! The working table accumulates what the clause evaluators learn: a
//! domain of candidate values per synonym, joins constraining pairs of
//! synonyms to allowed value pairs, and the set of synonyms any clause
//! touched. Projection through the [solver](super::solver) turns this
//! into the final result rows.

use super::EvalError;
use super::solver::Solver;
use crate::ast::StmtId;
use crate::pkb::Pkb;
use crate::pql::ast::{AttrName, DeclRef, DesignEnt, Elem, ResultCl};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::trace;

/// The value a synonym is bound to: a statement number for
/// statement-like synonyms, a name otherwise (variable, procedure, or
/// constant lexeme).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum EntryValue {
    Stmt(StmtId),
    Name(SmolStr),
}

/// One binding of a declaration to a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Entry {
    decl: DeclRef,
    value: EntryValue,
}

impl Entry {
    pub(crate) fn stmt(decl: &DeclRef, id: StmtId) -> Self {
        Self {
            decl: Rc::clone(decl),
            value: EntryValue::Stmt(id),
        }
    }

    pub(crate) fn name(decl: &DeclRef, name: impl Into<SmolStr>) -> Self {
        Self {
            decl: Rc::clone(decl),
            value: EntryValue::Name(name.into()),
        }
    }

    pub(crate) fn decl(&self) -> &DeclRef {
        &self.decl
    }

    pub(crate) fn stmt_id(&self) -> Result<StmtId, EvalError> {
        match &self.value {
            EntryValue::Stmt(id) => Ok(*id),
            EntryValue::Name(name) => Err(EvalError::Semantic(format!(
                "synonym '{}' binds names ('{}'), not statement numbers",
                self.decl.name, name
            ))),
        }
    }

    pub(crate) fn name_value(&self) -> Result<&SmolStr, EvalError> {
        match &self.value {
            EntryValue::Name(name) => Ok(name),
            EntryValue::Stmt(id) => Err(EvalError::Semantic(format!(
                "synonym '{}' binds statement numbers ({}), not names",
                self.decl.name, id
            ))),
        }
    }

    /// The output form: decimal for statements, the text otherwise.
    pub(crate) fn render(&self) -> String {
        match &self.value {
            EntryValue::Stmt(id) => id.to_string(),
            EntryValue::Name(name) => name.to_string(),
        }
    }
}

/// A set of candidate entries for one synonym.
pub(crate) type Domain = HashSet<Entry>;

/// A binary constraint between two synonyms: only the listed entry
/// pairs may appear together in a row. Sides are ordered by synonym
/// name so that equivalent joins compare equal regardless of the
/// clause's argument order.
#[derive(Debug, Clone)]
pub(crate) struct Join {
    id: usize,
    decl_a: DeclRef,
    decl_b: DeclRef,
    allowed: HashSet<(Entry, Entry)>,
}

impl Join {
    fn new(id: usize, decl_a: DeclRef, decl_b: DeclRef, allowed: HashSet<(Entry, Entry)>) -> Self {
        if decl_a.name <= decl_b.name {
            Self {
                id,
                decl_a,
                decl_b,
                allowed,
            }
        } else {
            Self {
                id,
                decl_a: decl_b,
                decl_b: decl_a,
                allowed: allowed
                    .into_iter()
                    .map(|(first, second)| (second, first))
                    .collect(),
            }
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn decl_a(&self) -> &DeclRef {
        &self.decl_a
    }

    pub(crate) fn decl_b(&self) -> &DeclRef {
        &self.decl_b
    }

    pub(crate) fn is_allowed(&self, first: &Entry, second: &Entry) -> bool {
        // entries are cheap to clone but the pair lookup needs owned
        // values; keep the set keyed on pairs as built.
        self.allowed
            .contains(&(first.clone(), second.clone()))
    }

    pub(crate) fn allowed(&self) -> &HashSet<(Entry, Entry)> {
        &self.allowed
    }

    pub(crate) fn allowed_mut(&mut self) -> &mut HashSet<(Entry, Entry)> {
        &mut self.allowed
    }
}

/// The working table for one query evaluation.
#[derive(Debug, Default)]
pub(crate) struct Table {
    domains: HashMap<DeclRef, Domain>,
    joins: Vec<Join>,
    select_decls: HashSet<DeclRef>,
    next_join_id: usize,
}

impl Table {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_domain(&mut self, decl: DeclRef, domain: Domain) {
        trace!(synonym = %decl.name, entries = domain.len(), "domain updated");
        self.domains.insert(decl, domain);
    }

    /// A copy of the synonym's current domain (empty if never set).
    pub(crate) fn get_domain(&self, decl: &DeclRef) -> Domain {
        self.domains.get(decl).cloned().unwrap_or_default()
    }

    pub(crate) fn add_join(
        &mut self,
        decl_a: &DeclRef,
        decl_b: &DeclRef,
        allowed: HashSet<(Entry, Entry)>,
    ) {
        self.next_join_id += 1;
        trace!(
            id = self.next_join_id,
            a = %decl_a.name,
            b = %decl_b.name,
            pairs = allowed.len(),
            "join added"
        );
        self.joins.push(Join::new(
            self.next_join_id,
            Rc::clone(decl_a),
            Rc::clone(decl_b),
            allowed,
        ));
    }

    /// Records that a clause constrained this synonym; constrained
    /// synonyms must survive the solver even when not selected.
    pub(crate) fn add_select_decl(&mut self, decl: &DeclRef) {
        self.select_decls.insert(Rc::clone(decl));
    }

    #[cfg(test)]
    pub(crate) fn joins_for_test(&self) -> Vec<Join> {
        self.joins.clone()
    }

    /// The failed result: `FALSE` for BOOLEAN queries, empty otherwise.
    pub(crate) fn failed_result(result: &ResultCl) -> Vec<String> {
        if result.is_bool() {
            vec!["FALSE".to_string()]
        } else {
            Vec::new()
        }
    }

    /// Solves the table and projects it through the result clause.
    pub(crate) fn get_result(&self, result: &ResultCl, pkb: &Pkb) -> Result<Vec<String>, EvalError> {
        let elems: &[Elem] = match result {
            ResultCl::Bool => &[],
            ResultCl::Tuple(elems) => elems,
        };
        let return_decls: HashSet<DeclRef> =
            elems.iter().map(|elem| Rc::clone(elem.decl())).collect();

        let solver = Solver::new(
            self.joins.clone(),
            self.domains.clone(),
            return_decls,
            self.select_decls.clone(),
        );

        if !solver.is_valid() {
            return Ok(Self::failed_result(result));
        }
        if result.is_bool() {
            return Ok(vec!["TRUE".to_string()]);
        }

        let return_table = solver.return_table();
        if return_table.is_empty() {
            return Ok(Self::failed_result(result));
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for row in return_table.rows() {
            let mut parts = Vec::with_capacity(elems.len());
            for elem in elems {
                let entry = row.value(elem.decl());
                let text = match elem {
                    Elem::Decl(_) => entry.render(),
                    Elem::Attr(attr_ref) => {
                        extract_attr_value(pkb, &attr_ref.decl, attr_ref.attr, entry)?.to_string()
                    }
                };
                parts.push(text);
            }
            let line = parts.join(" ");
            if seen.insert(line.clone()) {
                results.push(line);
            }
        }
        Ok(results)
    }
}

/// Resolves an attribute of a bound entry to its textual value.
///
/// `procName` on a call synonym names the callee; `varName` on a read
/// or print synonym names the variable the statement mentions; other
/// attributes read the entry's own value.
pub(crate) fn extract_attr_value(
    pkb: &Pkb,
    decl: &DeclRef,
    attr: AttrName,
    entry: &Entry,
) -> Result<SmolStr, EvalError> {
    match attr {
        AttrName::ProcName => match decl.ent {
            DesignEnt::Procedure => Ok(entry.name_value()?.clone()),
            DesignEnt::Call => {
                let stmt = pkb.get_statement(entry.stmt_id()?)?;
                stmt.callee().cloned().ok_or_else(|| {
                    EvalError::Semantic(format!(
                        "statement {} is not a call statement",
                        stmt.id()
                    ))
                })
            }
            ent => Err(EvalError::Semantic(format!(
                "procName does not apply to a {ent} synonym"
            ))),
        },
        AttrName::VarName => match decl.ent {
            DesignEnt::Variable => Ok(entry.name_value()?.clone()),
            DesignEnt::Read | DesignEnt::Print => {
                let stmt = pkb.get_statement(entry.stmt_id()?)?;
                stmt.mentioned_variable().cloned().ok_or_else(|| {
                    EvalError::Semantic(format!(
                        "statement {} does not mention a variable",
                        stmt.id()
                    ))
                })
            }
            ent => Err(EvalError::Semantic(format!(
                "varName does not apply to a {ent} synonym"
            ))),
        },
        AttrName::Value => Ok(entry.name_value()?.clone()),
        AttrName::StmtNum => Ok(SmolStr::from(entry.stmt_id()?.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pql::ast::Declaration;

    fn decl(name: &str, ent: DesignEnt) -> DeclRef {
        Rc::new(Declaration {
            name: name.into(),
            ent,
        })
    }

    #[test]
    fn entry_accessors_enforce_kind() {
        let s = decl("s", DesignEnt::Stmt);
        let v = decl("v", DesignEnt::Variable);

        let stmt_entry = Entry::stmt(&s, 3);
        assert_eq!(stmt_entry.stmt_id().unwrap(), 3);
        assert!(stmt_entry.name_value().is_err());
        assert_eq!(stmt_entry.render(), "3");

        let name_entry = Entry::name(&v, "x");
        assert_eq!(name_entry.name_value().unwrap(), "x");
        assert!(name_entry.stmt_id().is_err());
        assert_eq!(name_entry.render(), "x");
    }

    #[test]
    fn join_orders_sides_by_name() {
        let a = decl("a", DesignEnt::Assign);
        let z = decl("z", DesignEnt::Stmt);

        let mut pairs = HashSet::new();
        pairs.insert((Entry::stmt(&z, 1), Entry::stmt(&a, 2)));
        let join = Join::new(1, Rc::clone(&z), Rc::clone(&a), pairs);

        assert_eq!(join.decl_a().name, "a");
        assert_eq!(join.decl_b().name, "z");
        assert!(join.is_allowed(&Entry::stmt(&a, 2), &Entry::stmt(&z, 1)));
        assert!(!join.is_allowed(&Entry::stmt(&a, 2), &Entry::stmt(&z, 2)));
    }

    #[test]
    fn table_domains_default_empty() {
        let table = Table::new();
        let s = decl("s", DesignEnt::Stmt);
        assert!(table.get_domain(&s).is_empty());
    }

    #[test]
    fn failed_result_shape() {
        assert_eq!(Table::failed_result(&ResultCl::Bool), vec!["FALSE"]);
        assert!(Table::failed_result(&ResultCl::Tuple(Vec::new())).is_empty());
    }
}
