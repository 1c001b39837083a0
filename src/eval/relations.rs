//! The generic relation abstractor and the per-relation tables.
//!
//! Every binary design relation dispatches on the same 3×3 matrix of
//! argument shapes (`concrete`, `declaration`, `wildcard`). Three
//! mirror cases are normalised away by swapping the arguments and
//! switching to the inverse relation, leaving six branches. Relations
//! differ only in their key type (statement number or name) and in the
//! lookup functions they plug into the [`RelationSpec`].

use super::EvalError;
use super::table::{Domain, Entry, Table};
use crate::ast::StmtId;
use crate::pkb::Pkb;
use crate::pql::ast::{DeclRef, DesignEnt, EntRef, StmtRef};
use smol_str::SmolStr;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::trace;

/// A relation argument, reduced to the three shapes the dispatch
/// cares about.
pub(crate) enum Arg<K> {
    Concrete(K),
    Decl(DeclRef),
    Wildcard,
}

pub(crate) fn stmt_arg(stmt_ref: &StmtRef) -> Arg<StmtId> {
    match stmt_ref {
        StmtRef::Id(id) => Arg::Concrete(*id),
        StmtRef::Decl(decl) => Arg::Decl(decl.clone()),
        StmtRef::Wildcard => Arg::Wildcard,
    }
}

pub(crate) fn ent_arg(ent_ref: &EntRef) -> Arg<SmolStr> {
    match ent_ref {
        EntRef::Name(name) => Arg::Concrete(name.clone()),
        EntRef::Decl(decl) => Arg::Decl(decl.clone()),
        EntRef::Wildcard => Arg::Wildcard,
    }
}

/// Conversion between relation keys and table entries.
pub(crate) trait EntryKey: Clone + Eq + Hash {
    fn to_entry(&self, decl: &DeclRef) -> Entry;
    fn from_entry(entry: &Entry) -> Result<Self, EvalError>;
}

impl EntryKey for StmtId {
    fn to_entry(&self, decl: &DeclRef) -> Entry {
        Entry::stmt(decl, *self)
    }

    fn from_entry(entry: &Entry) -> Result<Self, EvalError> {
        entry.stmt_id()
    }
}

impl EntryKey for SmolStr {
    fn to_entry(&self, decl: &DeclRef) -> Entry {
        Entry::name(decl, self.clone())
    }

    fn from_entry(entry: &Entry) -> Result<Self, EvalError> {
        entry.name_value().cloned()
    }
}

/// Everything the dispatcher needs to know about one relation.
///
/// `holds`/`related` answer the relation left-to-right; the `inverse_*`
/// pair answers it right-to-left, which the mirror normalisation
/// swaps in.
pub(crate) struct RelationSpec<K: 'static> {
    pub name: &'static str,
    pub left_decl_ents: Option<&'static [DesignEnt]>,
    pub right_decl_ents: Option<&'static [DesignEnt]>,
    pub contains: fn(&Pkb, &K) -> bool,
    pub holds: fn(&Pkb, &K, &K) -> bool,
    pub inverse_holds: fn(&Pkb, &K, &K) -> bool,
    pub related: fn(&Pkb, &K) -> HashSet<K>,
    pub inverse_related: fn(&Pkb, &K) -> HashSet<K>,
    pub exists: fn(&Pkb) -> bool,
}

impl<K: EntryKey> RelationSpec<K> {
    pub(crate) fn evaluate(
        &self,
        pkb: &Pkb,
        table: &mut Table,
        mut left: Arg<K>,
        mut right: Arg<K>,
    ) -> Result<(), EvalError> {
        if let Arg::Decl(decl) = &left {
            table.add_select_decl(decl);
            self.check_decl_entity(decl, self.left_decl_ents, "first")?;
        }
        if let Arg::Decl(decl) = &right {
            table.add_select_decl(decl);
            self.check_decl_entity(decl, self.right_decl_ents, "second")?;
        }

        // normalise the three mirror cases by flipping to the inverse
        // relation; collapses nine branches to six.
        let swapped = matches!(
            (&left, &right),
            (Arg::Decl(_), Arg::Concrete(_))
                | (Arg::Wildcard, Arg::Concrete(_))
                | (Arg::Wildcard, Arg::Decl(_))
        );
        let (holds, related) = if swapped {
            std::mem::swap(&mut left, &mut right);
            (self.inverse_holds, self.inverse_related)
        } else {
            (self.holds, self.related)
        };

        match (left, right) {
            (Arg::Concrete(a), Arg::Concrete(b)) => {
                trace!(relation = self.name, "concrete/concrete");
                if !(self.contains)(pkb, &a) || !(self.contains)(pkb, &b) || !holds(pkb, &a, &b) {
                    return Err(self.always_false());
                }
                Ok(())
            }
            (Arg::Concrete(a), Arg::Decl(decl)) => {
                trace!(relation = self.name, "concrete/decl");
                if !(self.contains)(pkb, &a) {
                    return Err(self.always_false());
                }
                let mut new_domain = Domain::new();
                for entry in table.get_domain(&decl) {
                    let key = K::from_entry(&entry)?;
                    if holds(pkb, &a, &key) {
                        new_domain.insert(entry);
                    }
                }
                table.put_domain(decl, new_domain);
                Ok(())
            }
            (Arg::Decl(decl), Arg::Wildcard) => {
                trace!(relation = self.name, "decl/wildcard");
                let mut new_domain = Domain::new();
                for entry in table.get_domain(&decl) {
                    let key = K::from_entry(&entry)?;
                    if !related(pkb, &key).is_empty() {
                        new_domain.insert(entry);
                    }
                }
                table.put_domain(decl, new_domain);
                Ok(())
            }
            (Arg::Decl(left_decl), Arg::Decl(right_decl)) => {
                trace!(relation = self.name, "decl/decl");
                self.evaluate_two_decls(pkb, table, left_decl, right_decl, related)
            }
            (Arg::Concrete(a), Arg::Wildcard) => {
                trace!(relation = self.name, "concrete/wildcard");
                if !(self.contains)(pkb, &a) || related(pkb, &a).is_empty() {
                    return Err(self.always_false());
                }
                Ok(())
            }
            (Arg::Wildcard, Arg::Wildcard) => {
                trace!(relation = self.name, "wildcard/wildcard");
                if !(self.exists)(pkb) {
                    return Err(self.always_false());
                }
                Ok(())
            }
            // the mirror cases were swapped away above
            _ => unreachable!("unnormalised argument combination"),
        }
    }

    /// The declaration/declaration case: intersect each left value's
    /// related set with the right domain, accumulating the join.
    fn evaluate_two_decls(
        &self,
        pkb: &Pkb,
        table: &mut Table,
        left_decl: DeclRef,
        right_decl: DeclRef,
        related: fn(&Pkb, &K) -> HashSet<K>,
    ) -> Result<(), EvalError> {
        let left_domain = table.get_domain(&left_decl);
        let right_domain = table.get_domain(&right_decl);
        let same_synonym = left_decl == right_decl;

        let mut new_left = Domain::new();
        let mut new_right = Domain::new();
        let mut pairs: HashSet<(Entry, Entry)> = HashSet::new();

        for entry in left_domain {
            let key = K::from_entry(&entry)?;
            let all_related = related(pkb, &key);
            if all_related.is_empty() {
                continue;
            }

            if same_synonym {
                // R(x, x) is the only satisfiable shape here
                if all_related.contains(&key) {
                    pairs.insert((entry.clone(), entry.clone()));
                    new_left.insert(entry);
                }
                continue;
            }

            let mut has_valid_rhs = false;
            for related_key in &all_related {
                let right_entry = related_key.to_entry(&right_decl);
                if right_domain.contains(&right_entry) {
                    pairs.insert((entry.clone(), right_entry.clone()));
                    new_right.insert(right_entry);
                    has_valid_rhs = true;
                }
            }
            if has_valid_rhs {
                new_left.insert(entry);
            }
        }

        if same_synonym {
            table.put_domain(left_decl.clone(), new_left);
            table.add_join(&left_decl, &right_decl, pairs);
        } else {
            table.put_domain(left_decl.clone(), new_left);
            table.put_domain(right_decl.clone(), new_right);
            table.add_join(&left_decl, &right_decl, pairs);
        }
        Ok(())
    }

    fn check_decl_entity(
        &self,
        decl: &DeclRef,
        required: Option<&'static [DesignEnt]>,
        side: &str,
    ) -> Result<(), EvalError> {
        if let Some(allowed) = required {
            if !allowed.contains(&decl.ent) {
                return Err(EvalError::Semantic(format!(
                    "the {side} argument of {} cannot be a {} synonym",
                    self.name, decl.ent
                )));
            }
        }
        Ok(())
    }

    fn always_false(&self) -> EvalError {
        EvalError::AlwaysFalse(format!("{} clause", self.name))
    }
}

// --- relation tables ---

fn singleton(id: StmtId) -> HashSet<StmtId> {
    if id == 0 { HashSet::new() } else { HashSet::from([id]) }
}

fn stmt_contains(pkb: &Pkb, id: &StmtId) -> bool {
    pkb.has_statement(*id)
}

fn proc_contains(pkb: &Pkb, name: &SmolStr) -> bool {
    pkb.has_procedure(name)
}

fn cloned_or_empty(set: Result<&crate::pkb::StatementSet, crate::pkb::PkbError>) -> HashSet<StmtId> {
    set.map(|s| s.clone()).unwrap_or_default()
}

pub(crate) fn follows_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Follows",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_follows(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_follows(*b, *a),
        related: |pkb, a| {
            singleton(pkb.maybe_statement(*a).map_or(0, |s| s.stmt_directly_after()))
        },
        inverse_related: |pkb, a| {
            singleton(pkb.maybe_statement(*a).map_or(0, |s| s.stmt_directly_before()))
        },
        exists: Pkb::follows_relation_exists,
    }
}

pub(crate) fn follows_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Follows*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_follows_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_follows_transitive(*b, *a),
        related: |pkb, a| {
            pkb.maybe_statement(*a)
                .map(|s| s.stmts_transitively_after().clone())
                .unwrap_or_default()
        },
        inverse_related: |pkb, a| {
            pkb.maybe_statement(*a)
                .map(|s| s.stmts_transitively_before().clone())
                .unwrap_or_default()
        },
        exists: Pkb::follows_relation_exists,
    }
}

pub(crate) fn parent_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Parent",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_parent(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_parent(*b, *a),
        related: |pkb, a| {
            pkb.maybe_statement(*a)
                .map(|s| s.children().clone())
                .unwrap_or_default()
        },
        inverse_related: |pkb, a| {
            singleton(pkb.maybe_statement(*a).and_then(|s| s.parent_stmt()).unwrap_or(0))
        },
        exists: Pkb::parent_relation_exists,
    }
}

pub(crate) fn parent_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Parent*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_parent_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_parent_transitive(*b, *a),
        related: |pkb, a| {
            pkb.maybe_statement(*a)
                .map(|s| s.descendants().clone())
                .unwrap_or_default()
        },
        inverse_related: |pkb, a| {
            pkb.maybe_statement(*a)
                .map(|s| s.ancestors().clone())
                .unwrap_or_default()
        },
        exists: Pkb::parent_relation_exists,
    }
}

pub(crate) fn calls_spec() -> RelationSpec<SmolStr> {
    RelationSpec {
        name: "Calls",
        left_decl_ents: Some(&[DesignEnt::Procedure]),
        right_decl_ents: Some(&[DesignEnt::Procedure]),
        contains: proc_contains,
        holds: |pkb, a, b| pkb.is_calls(a, b),
        inverse_holds: |pkb, a, b| pkb.is_calls(b, a),
        related: |pkb, a| {
            pkb.get_procedure(a)
                .map(|p| p.calls().clone())
                .unwrap_or_default()
        },
        inverse_related: |pkb, a| {
            pkb.get_procedure(a)
                .map(|p| p.called_by().clone())
                .unwrap_or_default()
        },
        exists: Pkb::calls_relation_exists,
    }
}

pub(crate) fn calls_t_spec() -> RelationSpec<SmolStr> {
    RelationSpec {
        name: "Calls*",
        left_decl_ents: Some(&[DesignEnt::Procedure]),
        right_decl_ents: Some(&[DesignEnt::Procedure]),
        contains: proc_contains,
        holds: |pkb, a, b| pkb.is_calls_transitive(a, b),
        inverse_holds: |pkb, a, b| pkb.is_calls_transitive(b, a),
        related: |pkb, a| {
            pkb.get_procedure(a)
                .map(|p| p.all_transitive_callees().clone())
                .unwrap_or_default()
        },
        inverse_related: |pkb, a| {
            pkb.get_procedure(a)
                .map(|p| p.all_transitive_callers().clone())
                .unwrap_or_default()
        },
        exists: Pkb::calls_relation_exists,
    }
}

pub(crate) fn next_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Next",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_next(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_next(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.next_stmts(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.prev_stmts(*a)),
        exists: Pkb::next_relation_exists,
    }
}

pub(crate) fn next_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Next*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_next_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_next_transitive(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.next_stmts_transitive(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.prev_stmts_transitive(*a)),
        exists: Pkb::next_relation_exists,
    }
}

pub(crate) fn next_bip_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "NextBip",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_next_bip(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_next_bip(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.next_stmts_bip(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.prev_stmts_bip(*a)),
        exists: Pkb::next_bip_relation_exists,
    }
}

pub(crate) fn next_bip_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "NextBip*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.is_next_bip_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.is_next_bip_transitive(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.next_stmts_bip_transitive(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.prev_stmts_bip_transitive(*a)),
        exists: Pkb::next_bip_relation_exists,
    }
}

pub(crate) fn affects_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Affects",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.does_affect(*a, *b),
        inverse_holds: |pkb, a, b| pkb.does_affect(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.affected_stmts(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.affecting_stmts(*a)),
        exists: Pkb::affects_relation_exists,
    }
}

pub(crate) fn affects_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "Affects*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.does_affect_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.does_affect_transitive(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.affected_stmts_transitive(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.affecting_stmts_transitive(*a)),
        exists: Pkb::affects_relation_exists,
    }
}

pub(crate) fn affects_bip_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "AffectsBip",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.does_affect_bip(*a, *b),
        inverse_holds: |pkb, a, b| pkb.does_affect_bip(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.affected_stmts_bip(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.affecting_stmts_bip(*a)),
        exists: Pkb::affects_bip_relation_exists,
    }
}

pub(crate) fn affects_bip_t_spec() -> RelationSpec<StmtId> {
    RelationSpec {
        name: "AffectsBip*",
        left_decl_ents: None,
        right_decl_ents: None,
        contains: stmt_contains,
        holds: |pkb, a, b| pkb.does_affect_bip_transitive(*a, *b),
        inverse_holds: |pkb, a, b| pkb.does_affect_bip_transitive(*b, *a),
        related: |pkb, a| cloned_or_empty(pkb.affected_stmts_bip_transitive(*a)),
        inverse_related: |pkb, a| cloned_or_empty(pkb.affecting_stmts_bip_transitive(*a)),
        exists: Pkb::affects_bip_relation_exists,
    }
}
