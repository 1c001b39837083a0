//! Uses/Modifies evaluation.
//!
//! These two relations do not fit the symmetric abstractor: the sides
//! have different entity types (a statement or procedure on the left, a
//! variable on the right) and a wildcard on the left is semantically
//! invalid rather than merely unconstrained. A small specialisation
//! handles the six remaining argument-shape combinations, generic over
//! whether the subject is a statement number or a procedure name.

use super::EvalError;
use super::relations::{Arg, EntryKey, ent_arg, stmt_arg};
use super::table::{Domain, Entry, Table};
use crate::ast::StmtId;
use crate::pkb::{NameSet, Pkb};
use crate::pql::ast::{DesignEnt, EntRef, StmtRef};
use smol_str::SmolStr;
use std::collections::HashSet;
use tracing::trace;

/// The subject side of a Uses/Modifies relation.
struct SubjectSpec<K: 'static> {
    name: &'static str,
    contains: fn(&Pkb, &K) -> bool,
    has_var: fn(&Pkb, &K, &str) -> bool,
    vars_of: fn(&Pkb, &K) -> NameSet,
    decl_ent_ok: fn(DesignEnt) -> bool,
}

pub(crate) fn eval_uses_s(
    pkb: &Pkb,
    table: &mut Table,
    user: &StmtRef,
    ent: &EntRef,
) -> Result<(), EvalError> {
    let spec = SubjectSpec::<StmtId> {
        name: "Uses",
        contains: |pkb, id| pkb.has_statement(*id),
        has_var: |pkb, id, var| pkb.stmt_uses(*id, var),
        vars_of: |pkb, id| {
            pkb.maybe_statement(*id)
                .map(|s| s.used_variables().clone())
                .unwrap_or_default()
        },
        decl_ent_ok: DesignEnt::is_statement_kind,
    };
    spec.evaluate(pkb, table, stmt_arg(user), ent_arg(ent))
}

pub(crate) fn eval_uses_p(
    pkb: &Pkb,
    table: &mut Table,
    user: &EntRef,
    ent: &EntRef,
) -> Result<(), EvalError> {
    let spec = SubjectSpec::<SmolStr> {
        name: "Uses",
        contains: |pkb, name| pkb.has_procedure(name),
        has_var: |pkb, name, var| pkb.proc_uses(name, var),
        vars_of: |pkb, name| {
            pkb.get_procedure(name)
                .map(|p| p.used_variables().clone())
                .unwrap_or_default()
        },
        decl_ent_ok: |ent| ent == DesignEnt::Procedure,
    };
    spec.evaluate(pkb, table, ent_arg(user), ent_arg(ent))
}

pub(crate) fn eval_modifies_s(
    pkb: &Pkb,
    table: &mut Table,
    modifier: &StmtRef,
    ent: &EntRef,
) -> Result<(), EvalError> {
    let spec = SubjectSpec::<StmtId> {
        name: "Modifies",
        contains: |pkb, id| pkb.has_statement(*id),
        has_var: |pkb, id, var| pkb.stmt_modifies(*id, var),
        vars_of: |pkb, id| {
            pkb.maybe_statement(*id)
                .map(|s| s.modified_variables().clone())
                .unwrap_or_default()
        },
        decl_ent_ok: DesignEnt::is_statement_kind,
    };
    spec.evaluate(pkb, table, stmt_arg(modifier), ent_arg(ent))
}

pub(crate) fn eval_modifies_p(
    pkb: &Pkb,
    table: &mut Table,
    modifier: &EntRef,
    ent: &EntRef,
) -> Result<(), EvalError> {
    let spec = SubjectSpec::<SmolStr> {
        name: "Modifies",
        contains: |pkb, name| pkb.has_procedure(name),
        has_var: |pkb, name, var| pkb.proc_modifies(name, var),
        vars_of: |pkb, name| {
            pkb.get_procedure(name)
                .map(|p| p.modified_variables().clone())
                .unwrap_or_default()
        },
        decl_ent_ok: |ent| ent == DesignEnt::Procedure,
    };
    spec.evaluate(pkb, table, ent_arg(modifier), ent_arg(ent))
}

impl<K: EntryKey> SubjectSpec<K> {
    fn evaluate(
        &self,
        pkb: &Pkb,
        table: &mut Table,
        subject: Arg<K>,
        variable: Arg<SmolStr>,
    ) -> Result<(), EvalError> {
        if matches!(subject, Arg::Wildcard) {
            return Err(EvalError::Semantic(format!(
                "the first argument of {} cannot be a wildcard",
                self.name
            )));
        }
        if let Arg::Decl(decl) = &subject {
            table.add_select_decl(decl);
            if !(self.decl_ent_ok)(decl.ent) {
                return Err(EvalError::Semantic(format!(
                    "the first argument of {} cannot be a {} synonym",
                    self.name, decl.ent
                )));
            }
        }
        if let Arg::Decl(decl) = &variable {
            table.add_select_decl(decl);
            if decl.ent != DesignEnt::Variable {
                return Err(EvalError::Semantic(format!(
                    "the second argument of {} must be a variable synonym, not {}",
                    self.name, decl.ent
                )));
            }
        }

        match (subject, variable) {
            (Arg::Concrete(subject), Arg::Concrete(var)) => {
                trace!(relation = self.name, "concrete/concrete");
                if !(self.contains)(pkb, &subject)
                    || !pkb.has_variable(&var)
                    || !(self.has_var)(pkb, &subject, &var)
                {
                    return Err(self.always_false());
                }
                Ok(())
            }
            (Arg::Concrete(subject), Arg::Decl(var_decl)) => {
                trace!(relation = self.name, "concrete/decl");
                if !(self.contains)(pkb, &subject) {
                    return Err(self.always_false());
                }
                let vars = (self.vars_of)(pkb, &subject);
                let new_domain: Domain = table
                    .get_domain(&var_decl)
                    .into_iter()
                    .filter(|entry| {
                        entry
                            .name_value()
                            .map(|name| vars.contains(name))
                            .unwrap_or(false)
                    })
                    .collect();
                table.put_domain(var_decl, new_domain);
                Ok(())
            }
            (Arg::Concrete(subject), Arg::Wildcard) => {
                trace!(relation = self.name, "concrete/wildcard");
                if !(self.contains)(pkb, &subject) || (self.vars_of)(pkb, &subject).is_empty() {
                    return Err(self.always_false());
                }
                Ok(())
            }
            (Arg::Decl(decl), Arg::Concrete(var)) => {
                trace!(relation = self.name, "decl/concrete");
                if !pkb.has_variable(&var) {
                    return Err(self.always_false());
                }
                let mut new_domain = Domain::new();
                for entry in table.get_domain(&decl) {
                    let key = K::from_entry(&entry)?;
                    if (self.has_var)(pkb, &key, &var) {
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
                    if !(self.vars_of)(pkb, &key).is_empty() {
                        new_domain.insert(entry);
                    }
                }
                table.put_domain(decl, new_domain);
                Ok(())
            }
            (Arg::Decl(decl), Arg::Decl(var_decl)) => {
                trace!(relation = self.name, "decl/decl");
                let subject_domain = table.get_domain(&decl);
                let var_domain = table.get_domain(&var_decl);

                let mut new_subject = Domain::new();
                let mut new_vars = Domain::new();
                let mut pairs: HashSet<(Entry, Entry)> = HashSet::new();

                for entry in subject_domain {
                    let key = K::from_entry(&entry)?;
                    let vars = (self.vars_of)(pkb, &key);
                    let mut has_valid_rhs = false;
                    for var in vars {
                        let var_entry = Entry::name(&var_decl, var);
                        if var_domain.contains(&var_entry) {
                            pairs.insert((entry.clone(), var_entry.clone()));
                            new_vars.insert(var_entry);
                            has_valid_rhs = true;
                        }
                    }
                    if has_valid_rhs {
                        new_subject.insert(entry);
                    }
                }

                table.put_domain(decl.clone(), new_subject);
                table.put_domain(var_decl.clone(), new_vars);
                table.add_join(&decl, &var_decl, pairs);
                Ok(())
            }
            (Arg::Wildcard, _) => unreachable!("rejected above"),
        }
    }

    fn always_false(&self) -> EvalError {
        EvalError::AlwaysFalse(format!("{} clause", self.name))
    }
}
