//! Pattern-clause evaluation.
//!
//! Assign patterns filter the assignment synonym's domain by left-hand
//! side and by structural expression match; while/if patterns filter on
//! the variables of the controlling condition. A declared variable in
//! the first position turns the filter into a join between the
//! statement synonym and the variable synonym.

use super::EvalError;
use super::table::{Domain, Entry, Table};
use crate::ast::matcher::{exact_match, partial_match};
use crate::pkb::Pkb;
use crate::pql::ast::{DeclRef, DesignEnt, EntRef, ExprSpec, PatternCond};
use std::collections::HashSet;
use tracing::trace;

pub(crate) fn eval_pattern(
    pkb: &Pkb,
    table: &mut Table,
    pattern: &PatternCond,
) -> Result<(), EvalError> {
    match pattern {
        PatternCond::Assign { assign, ent, spec } => eval_assign(pkb, table, assign, ent, spec),
        PatternCond::While { decl, var } => eval_condition(pkb, table, decl, var),
        PatternCond::If { decl, var } => eval_condition(pkb, table, decl, var),
    }
}

fn rhs_matches(pkb: &Pkb, id: usize, spec: &ExprSpec) -> bool {
    let Some(needle) = &spec.expr else {
        return true;
    };
    let Some((_, rhs)) = pkb
        .maybe_statement(id)
        .and_then(|stmt| stmt.assign_parts())
    else {
        return false;
    };
    if spec.is_subexpr {
        partial_match(needle, rhs)
    } else {
        exact_match(needle, rhs)
    }
}

fn eval_assign(
    pkb: &Pkb,
    table: &mut Table,
    assign: &DeclRef,
    ent: &EntRef,
    spec: &ExprSpec,
) -> Result<(), EvalError> {
    table.add_select_decl(assign);
    let domain = table.get_domain(assign);
    trace!(synonym = %assign.name, candidates = domain.len(), "assign pattern");

    match ent {
        EntRef::Name(var) => {
            let new_domain: Domain = domain
                .into_iter()
                .filter(|entry| {
                    entry.stmt_id().is_ok_and(|id| {
                        let lhs_matches = pkb
                            .maybe_statement(id)
                            .and_then(|stmt| stmt.assign_parts())
                            .is_some_and(|(lhs, _)| lhs == var);
                        lhs_matches && rhs_matches(pkb, id, spec)
                    })
                })
                .collect();
            table.put_domain(assign.clone(), new_domain);
            Ok(())
        }
        EntRef::Wildcard => {
            let new_domain: Domain = domain
                .into_iter()
                .filter(|entry| entry.stmt_id().is_ok_and(|id| rhs_matches(pkb, id, spec)))
                .collect();
            table.put_domain(assign.clone(), new_domain);
            Ok(())
        }
        EntRef::Decl(var_decl) => {
            if var_decl.ent != DesignEnt::Variable {
                return Err(EvalError::Semantic(format!(
                    "the first argument of an assign pattern must be a variable synonym, not {}",
                    var_decl.ent
                )));
            }
            table.add_select_decl(var_decl);
            let var_domain = table.get_domain(var_decl);

            let mut new_assigns = Domain::new();
            let mut new_vars = Domain::new();
            let mut pairs: HashSet<(Entry, Entry)> = HashSet::new();

            for entry in domain {
                let id = entry.stmt_id()?;
                if !rhs_matches(pkb, id, spec) {
                    continue;
                }
                let Some((lhs, _)) = pkb
                    .maybe_statement(id)
                    .and_then(|stmt| stmt.assign_parts())
                else {
                    continue;
                };
                let var_entry = Entry::name(var_decl, lhs.clone());
                if var_domain.contains(&var_entry) {
                    pairs.insert((entry.clone(), var_entry.clone()));
                    new_vars.insert(var_entry);
                    new_assigns.insert(entry);
                }
            }

            table.put_domain(assign.clone(), new_assigns);
            table.put_domain(var_decl.clone(), new_vars);
            table.add_join(assign, var_decl, pairs);
            Ok(())
        }
    }
}

/// Shared by while and if patterns: the domain is restricted to
/// statements whose condition mentions the given variable.
fn eval_condition(
    pkb: &Pkb,
    table: &mut Table,
    decl: &DeclRef,
    var: &EntRef,
) -> Result<(), EvalError> {
    table.add_select_decl(decl);
    let domain = table.get_domain(decl);
    trace!(synonym = %decl.name, candidates = domain.len(), "condition pattern");

    match var {
        EntRef::Name(name) => {
            let new_domain: Domain = domain
                .into_iter()
                .filter(|entry| {
                    entry.stmt_id().is_ok_and(|id| {
                        pkb.maybe_statement(id)
                            .is_some_and(|stmt| stmt.condition_variables().contains(name))
                    })
                })
                .collect();
            table.put_domain(decl.clone(), new_domain);
            Ok(())
        }
        EntRef::Wildcard => {
            let new_domain: Domain = domain
                .into_iter()
                .filter(|entry| {
                    entry.stmt_id().is_ok_and(|id| {
                        pkb.maybe_statement(id)
                            .is_some_and(|stmt| !stmt.condition_variables().is_empty())
                    })
                })
                .collect();
            table.put_domain(decl.clone(), new_domain);
            Ok(())
        }
        EntRef::Decl(var_decl) => {
            if var_decl.ent != DesignEnt::Variable {
                return Err(EvalError::Semantic(format!(
                    "the first argument of a pattern must be a variable synonym, not {}",
                    var_decl.ent
                )));
            }
            table.add_select_decl(var_decl);
            let var_domain = table.get_domain(var_decl);

            let mut new_stmts = Domain::new();
            let mut new_vars = Domain::new();
            let mut pairs: HashSet<(Entry, Entry)> = HashSet::new();

            for entry in domain {
                let id = entry.stmt_id()?;
                let Some(stmt) = pkb.maybe_statement(id) else {
                    continue;
                };
                let mut has_valid_rhs = false;
                for cond_var in stmt.condition_variables() {
                    let var_entry = Entry::name(var_decl, cond_var.clone());
                    if var_domain.contains(&var_entry) {
                        pairs.insert((entry.clone(), var_entry.clone()));
                        new_vars.insert(var_entry);
                        has_valid_rhs = true;
                    }
                }
                if has_valid_rhs {
                    new_stmts.insert(entry);
                }
            }

            table.put_domain(decl.clone(), new_stmts);
            table.put_domain(var_decl.clone(), new_vars);
            table.add_join(decl, var_decl, pairs);
            Ok(())
        }
    }
}
