//! The PQL evaluator.
//!
//! A query is interpreted as a system of constraints over its declared
//! synonyms: every synonym starts with its full domain, each clause
//! shrinks domains or records joins, and the [solver](solver) projects
//! the surviving assignments through the result clause.
//!
//! Failure is contained here: a clause that can never hold raises an
//! internal sentinel, semantically invalid argument combinations raise
//! an internal error, and both produce the failed result (`FALSE` for
//! BOOLEAN queries, the empty list otherwise) without touching the
//! caller.

mod pattern;
pub(crate) mod relations;
pub(crate) mod solver;
pub(crate) mod table;
mod uses_modifies;
mod with;

use crate::pkb::{Pkb, PkbError};
use crate::pql::ast::{DeclRef, DesignEnt, Query, RelCond};
use relations::{ent_arg, stmt_arg};
use std::fmt;
use table::{Domain, Entry, Table};
use tracing::debug;

/// Internal evaluator failure; never escapes [`evaluate`].
#[derive(Debug)]
pub(crate) enum EvalError {
    /// A clause proved the whole query false.
    AlwaysFalse(String),
    /// The query is semantically invalid.
    Semantic(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::AlwaysFalse(what) => write!(f, "{what} always evaluates to false"),
            EvalError::Semantic(message) => write!(f, "semantically invalid query: {message}"),
        }
    }
}

impl From<PkbError> for EvalError {
    fn from(err: PkbError) -> Self {
        EvalError::Semantic(err.to_string())
    }
}

/// Evaluates one parsed query against a knowledge base.
pub fn evaluate(pkb: &Pkb, query: &Query) -> Vec<String> {
    match run(pkb, query) {
        Ok(results) => results,
        Err(err) => {
            debug!(%err, "query short-circuited to the failed result");
            Table::failed_result(&query.select.result)
        }
    }
}

fn run(pkb: &Pkb, query: &Query) -> Result<Vec<String>, EvalError> {
    let mut table = Table::new();
    for decl in query.declarations.iter() {
        table.put_domain(decl.clone(), initial_domain(pkb, decl));
    }

    for relation in &query.select.relations {
        handle_relation(pkb, &mut table, relation)?;
    }
    for pattern in &query.select.patterns {
        pattern::eval_pattern(pkb, &mut table, pattern)?;
    }
    for with in &query.select.withs {
        with::eval_with(pkb, &mut table, with)?;
    }

    table.get_result(&query.select.result, pkb)
}

/// The full domain of a synonym before any clause constrains it.
fn initial_domain(pkb: &Pkb, decl: &DeclRef) -> Domain {
    match decl.ent {
        DesignEnt::Variable => pkb
            .all_variables()
            .keys()
            .map(|name| Entry::name(decl, name.clone()))
            .collect(),
        DesignEnt::Procedure => pkb
            .all_procedures()
            .keys()
            .map(|name| Entry::name(decl, name.clone()))
            .collect(),
        DesignEnt::Constant => pkb
            .all_constants()
            .iter()
            .map(|value| Entry::name(decl, value.clone()))
            .collect(),
        _ => pkb
            .statements_of_kind(decl.ent)
            .map(|id| Entry::stmt(decl, id))
            .collect(),
    }
}

fn handle_relation(pkb: &Pkb, table: &mut Table, relation: &RelCond) -> Result<(), EvalError> {
    match relation {
        RelCond::Follows(left, right) => {
            relations::follows_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::FollowsT(left, right) => {
            relations::follows_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::Parent(left, right) => {
            relations::parent_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::ParentT(left, right) => {
            relations::parent_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::Calls(left, right) => {
            relations::calls_spec().evaluate(pkb, table, ent_arg(left), ent_arg(right))
        }
        RelCond::CallsT(left, right) => {
            relations::calls_t_spec().evaluate(pkb, table, ent_arg(left), ent_arg(right))
        }
        RelCond::Next(left, right) => {
            relations::next_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::NextT(left, right) => {
            relations::next_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::NextBip(left, right) => {
            relations::next_bip_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::NextBipT(left, right) => {
            relations::next_bip_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::Affects(left, right) => {
            relations::affects_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::AffectsT(left, right) => {
            relations::affects_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::AffectsBip(left, right) => {
            relations::affects_bip_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::AffectsBipT(left, right) => {
            relations::affects_bip_t_spec().evaluate(pkb, table, stmt_arg(left), stmt_arg(right))
        }
        RelCond::UsesS(left, right) => uses_modifies::eval_uses_s(pkb, table, left, right),
        RelCond::UsesP(left, right) => uses_modifies::eval_uses_p(pkb, table, left, right),
        RelCond::ModifiesS(left, right) => uses_modifies::eval_modifies_s(pkb, table, left, right),
        RelCond::ModifiesP(left, right) => uses_modifies::eval_modifies_p(pkb, table, left, right),
    }
}
