//! With-clause evaluation.
//!
//! Each side of `with ref = ref` resolves to a typed view: a number
//! (integer literal, `prog_line` synonym, `stmt#`, `value`) or a name
//! (string literal, `procName`, `varName`). Views of different kinds
//! never compare equal, so a kind mismatch simply empties the domain
//! or fails the clause.

use super::EvalError;
use super::table::{Domain, Entry, Table, extract_attr_value};
use crate::pkb::Pkb;
use crate::pql::ast::{AttrName, DeclRef, WithCond, WithRef};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// A resolved with-ref value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WithView {
    Number(SmolStr),
    Name(SmolStr),
}

/// A with-ref that ranges over a synonym's domain.
struct DeclSide<'q> {
    decl: &'q DeclRef,
    attr: Option<AttrName>,
}

fn literal_view(with_ref: &WithRef) -> Option<WithView> {
    match with_ref {
        WithRef::Int(value) => Some(WithView::Number(SmolStr::from(value.to_string()))),
        WithRef::Str(text) => Some(WithView::Name(text.clone())),
        _ => None,
    }
}

fn decl_side(with_ref: &WithRef) -> Option<DeclSide<'_>> {
    match with_ref {
        WithRef::Decl(decl) => Some(DeclSide { decl, attr: None }),
        WithRef::Attr(attr_ref) => Some(DeclSide {
            decl: &attr_ref.decl,
            attr: Some(attr_ref.attr),
        }),
        _ => None,
    }
}

fn entry_view(pkb: &Pkb, side: &DeclSide<'_>, entry: &Entry) -> Result<WithView, EvalError> {
    match side.attr {
        // a bare synonym is a prog_line: its value is its number
        None => Ok(WithView::Number(SmolStr::from(
            entry.stmt_id()?.to_string(),
        ))),
        Some(attr) => {
            let text = extract_attr_value(pkb, side.decl, attr, entry)?;
            Ok(match attr {
                AttrName::ProcName | AttrName::VarName => WithView::Name(text),
                AttrName::Value | AttrName::StmtNum => WithView::Number(text),
            })
        }
    }
}

pub(crate) fn eval_with(pkb: &Pkb, table: &mut Table, cond: &WithCond) -> Result<(), EvalError> {
    let lhs_literal = literal_view(&cond.lhs);
    let rhs_literal = literal_view(&cond.rhs);

    match (lhs_literal, rhs_literal) {
        (Some(lhs), Some(rhs)) => {
            trace!("with literal/literal");
            if lhs == rhs {
                Ok(())
            } else {
                Err(EvalError::AlwaysFalse("with clause".to_string()))
            }
        }
        (Some(literal), None) => {
            let side = decl_side(&cond.rhs).expect("non-literal with-ref has a synonym");
            shrink_to_literal(pkb, table, &side, &literal)
        }
        (None, Some(literal)) => {
            let side = decl_side(&cond.lhs).expect("non-literal with-ref has a synonym");
            shrink_to_literal(pkb, table, &side, &literal)
        }
        (None, None) => {
            let lhs = decl_side(&cond.lhs).expect("non-literal with-ref has a synonym");
            let rhs = decl_side(&cond.rhs).expect("non-literal with-ref has a synonym");
            join_sides(pkb, table, &lhs, &rhs)
        }
    }
}

fn shrink_to_literal(
    pkb: &Pkb,
    table: &mut Table,
    side: &DeclSide<'_>,
    literal: &WithView,
) -> Result<(), EvalError> {
    table.add_select_decl(side.decl);
    let mut new_domain = Domain::new();
    for entry in table.get_domain(side.decl) {
        if entry_view(pkb, side, &entry)? == *literal {
            new_domain.insert(entry);
        }
    }
    trace!(synonym = %side.decl.name, entries = new_domain.len(), "with literal shrink");
    table.put_domain(side.decl.clone(), new_domain);
    Ok(())
}

fn join_sides(
    pkb: &Pkb,
    table: &mut Table,
    lhs: &DeclSide<'_>,
    rhs: &DeclSide<'_>,
) -> Result<(), EvalError> {
    table.add_select_decl(lhs.decl);
    table.add_select_decl(rhs.decl);

    if lhs.decl == rhs.decl {
        // both sides range over the same synonym: keep entries whose
        // two views agree (they can differ when the attributes do)
        let mut new_domain = Domain::new();
        for entry in table.get_domain(lhs.decl) {
            if entry_view(pkb, lhs, &entry)? == entry_view(pkb, rhs, &entry)? {
                new_domain.insert(entry);
            }
        }
        table.put_domain(lhs.decl.clone(), new_domain);
        return Ok(());
    }

    let left_domain = table.get_domain(lhs.decl);
    let right_domain = table.get_domain(rhs.decl);

    let mut right_by_view: HashMap<WithView, Vec<Entry>> = HashMap::new();
    for entry in right_domain {
        let view = entry_view(pkb, rhs, &entry)?;
        right_by_view.entry(view).or_default().push(entry);
    }

    let mut new_left = Domain::new();
    let mut new_right = Domain::new();
    let mut pairs: HashSet<(Entry, Entry)> = HashSet::new();

    for entry in left_domain {
        let view = entry_view(pkb, lhs, &entry)?;
        let Some(partners) = right_by_view.get(&view) else {
            continue;
        };
        for partner in partners {
            pairs.insert((entry.clone(), partner.clone()));
            new_right.insert(partner.clone());
        }
        new_left.insert(entry);
    }

    trace!(
        left = %lhs.decl.name,
        right = %rhs.decl.name,
        pairs = pairs.len(),
        "with join"
    );
    table.put_domain(lhs.decl.clone(), new_left);
    table.put_domain(rhs.decl.clone(), new_right);
    table.add_join(lhs.decl, rhs.decl, pairs);
    Ok(())
}
