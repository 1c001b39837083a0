//! Structural matching over SIMPLE expression trees.
//!
//! Assignment patterns compare a query-supplied expression against the
//! right-hand side of candidate assignments, either whole-tree
//! (`exact_match`) or as a sub-tree anywhere in the haystack
//! (`partial_match`). Matching is purely syntactic modulo
//! parenthesisation, which the AST never records.

use crate::ast::Expr;

/// Returns true if `a` and `b` are structurally identical.
pub fn exact_match(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Var(x), Expr::Var(y)) => x == y,
        (Expr::Const(x), Expr::Const(y)) => x == y,
        (
            Expr::Binary { op, lhs, rhs },
            Expr::Binary {
                op: other_op,
                lhs: other_lhs,
                rhs: other_rhs,
            },
        ) => op == other_op && exact_match(lhs, other_lhs) && exact_match(rhs, other_rhs),
        (
            Expr::Unary { op, operand },
            Expr::Unary {
                op: other_op,
                operand: other_operand,
            },
        ) => op == other_op && exact_match(operand, other_operand),
        _ => false,
    }
}

/// Returns true if `needle` occurs as a sub-tree of `haystack`.
pub fn partial_match(needle: &Expr, haystack: &Expr) -> bool {
    if exact_match(needle, haystack) {
        return true;
    }
    match haystack {
        Expr::Var(_) | Expr::Const(_) => false,
        Expr::Binary { lhs, rhs, .. } => partial_match(needle, lhs) || partial_match(needle, rhs),
        Expr::Unary { operand, .. } => partial_match(needle, operand),
    }
}
