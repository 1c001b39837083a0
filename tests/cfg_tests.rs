//! Control-flow relations: Next, Next*, Affects, Affects*, and the
//! inter-procedural bip variants, checked against the worked example.

mod common;

use common::example;
use spa_engine::pql::ast::DesignEnt;
use std::collections::HashSet;

fn set(ids: &[usize]) -> HashSet<usize> {
    ids.iter().copied().collect()
}

#[test]
fn next_edges_of_straight_line_code() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.is_next(1, 2));
    assert!(pkb.is_next(2, 3));
    assert!(pkb.is_next(3, 4));
    assert!(!pkb.is_next(1, 3));
    assert!(!pkb.is_next(2, 1));
}

#[test]
fn branch_statements_have_two_successors() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // while: body entry and loop exit
    assert_eq!(pkb.next_stmts(4).unwrap().clone(), set(&[5, 12]));
    // if: one edge per branch, no direct edge to the join point
    assert_eq!(pkb.next_stmts(6).unwrap().clone(), set(&[7, 8]));
    assert!(!pkb.is_next(6, 9));
    // both branch tails rejoin at the statement after the if
    assert!(pkb.is_next(7, 9));
    assert!(pkb.is_next(8, 9));
    // the loop back-edge
    assert_eq!(pkb.next_stmts(11).unwrap().clone(), set(&[4]));
}

#[test]
fn terminal_statements_have_no_successors() {
    let analyzer = example();
    let pkb = analyzer.pkb();
    for id in [12, 21, 23, 24] {
        assert!(pkb.next_stmts(id).unwrap().is_empty(), "statement {id}");
    }
}

#[test]
fn every_non_terminal_statement_has_a_successor() {
    let analyzer = example();
    let pkb = analyzer.pkb();
    let terminals = set(&[12, 21, 23, 24]);
    for stmt in pkb.all_statements() {
        let successors = pkb.next_stmts(stmt.id()).unwrap();
        if terminals.contains(&stmt.id()) {
            assert!(successors.is_empty());
        } else {
            assert!(!successors.is_empty(), "statement {}", stmt.id());
        }
        if matches!(stmt.design_ent(), DesignEnt::If | DesignEnt::While) {
            assert_eq!(successors.len(), 2, "container {}", stmt.id());
        }
    }
}

#[test]
fn next_transitive_is_strict_reachability() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.is_next_transitive(1, 12));
    assert!(pkb.is_next_transitive(5, 11));
    assert!(pkb.is_next_transitive(13, 21));

    // statements on the loop reach themselves; straight-line ones do not
    assert!(pkb.is_next_transitive(4, 4));
    assert!(pkb.is_next_transitive(9, 9));
    assert!(!pkb.is_next_transitive(1, 1));
    assert!(!pkb.is_next_transitive(12, 12));

    // Next is intra-procedural only
    assert!(!pkb.is_next_transitive(12, 13));
    assert!(!pkb.is_next_transitive(1, 22));
}

#[test]
fn prev_sets_are_the_reverse_of_next() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert_eq!(pkb.prev_stmts(4).unwrap().clone(), set(&[3, 11]));
    assert_eq!(pkb.prev_stmts(9).unwrap().clone(), set(&[7, 8]));
    assert_eq!(pkb.prev_stmts(1).unwrap().clone(), set(&[]));
    assert_eq!(pkb.prev_stmts(21).unwrap().clone(), set(&[19, 20]));
}

#[test]
fn affects_direct() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // x = 2 reaches x = x - 1 through non-modifying statements
    assert!(pkb.does_affect(1, 5));
    // z = 3 reaches both uses of z through the else branch
    assert!(pkb.does_affect(2, 8));
    assert!(pkb.does_affect(2, 9));
    assert!(pkb.does_affect(18, 19));

    // the call to q at 10 modifies x, killing the loop-carried x
    assert!(!pkb.does_affect(5, 5));
    // likewise z dies at the call before coming back around
    assert!(!pkb.does_affect(9, 9));
    // both arguments must be assignments
    assert!(!pkb.does_affect(4, 5));
    assert!(!pkb.does_affect(1, 10));
    // and in the same procedure for plain Affects
    assert!(!pkb.does_affect(9, 15));
}

#[test]
fn affected_and_affecting_sets() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert_eq!(pkb.affected_stmts(1).unwrap().clone(), set(&[5]));
    assert_eq!(pkb.affected_stmts(2).unwrap().clone(), set(&[8, 9]));
    assert_eq!(pkb.affected_stmts(5).unwrap().clone(), set(&[7, 8, 9]));
    assert_eq!(pkb.affecting_stmts(9).unwrap().clone(), set(&[2, 3, 5, 7, 11]));
}

#[test]
fn affects_transitive() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // 1 -> 5 -> {7, 8, 9}; nothing further is affected intra-procedurally
    assert_eq!(
        pkb.affected_stmts_transitive(1).unwrap().clone(),
        set(&[5, 7, 8, 9])
    );
    assert!(pkb.does_affect_transitive(1, 9));
    assert!(!pkb.does_affect_transitive(1, 11));
}

#[test]
fn procedure_gates() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let (entry, exits) = pkb.proc_entry_exits("Example").unwrap();
    assert_eq!(entry, 1);
    assert_eq!(exits, &[12]);

    let (entry, exits) = pkb.proc_entry_exits("p").unwrap();
    assert_eq!(entry, 13);
    assert_eq!(exits, &[21]);

    // q ends in an if: both branch leaves are exits
    let (entry, mut exits) = pkb.proc_entry_exits("q").map(|(e, x)| (e, x.to_vec())).unwrap();
    exits.sort_unstable();
    assert_eq!(entry, 22);
    assert_eq!(exits, vec![23, 24]);

    assert!(pkb.proc_entry_exits("nope").is_none());
}

#[test]
fn next_bip_rewires_call_sites() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // call q at 10: fall-through is replaced by the call edge ...
    assert!(pkb.is_next_bip(10, 22));
    assert!(!pkb.is_next_bip(10, 11));
    // ... and q's exits return to the successor
    assert!(pkb.is_next_bip(23, 11));
    assert!(pkb.is_next_bip(24, 11));
    assert_eq!(pkb.prev_stmts_bip(11).unwrap().clone(), set(&[23, 24]));

    // call p at 12 has no successor: only the call edge is added
    assert!(pkb.is_next_bip(12, 13));
    assert!(pkb.next_stmts_bip(21).unwrap().is_empty());

    // plain intra-procedural steps survive
    assert!(pkb.is_next_bip(1, 2));
    assert!(pkb.is_next_bip(4, 5));
}

#[test]
fn next_bip_transitive_matches_returns_to_calls() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // through call q and back into the loop
    assert!(pkb.is_next_bip_transitive(9, 24));
    assert!(pkb.is_next_bip_transitive(9, 11));
    // from inside q, the return edges of both call sites are active
    assert!(pkb.is_next_bip_transitive(22, 11));
    assert!(pkb.is_next_bip_transitive(22, 17));
    // deep chain: Example's body reaches p's tail
    assert!(pkb.is_next_bip_transitive(1, 21));
    assert!(pkb.is_next_bip_transitive(1, 24));

    // q never calls anyone; control cannot flow from p's tail into q
    assert!(!pkb.is_next_bip_transitive(21, 22));
}

#[test]
fn affects_bip_crosses_procedure_boundaries() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // z from 9 survives q's else branch (24 modifies x, not z) and
    // reaches the use in p at 15
    assert!(pkb.does_affect_bip(9, 15));
    // x from 15 dies in q's else branch but survives the then branch
    assert!(pkb.does_affect_bip(15, 18));
    assert!(!pkb.does_affect(15, 18));

    // x assigned in q's else branch flows back to the use at 5
    assert!(pkb.does_affect_bip(24, 5));

    // calls do not kill, so x = 2 reaches 18 around the loop
    assert!(pkb.does_affect_bip(1, 18));
    // but every route from 1 into q passes an x-assignment first
    assert!(!pkb.does_affect_bip(1, 23));
}

#[test]
fn relation_existence_flags() {
    let analyzer = example();
    let pkb = analyzer.pkb();
    assert!(pkb.next_relation_exists());
    assert!(pkb.next_bip_relation_exists());
    assert!(pkb.affects_relation_exists());
    assert!(pkb.affects_bip_relation_exists());

    let single = spa_engine::Analyzer::from_source("procedure one { x = 1; }").unwrap();
    assert!(!single.pkb().next_relation_exists());
    assert!(!single.pkb().affects_relation_exists());
}
