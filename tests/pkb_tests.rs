//! Knowledge-base extraction: Follows, Parent, Uses, Modifies, Calls,
//! and the global indexes, checked against the worked example.

mod common;

use common::{centroid, example};
use spa_engine::pql::ast::DesignEnt;
use std::collections::HashSet;

fn set(ids: &[usize]) -> HashSet<usize> {
    ids.iter().copied().collect()
}

#[test]
fn statements_are_numbered_densely_in_program_order() {
    let analyzer = example();
    let pkb = analyzer.pkb();
    assert_eq!(pkb.statement_count(), 24);
    for id in 1..=24 {
        assert_eq!(pkb.get_statement(id).unwrap().id(), id);
    }
    assert!(pkb.get_statement(0).is_err());
    assert!(pkb.get_statement(25).is_err());
}

#[test]
fn statement_kind_indexes() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let assigns: HashSet<usize> = pkb.statements_of_kind(DesignEnt::Assign).collect();
    assert_eq!(
        assigns,
        set(&[1, 2, 3, 5, 7, 8, 9, 11, 15, 17, 18, 19, 20, 21, 23, 24])
    );
    let whiles: HashSet<usize> = pkb.statements_of_kind(DesignEnt::While).collect();
    assert_eq!(whiles, set(&[4, 14]));
    let ifs: HashSet<usize> = pkb.statements_of_kind(DesignEnt::If).collect();
    assert_eq!(ifs, set(&[6, 13, 22]));
    let calls: HashSet<usize> = pkb.statements_of_kind(DesignEnt::Call).collect();
    assert_eq!(calls, set(&[10, 12, 16]));

    let all: HashSet<usize> = pkb.statements_of_kind(DesignEnt::Stmt).collect();
    assert_eq!(all.len(), 24);
    let prog_lines: HashSet<usize> = pkb.statements_of_kind(DesignEnt::ProgLine).collect();
    assert_eq!(prog_lines, all);
}

#[test]
fn constants_keep_their_lexemes() {
    let analyzer = example();
    let constants = analyzer.pkb().all_constants();
    let expected: HashSet<&str> = ["0", "1", "2", "3", "5"].into_iter().collect();
    let actual: HashSet<&str> = constants.iter().map(|c| c.as_str()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn follows_direct() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    for (before, after) in [(1, 2), (2, 3), (3, 4), (4, 12), (5, 6), (6, 9), (13, 21)] {
        assert!(pkb.is_follows(before, after), "Follows({before}, {after})");
    }
    // across nesting levels or branches there is no Follows
    assert!(!pkb.is_follows(4, 5));
    assert!(!pkb.is_follows(7, 8));
    assert!(!pkb.is_follows(11, 12));
    assert!(!pkb.is_follows(12, 13));
}

#[test]
fn follows_transitive_closure() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let after_1 = pkb.get_statement(1).unwrap().stmts_transitively_after();
    assert_eq!(after_1.clone(), set(&[2, 3, 4, 12]));

    let before_11 = pkb.get_statement(11).unwrap().stmts_transitively_before();
    assert_eq!(before_11.clone(), set(&[5, 6, 9, 10]));

    assert!(pkb.is_follows_transitive(1, 12));
    assert!(!pkb.is_follows_transitive(12, 1));
    assert!(!pkb.is_follows_transitive(1, 5));
}

#[test]
fn parent_and_ancestry() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert_eq!(
        pkb.get_statement(4).unwrap().children().clone(),
        set(&[5, 6, 9, 10, 11])
    );
    assert_eq!(pkb.get_statement(6).unwrap().children().clone(), set(&[7, 8]));
    assert_eq!(
        pkb.get_statement(4).unwrap().descendants().clone(),
        set(&[5, 6, 7, 8, 9, 10, 11])
    );
    assert_eq!(
        pkb.get_statement(13).unwrap().descendants().clone(),
        set(&[14, 15, 16, 17, 18, 19, 20])
    );

    assert_eq!(pkb.get_statement(7).unwrap().ancestors().clone(), set(&[4, 6]));
    assert_eq!(pkb.get_statement(15).unwrap().ancestors().clone(), set(&[13, 14]));
    assert_eq!(pkb.get_statement(1).unwrap().parent_stmt(), None);
    assert_eq!(pkb.get_statement(5).unwrap().parent_stmt(), Some(4));

    assert!(pkb.is_parent(4, 5));
    assert!(!pkb.is_parent(4, 7));
    assert!(pkb.is_parent_transitive(4, 7));
    assert!(!pkb.is_parent_transitive(7, 4));
}

#[test]
fn container_ids_exceed_their_parents() {
    let analyzer = example();
    let pkb = analyzer.pkb();
    for stmt in pkb.all_statements() {
        for &descendant in stmt.descendants() {
            assert!(descendant > stmt.id());
        }
    }
}

#[test]
fn uses_of_plain_statements() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.stmt_uses(5, "x"));
    assert!(pkb.stmt_uses(8, "z"));
    assert!(pkb.stmt_uses(8, "x"));
    assert!(pkb.stmt_uses(9, "i"));
    assert!(!pkb.stmt_uses(1, "x"));
    assert!(!pkb.stmt_uses(5, "z"));
}

#[test]
fn uses_of_containers_union_their_bodies() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let while_uses = pkb.get_statement(4).unwrap().used_variables();
    let expected: HashSet<&str> = ["i", "x", "z"].into_iter().collect();
    assert_eq!(
        while_uses.iter().map(|v| v.as_str()).collect::<HashSet<_>>(),
        expected
    );

    assert!(pkb.stmt_uses(6, "z"));
    assert!(pkb.stmt_uses(13, "y"));
    assert!(pkb.stmt_uses(14, "x")); // via the call to q at 16
    assert!(!pkb.stmt_uses(22, "i"));
}

#[test]
fn uses_propagate_through_calls() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    // q uses {x, z}; both call sites inherit them
    assert!(pkb.stmt_uses(10, "x"));
    assert!(pkb.stmt_uses(10, "z"));
    assert!(pkb.stmt_uses(16, "x"));
    // p uses y through statement 15; Example sees it through call p
    assert!(pkb.stmt_uses(12, "y"));
    assert!(pkb.proc_uses("Example", "y"));
}

#[test]
fn modifies_of_statements_and_containers() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.stmt_modifies(1, "x"));
    assert!(pkb.stmt_modifies(8, "y"));
    assert!(!pkb.stmt_modifies(8, "z"));

    for var in ["x", "y", "z", "i"] {
        assert!(pkb.stmt_modifies(4, var), "while 4 modifies {var}");
    }
    assert!(pkb.stmt_modifies(6, "y"));
    assert!(pkb.stmt_modifies(6, "z"));
    assert!(!pkb.stmt_modifies(6, "x"));
}

#[test]
fn modifies_propagate_through_calls() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.stmt_modifies(10, "x"));
    assert!(pkb.stmt_modifies(10, "z"));
    assert!(pkb.stmt_modifies(12, "i"));
    assert!(!pkb.stmt_modifies(10, "i"));

    assert!(pkb.proc_modifies("q", "x"));
    assert!(pkb.proc_modifies("q", "z"));
    assert!(!pkb.proc_modifies("q", "i"));
    assert!(pkb.proc_modifies("Example", "y"));
}

#[test]
fn variable_records_track_users_and_modifiers() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let z = pkb.get_variable("z").unwrap();
    assert_eq!(
        z.modified_by().clone(),
        set(&[2, 4, 6, 7, 9, 10, 12, 13, 14, 16, 19, 20, 21, 22, 23])
    );
    let procs: HashSet<&str> = z.modified_by_procs().iter().map(|p| p.as_str()).collect();
    assert_eq!(procs, ["Example", "p", "q"].into_iter().collect());

    assert!(pkb.get_variable("nope").is_err());
}

#[test]
fn read_and_print_indexes() {
    let analyzer = centroid();
    let pkb = analyzer.pkb();

    assert_eq!(pkb.get_variable("x").unwrap().read_stmts().clone(), set(&[4]));
    assert_eq!(pkb.get_variable("y").unwrap().read_stmts().clone(), set(&[5]));
    assert_eq!(
        pkb.get_variable("flag").unwrap().print_stmts().clone(),
        set(&[6])
    );
    assert!(pkb.get_variable("x").unwrap().print_stmts().is_empty());

    // reads modify, prints use
    assert!(pkb.stmt_modifies(4, "x"));
    assert!(pkb.stmt_uses(6, "flag"));
}

#[test]
fn call_graph_edges_and_closures() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    assert!(pkb.is_calls("Example", "q"));
    assert!(pkb.is_calls("Example", "p"));
    assert!(pkb.is_calls("p", "q"));
    assert!(!pkb.is_calls("q", "p"));
    assert!(!pkb.is_calls("p", "Example"));

    assert!(pkb.is_calls_transitive("Example", "q"));
    let q = pkb.get_procedure("q").unwrap();
    let callers: HashSet<&str> = q
        .all_transitive_callers()
        .iter()
        .map(|p| p.as_str())
        .collect();
    assert_eq!(callers, ["Example", "p"].into_iter().collect());

    assert_eq!(q.call_stmts().clone(), set(&[10, 16]));
}

#[test]
fn transitive_callers_mirror_transitive_callees() {
    let analyzer = centroid();
    let pkb = analyzer.pkb();

    for (name, proc) in pkb.all_procedures() {
        for callee in proc.all_transitive_callees() {
            let callee_record = pkb.get_procedure(callee).unwrap();
            assert!(
                callee_record.all_transitive_callers().contains(name),
                "{name} -> {callee} has no reverse edge"
            );
        }
    }
}

#[test]
fn condition_variable_index() {
    let analyzer = example();
    let pkb = analyzer.pkb();

    let cond_4: HashSet<&str> = pkb
        .get_statement(4)
        .unwrap()
        .condition_variables()
        .iter()
        .map(|v| v.as_str())
        .collect();
    assert_eq!(cond_4, ["i"].into_iter().collect());

    let cond_22: HashSet<&str> = pkb
        .get_statement(22)
        .unwrap()
        .condition_variables()
        .iter()
        .map(|v| v.as_str())
        .collect();
    assert_eq!(cond_22, ["x"].into_iter().collect());

    // assignments have no condition variables
    assert!(pkb.get_statement(5).unwrap().condition_variables().is_empty());
}
