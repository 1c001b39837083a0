//! PQL front-end integration: the grammar surface accepted and
//! rejected by the query parser.

mod common;

use common::example;
use spa_engine::parse_query;

fn accepts(query: &str) {
    assert!(
        parse_query(query).is_ok(),
        "expected `{query}` to parse, got {:?}",
        parse_query(query).err()
    );
}

fn rejects(query: &str) {
    assert!(parse_query(query).is_err(), "expected `{query}` to be rejected");
}

#[test]
fn declaration_section() {
    accepts("stmt s; read re; print pn; call c; while w; if ifs; assign a; \
             variable v; constant k; procedure pr; prog_line n; Select s");
    rejects("banana b; Select b");
    rejects("stmt s Select s");
    rejects("stmt s; stmt s; Select s");
}

#[test]
fn result_clauses() {
    accepts("Select BOOLEAN");
    accepts("stmt s; Select s");
    accepts("stmt s; Select s.stmt#");
    accepts("stmt s; variable v; Select <s, v>");
    accepts("call c; Select <c.stmt#, c.procName>");
    rejects("Select");
    rejects("stmt s; Select <s");
    rejects("stmt s; Select s.varName");
}

#[test]
fn relation_arguments() {
    accepts("stmt s; Select s such that Follows(s, _)");
    accepts("stmt s; Select s such that Follows(_, s)");
    accepts("stmt s; Select s such that Follows(1, 2)");
    rejects("stmt s; Select s such that Follows(\"x\", s)");
    rejects("stmt s; Select s such that Follows(s)");
    rejects("stmt s; Select s such that Before(s, _)");
    rejects("stmt s; Select s such that Uses*(s, _)");
}

#[test]
fn pattern_arguments() {
    accepts("assign a; Select a pattern a(_, _)");
    accepts("assign a; Select a pattern a(_, _\"x\"_)");
    accepts("while w; Select w pattern w(_, _)");
    accepts("if ifs; Select ifs pattern ifs(_, _, _)");
    rejects("assign a; Select a pattern a(_, \"x\"_)");
    rejects("assign a; Select a pattern a(_, _\"x\")");
    rejects("assign a; Select a pattern a(_, \"x + \")");
    rejects("while w; Select w pattern w(_, \"x\")");
    rejects("call c; Select c pattern c(_, _)");
}

#[test]
fn with_arguments() {
    accepts("prog_line n; Select n with n = 10");
    accepts("constant k; stmt s; Select k with k.value = s.stmt#");
    accepts("procedure pr; Select pr with pr.procName = \"main\"");
    rejects("stmt s; Select s with s = 10");
    rejects("constant k; Select k with k.stmt# = 10");
    rejects("prog_line n; Select n with n =");
}

#[test]
fn clause_chaining() {
    accepts(
        "stmt s1, s2; assign a; variable v; \
         Select s1 such that Follows(s1, s2) and Parent(s1, s2) \
         pattern a(v, _) and a(_, _) \
         with v.varName = \"x\" and s1.stmt# = 3 \
         such that Next(s1, s2)",
    );
    rejects("stmt s; Select s such that");
    rejects("stmt s1, s2; Select s1 such that Follows(s1, s2) and");
    rejects("stmt s; Select s banana");
}

#[test]
fn parse_failures_yield_empty_results_through_the_driver() {
    let analyzer = example();
    let mut out = vec!["stale".to_string()];
    analyzer.evaluate("stmt s; Select t", &mut out);
    assert!(out.is_empty());
    assert!(analyzer.try_evaluate("stmt s; Select t").is_err());
}
