//! Recursive-descent parser for PQL queries.
//!
//! A query is a run of synonym declarations followed by exactly one
//! `Select` clause with any number of `such that` / `pattern` / `with`
//! clauses, each extendable with `and`. All keywords are soft names in
//! the token stream; `Select` is the marker that ends the declaration
//! section.
//!
//! The parser performs the semantic checks that shape the AST:
//! undeclared synonyms, duplicate declarations, attribute
//! applicability, the pattern-synonym entity dispatch, and the
//! prog_line-only rule for bare synonyms in `with`. Entity-kind checks
//! on relation arguments are left to the evaluator, which rejects them
//! as always-false per the query failure contract.

use crate::ast::StmtId;
use crate::diag::Diag;
use crate::lexer::token::{Token, TokenKind};
use crate::lexer::tokenize;
use crate::parser::parse_expression_text;
use crate::pql::ast::{
    AttrName, AttrRef, DeclRef, DeclarationList, DesignEnt, Elem, EntRef, ExprSpec, PatternCond,
    Query, RelCond, ResultCl, Select, StmtRef, WithCond, WithRef,
};
use smol_str::SmolStr;

type ParseError = Box<Diag>;
type Parse<T> = Result<T, ParseError>;

/// Parses one PQL query.
pub fn parse_query(source: &str) -> Parse<Query> {
    let lex_result = tokenize(source);
    if let Some(diag) = lex_result.diagnostics.into_iter().next() {
        return Err(Box::new(diag));
    }
    QueryParser::new(lex_result.tokens).parse_query()
}

struct QueryParser {
    tokens: Vec<Token>,
    pos: usize,
    declarations: DeclarationList,
}

impl QueryParser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let eof_pos = tokens.last().map(|t| t.span.end).unwrap_or(0);
            tokens.push(Token::new(TokenKind::Eof, eof_pos..eof_pos));
        }
        Self {
            tokens,
            pos: 0,
            declarations: DeclarationList::default(),
        }
    }

    fn parse_query(mut self) -> Parse<Query> {
        loop {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("query must contain a Select clause"));
            }
            if self.peek().kind.is_keyword("Select") {
                break;
            }
            self.parse_declaration()?;
        }

        let select = self.parse_select()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.error_here(format!(
                "query should end after the Select clause, found {}",
                self.peek().kind
            )));
        }

        Ok(Query {
            declarations: self.declarations,
            select,
        })
    }

    fn parse_declaration(&mut self) -> Parse<()> {
        let keyword = self.expect_name("design-entity keyword")?;
        let Some(ent) = DesignEnt::from_keyword(&keyword) else {
            return Err(self.error_prev(format!("'{keyword}' is not a design entity")));
        };

        loop {
            let name = self.expect_name("synonym name")?;
            if !self.declarations.add(name.clone(), ent) {
                return Err(self.error_prev(format!("synonym '{name}' is already declared")));
            }
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_select(&mut self) -> Parse<Select> {
        self.advance(); // the 'Select' keyword

        let result = self.parse_result_cl()?;
        let mut select = Select {
            result,
            relations: Vec::new(),
            patterns: Vec::new(),
            withs: Vec::new(),
        };

        while !self.check(&TokenKind::Eof) {
            if self.peek().kind.is_keyword("such") {
                self.advance();
                self.expect_soft_keyword("that")?;
                select.relations.push(self.parse_rel_cond()?);
                while self.consume_soft_keyword("and") {
                    select.relations.push(self.parse_rel_cond()?);
                }
            } else if self.peek().kind.is_keyword("pattern") {
                self.advance();
                select.patterns.push(self.parse_pattern_cond()?);
                while self.consume_soft_keyword("and") {
                    select.patterns.push(self.parse_pattern_cond()?);
                }
            } else if self.peek().kind.is_keyword("with") {
                self.advance();
                select.withs.push(self.parse_with_cond()?);
                while self.consume_soft_keyword("and") {
                    select.withs.push(self.parse_with_cond()?);
                }
            } else {
                break;
            }
        }

        Ok(select)
    }

    fn parse_result_cl(&mut self) -> Parse<ResultCl> {
        // BOOLEAN is only the boolean result when no synonym shadows it.
        if self.peek().kind.is_keyword("BOOLEAN") && self.declarations.get("BOOLEAN").is_none() {
            self.advance();
            return Ok(ResultCl::Bool);
        }

        if self.consume(&TokenKind::Lt) {
            let mut elems = vec![self.parse_elem()?];
            while self.consume(&TokenKind::Comma) {
                elems.push(self.parse_elem()?);
            }
            self.expect(TokenKind::Gt)?;
            return Ok(ResultCl::Tuple(elems));
        }

        Ok(ResultCl::Tuple(vec![self.parse_elem()?]))
    }

    fn parse_elem(&mut self) -> Parse<Elem> {
        let decl = self.expect_synonym()?;
        if self.consume(&TokenKind::Dot) {
            let attr = self.parse_attr_name(&decl)?;
            return Ok(Elem::Attr(AttrRef { decl, attr }));
        }
        Ok(Elem::Decl(decl))
    }

    fn parse_attr_name(&mut self, decl: &DeclRef) -> Parse<AttrName> {
        let name = self.expect_name("attribute name")?;
        let attr = match name.as_str() {
            "procName" => AttrName::ProcName,
            "varName" => AttrName::VarName,
            "value" => AttrName::Value,
            "stmt" => {
                self.expect(TokenKind::Hash)?;
                AttrName::StmtNum
            }
            other => {
                return Err(self.error_prev(format!("'{other}' is not an attribute name")));
            }
        };

        if !attr.applies_to(decl.ent) {
            return Err(self.error_prev(format!(
                "attribute '{attr}' does not apply to {} synonym '{}'",
                decl.ent, decl.name
            )));
        }
        Ok(attr)
    }

    fn parse_rel_cond(&mut self) -> Parse<RelCond> {
        let name = self.expect_name("relation name")?;
        let transitive = self.consume(&TokenKind::Star);

        self.expect(TokenKind::LParen)?;
        let rel = match (name.as_str(), transitive) {
            ("Follows", false) => self.stmt_pair(RelCond::Follows)?,
            ("Follows", true) => self.stmt_pair(RelCond::FollowsT)?,
            ("Parent", false) => self.stmt_pair(RelCond::Parent)?,
            ("Parent", true) => self.stmt_pair(RelCond::ParentT)?,
            ("Next", false) => self.stmt_pair(RelCond::Next)?,
            ("Next", true) => self.stmt_pair(RelCond::NextT)?,
            ("NextBip", false) => self.stmt_pair(RelCond::NextBip)?,
            ("NextBip", true) => self.stmt_pair(RelCond::NextBipT)?,
            ("Affects", false) => self.stmt_pair(RelCond::Affects)?,
            ("Affects", true) => self.stmt_pair(RelCond::AffectsT)?,
            ("AffectsBip", false) => self.stmt_pair(RelCond::AffectsBip)?,
            ("AffectsBip", true) => self.stmt_pair(RelCond::AffectsBipT)?,
            ("Calls", _) => {
                let first = self.parse_ent_ref()?;
                self.expect(TokenKind::Comma)?;
                let second = self.parse_ent_ref()?;
                if transitive {
                    RelCond::CallsT(first, second)
                } else {
                    RelCond::Calls(first, second)
                }
            }
            ("Uses", false) => self.parse_uses_modifies(true)?,
            ("Modifies", false) => self.parse_uses_modifies(false)?,
            _ => {
                return Err(self.error_prev(format!("unknown relation '{name}'")));
            }
        };
        self.expect(TokenKind::RParen)?;
        Ok(rel)
    }

    fn stmt_pair(&mut self, make: fn(StmtRef, StmtRef) -> RelCond) -> Parse<RelCond> {
        let first = self.parse_stmt_ref()?;
        self.expect(TokenKind::Comma)?;
        let second = self.parse_stmt_ref()?;
        Ok(make(first, second))
    }

    /// `Uses`/`Modifies` pick their statement or procedure variant from
    /// the shape of the first argument.
    fn parse_uses_modifies(&mut self, is_uses: bool) -> Parse<RelCond> {
        let first_is_stmt = match &self.peek().kind {
            TokenKind::Int(_) => true,
            // a wildcard first argument is rejected by the evaluator,
            // not the parser; classify it as the statement variant.
            TokenKind::Underscore => true,
            TokenKind::Str(_) => false,
            TokenKind::Name(name) => {
                let decl = self.lookup_synonym(name)?;
                decl.ent.is_statement_kind()
            }
            kind => {
                return Err(self.error_here(format!("invalid relation argument {kind}")));
            }
        };

        if first_is_stmt {
            let first = self.parse_stmt_ref()?;
            self.expect(TokenKind::Comma)?;
            let second = self.parse_ent_ref()?;
            Ok(if is_uses {
                RelCond::UsesS(first, second)
            } else {
                RelCond::ModifiesS(first, second)
            })
        } else {
            let first = self.parse_ent_ref()?;
            self.expect(TokenKind::Comma)?;
            let second = self.parse_ent_ref()?;
            Ok(if is_uses {
                RelCond::UsesP(first, second)
            } else {
                RelCond::ModifiesP(first, second)
            })
        }
    }

    fn parse_stmt_ref(&mut self) -> Parse<StmtRef> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Underscore => Ok(StmtRef::Wildcard),
            TokenKind::Int(value) => {
                let id: StmtId = value
                    .parse()
                    .map_err(|_| self.error_prev(format!("statement number '{value}' too large")))?;
                Ok(StmtRef::Id(id))
            }
            TokenKind::Name(name) => Ok(StmtRef::Decl(self.lookup_synonym(&name)?)),
            kind => Err(Box::new(
                Diag::error(format!("invalid statement reference {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    fn parse_ent_ref(&mut self) -> Parse<EntRef> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Underscore => Ok(EntRef::Wildcard),
            TokenKind::Str(text) => {
                let name = text.trim();
                if !is_valid_name(name) {
                    return Err(Box::new(
                        Diag::error(format!("'{name}' is not a valid entity name"))
                            .with_primary_label(tok.span, "here"),
                    ));
                }
                Ok(EntRef::Name(name.into()))
            }
            TokenKind::Name(name) => Ok(EntRef::Decl(self.lookup_synonym(&name)?)),
            kind => Err(Box::new(
                Diag::error(format!("invalid entity reference {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    fn parse_pattern_cond(&mut self) -> Parse<PatternCond> {
        let decl = self.expect_synonym()?;

        self.expect(TokenKind::LParen)?;
        let cond = match decl.ent {
            DesignEnt::Assign => {
                let ent = self.parse_ent_ref()?;
                self.expect(TokenKind::Comma)?;
                let spec = self.parse_expr_spec()?;
                PatternCond::Assign {
                    assign: decl,
                    ent,
                    spec,
                }
            }
            DesignEnt::While => {
                let var = self.parse_ent_ref()?;
                self.expect(TokenKind::Comma)?;
                self.expect(TokenKind::Underscore)?;
                PatternCond::While { decl, var }
            }
            DesignEnt::If => {
                let var = self.parse_ent_ref()?;
                self.expect(TokenKind::Comma)?;
                self.expect(TokenKind::Underscore)?;
                self.expect(TokenKind::Comma)?;
                self.expect(TokenKind::Underscore)?;
                PatternCond::If { decl, var }
            }
            ent => {
                return Err(self.error_prev(format!(
                    "pattern synonym must be an assign, while, or if, not {ent}"
                )));
            }
        };
        self.expect(TokenKind::RParen)?;
        Ok(cond)
    }

    fn parse_expr_spec(&mut self) -> Parse<ExprSpec> {
        let is_subexpr = self.consume(&TokenKind::Underscore);

        let expr = if let TokenKind::Str(text) = &self.peek().kind {
            let text = text.clone();
            self.advance();
            let expr = parse_expression_text(&text).map_err(|diag| {
                self.error_prev(format!("invalid pattern expression: {}", diag.message))
            })?;
            Some(expr)
        } else {
            None
        };

        // a bare '_' is valid on its own, so only a quoted expression
        // requires the closing '_'.
        if is_subexpr && expr.is_some() {
            self.expect(TokenKind::Underscore)?;
        }

        Ok(ExprSpec { is_subexpr, expr })
    }

    fn parse_with_cond(&mut self) -> Parse<WithCond> {
        let lhs = self.parse_with_ref()?;
        self.expect(TokenKind::Equal)?;
        let rhs = self.parse_with_ref()?;
        Ok(WithCond { lhs, rhs })
    }

    fn parse_with_ref(&mut self) -> Parse<WithRef> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Int(value) => {
                let id: StmtId = value
                    .parse()
                    .map_err(|_| self.error_prev(format!("integer '{value}' too large")))?;
                Ok(WithRef::Int(id))
            }
            TokenKind::Str(text) => Ok(WithRef::Str(SmolStr::from(text.trim()))),
            TokenKind::Name(name) => {
                let decl = self.lookup_synonym(&name)?;
                if self.consume(&TokenKind::Dot) {
                    let attr = self.parse_attr_name(&decl)?;
                    Ok(WithRef::Attr(AttrRef { decl, attr }))
                } else if decl.ent == DesignEnt::ProgLine {
                    Ok(WithRef::Decl(decl))
                } else {
                    Err(self.error_prev(format!(
                        "bare synonym '{name}' in a with-clause must be a prog_line"
                    )))
                }
            }
            kind => Err(Box::new(
                Diag::error(format!("invalid with-clause reference {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    // --- token plumbing ---

    fn lookup_synonym(&self, name: &str) -> Parse<DeclRef> {
        self.declarations
            .get(name)
            .cloned()
            .ok_or_else(|| self.error_here(format!("synonym '{name}' was not declared")))
    }

    fn expect_synonym(&mut self) -> Parse<DeclRef> {
        let name = self.expect_name("synonym")?;
        self.declarations
            .get(&name)
            .cloned()
            .ok_or_else(|| self.error_prev(format!("synonym '{name}' was not declared")))
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is non-empty"))
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        self.advance();
        tok
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_soft_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().kind.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_soft_keyword(&mut self, keyword: &str) -> Parse<()> {
        if self.consume_soft_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{keyword}', found {}", self.peek().kind)))
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Parse<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {kind}, found {}", self.peek().kind)))
        }
    }

    fn expect_name(&mut self, what: &str) -> Parse<SmolStr> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Name(name) => Ok(name),
            kind => Err(Box::new(
                Diag::error(format!("expected {what}, found {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        Box::new(Diag::error(message.into()).with_primary_label(self.peek().span.clone(), "here"))
    }

    fn error_prev(&self, message: impl Into<String>) -> ParseError {
        let span = if self.pos > 0 {
            self.tokens[self.pos - 1].span.clone()
        } else {
            self.peek().span.clone()
        };
        Box::new(Diag::error(message.into()).with_primary_label(span, "here"))
    }
}

fn is_valid_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(source: &str) -> Query {
        parse_query(source).expect("query must parse")
    }

    #[test]
    fn parses_declarations() {
        let q = query("stmt s; assign a1, a2; variable v; Select s");
        assert_eq!(q.declarations.len(), 4);
        assert_eq!(q.declarations.get("a2").unwrap().ent, DesignEnt::Assign);
    }

    #[test]
    fn duplicate_declaration_is_an_error() {
        assert!(parse_query("stmt s; assign s; Select s").is_err());
    }

    #[test]
    fn select_boolean() {
        let q = query("Select BOOLEAN");
        assert!(q.select.result.is_bool());
    }

    #[test]
    fn declared_boolean_synonym_wins() {
        let q = query("stmt BOOLEAN; Select BOOLEAN");
        assert!(!q.select.result.is_bool());
    }

    #[test]
    fn select_tuple_with_attrs() {
        let q = query("procedure p; call c; constant k; Select <p.procName, c, k.value>");
        let ResultCl::Tuple(elems) = &q.select.result else {
            panic!("expected tuple");
        };
        assert_eq!(elems.len(), 3);
        assert!(matches!(&elems[0], Elem::Attr(a) if a.attr == AttrName::ProcName));
        assert!(matches!(&elems[1], Elem::Decl(d) if d.name == "c"));
    }

    #[test]
    fn stmt_num_attribute() {
        let q = query("stmt s; Select s.stmt#");
        let ResultCl::Tuple(elems) = &q.select.result else {
            panic!("expected tuple");
        };
        assert!(matches!(&elems[0], Elem::Attr(a) if a.attr == AttrName::StmtNum));
    }

    #[test]
    fn attribute_must_apply_to_entity() {
        assert!(parse_query("assign a; Select a.procName").is_err());
        assert!(parse_query("variable v; Select v.value").is_err());
    }

    #[test]
    fn such_that_with_and_chain() {
        let q = query("stmt s1, s2; Select s1 such that Follows(s1, s2) and Parent*(s1, _)");
        assert_eq!(q.select.relations.len(), 2);
        assert!(matches!(q.select.relations[0], RelCond::Follows(..)));
        assert!(matches!(q.select.relations[1], RelCond::ParentT(..)));
    }

    #[test]
    fn all_relation_names_parse() {
        let q = query(
            "stmt s1, s2; procedure p, q1; variable v; \
             Select s1 such that Follows(s1, s2) and Follows*(s1, s2) \
             and Parent(s1, s2) and Parent*(s1, s2) \
             and Calls(p, q1) and Calls*(p, q1) \
             and Next(s1, s2) and Next*(s1, s2) \
             and NextBip(s1, s2) and NextBip*(s1, s2) \
             and Affects(s1, s2) and Affects*(s1, s2) \
             and AffectsBip(s1, s2) and AffectsBip*(s1, s2) \
             and Uses(s1, v) and Modifies(s1, v)",
        );
        assert_eq!(q.select.relations.len(), 16);
    }

    #[test]
    fn uses_dispatches_on_first_argument() {
        let q = query("variable v; procedure p; Select v such that Uses(p, v)");
        assert!(matches!(q.select.relations[0], RelCond::UsesP(..)));

        let q = query("variable v; Select v such that Uses(3, v)");
        assert!(matches!(q.select.relations[0], RelCond::UsesS(..)));

        let q = query("variable v; Select v such that Uses(\"main\", v)");
        assert!(matches!(q.select.relations[0], RelCond::UsesP(..)));

        let q = query("variable v; stmt s; Select v such that Modifies(s, v)");
        assert!(matches!(q.select.relations[0], RelCond::ModifiesS(..)));
    }

    #[test]
    fn assign_pattern_forms() {
        let q = query("assign a; Select a pattern a(_, _)");
        let PatternCond::Assign { spec, .. } = &q.select.patterns[0] else {
            panic!("expected assign pattern");
        };
        assert!(spec.is_subexpr);
        assert!(spec.expr.is_none());

        let q = query("assign a; Select a pattern a(\"x\", \"y + 1\")");
        let PatternCond::Assign { ent, spec, .. } = &q.select.patterns[0] else {
            panic!("expected assign pattern");
        };
        assert!(matches!(ent, EntRef::Name(n) if n == "x"));
        assert!(!spec.is_subexpr);
        assert_eq!(spec.expr.as_ref().unwrap().to_string(), "(y + 1)");

        let q = query("assign a; variable v; Select a pattern a(v, _\"x + 1\"_)");
        let PatternCond::Assign { spec, .. } = &q.select.patterns[0] else {
            panic!("expected assign pattern");
        };
        assert!(spec.is_subexpr);
        assert!(spec.expr.is_some());
    }

    #[test]
    fn while_and_if_patterns() {
        let q = query("while w; Select w pattern w(\"x\", _)");
        assert!(matches!(q.select.patterns[0], PatternCond::While { .. }));

        let q = query("if ifs; variable v; Select ifs pattern ifs(v, _, _)");
        assert!(matches!(q.select.patterns[0], PatternCond::If { .. }));

        // the if form requires both trailing wildcards
        assert!(parse_query("if ifs; Select ifs pattern ifs(_, _)").is_err());
    }

    #[test]
    fn pattern_synonym_kind_is_checked() {
        assert!(parse_query("stmt s; Select s pattern s(_, _)").is_err());
    }

    #[test]
    fn with_clauses() {
        let q = query("prog_line n; Select n with n = 10");
        assert!(matches!(q.select.withs[0].lhs, WithRef::Decl(_)));
        assert!(matches!(q.select.withs[0].rhs, WithRef::Int(10)));

        let q = query("procedure p; call c; Select p with p.procName = c.procName");
        assert!(matches!(q.select.withs[0].lhs, WithRef::Attr(_)));

        let q = query("read r; Select r with r.varName = \"x\" and r.stmt# = 4");
        assert_eq!(q.select.withs.len(), 2);
    }

    #[test]
    fn bare_non_prog_line_synonym_in_with_is_an_error() {
        assert!(parse_query("stmt s; Select s with s = 10").is_err());
    }

    #[test]
    fn undeclared_synonym_is_an_error() {
        assert!(parse_query("Select s").is_err());
        assert!(parse_query("stmt s; Select s such that Follows(s, t)").is_err());
        assert!(parse_query("assign a; Select a pattern a(v, _)").is_err());
    }

    #[test]
    fn trailing_tokens_are_an_error() {
        assert!(parse_query("stmt s; Select s extra").is_err());
    }

    #[test]
    fn quoted_names_are_validated() {
        assert!(parse_query("procedure p; Select p such that Calls(\"1bad\", _)").is_err());
        let q = query("procedure p; Select p such that Calls(\" main \", _)");
        let RelCond::Calls(EntRef::Name(name), _) = &q.select.relations[0] else {
            panic!("expected Calls");
        };
        assert_eq!(name, "main");
    }
}
