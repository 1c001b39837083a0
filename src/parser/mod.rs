//! Recursive-descent parser for SIMPLE programs.
//!
//! The parser consumes the shared token stream and builds the AST of
//! [`crate::ast`]. SIMPLE keywords are soft: a statement beginning with
//! a keyword that is immediately followed by `=` is an assignment to a
//! variable of that name, so the parser decides keyword-ness with one
//! token of lookahead instead of relying on the lexer.
//!
//! Conditional expressions need care: `(` can open either a
//! parenthesised arithmetic expression (`(x + 1) > 2`) or a
//! parenthesised conditional (`(x > 1) && (y < 2)`), and relational
//! operators must not chain. The cond-expr parser therefore parses the
//! parenthesised part first and decides from the operator that follows.

use crate::ast::{BinOp, Expr, Procedure, Program, Stmt, StmtKind, StmtList, UnOp};
use crate::diag::{Diag, SourceFile, convert_diag_to_report};
use crate::lexer::token::{Token, TokenKind};
use crate::lexer::tokenize;
use miette::Report;
use std::rc::Rc;

/// Result of parsing a SIMPLE program.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed program, or None if parsing failed.
    pub ast: Option<Program>,
    /// All collected diagnostics rendered as miette reports.
    pub diagnostics: Vec<Report>,
}

/// Parses SIMPLE source text end-to-end (lexing + parsing).
pub fn parse_program(source: &str) -> ParseResult {
    let lex_result = tokenize(source);
    let mut diags = lex_result.diagnostics;

    let mut parser = Parser::new(lex_result.tokens);
    let ast = match parser.parse_program() {
        Ok(program) if diags.is_empty() => Some(program),
        Ok(_) => None,
        Err(diag) => {
            diags.push(*diag);
            None
        }
    };

    let source = SourceFile::new(source);
    let diagnostics = diags
        .iter()
        .map(|diag| convert_diag_to_report(diag, &source))
        .collect();

    ParseResult { ast, diagnostics }
}

/// Parses a standalone SIMPLE expression, as used by PQL expression
/// specs. The whole text must be consumed.
pub fn parse_expression_text(text: &str) -> Result<Expr, Box<Diag>> {
    let lex_result = tokenize(text);
    if let Some(diag) = lex_result.diagnostics.into_iter().next() {
        return Err(Box::new(diag));
    }

    let mut parser = Parser::new(lex_result.tokens);
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

type ParseError = Box<Diag>;
type Parse<T> = Result<T, ParseError>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let eof_pos = tokens.last().map(|t| t.span.end).unwrap_or(0);
            tokens.push(Token::new(TokenKind::Eof, eof_pos..eof_pos));
        }
        Self { tokens, pos: 0 }
    }

    fn parse_program(&mut self) -> Parse<Program> {
        let mut program = Program::default();
        while !self.check(&TokenKind::Eof) {
            program.procedures.push(self.parse_procedure()?);
        }
        if program.procedures.is_empty() {
            return Err(self.error_here("expected at least one procedure"));
        }
        Ok(program)
    }

    fn parse_procedure(&mut self) -> Parse<Procedure> {
        let kw = self.next();
        if !kw.kind.is_keyword("procedure") {
            return Err(Box::new(
                Diag::error(format!("expected 'procedure', found {}", kw.kind))
                    .with_primary_label(kw.span, "here"),
            ));
        }

        let name = self.expect_name("procedure name")?;
        let body = self.parse_stmt_list()?;
        Ok(Procedure { name, body })
    }

    fn parse_stmt_list(&mut self) -> Parse<StmtList> {
        self.expect(TokenKind::LBrace)?;

        let mut list = StmtList::default();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("unexpected end of input, expected '}'"));
            }
            list.stmts.push(Rc::new(self.parse_stmt()?));
        }
        self.expect(TokenKind::RBrace)?;

        // the grammar specifies "stmt+"
        if list.stmts.is_empty() {
            return Err(self.error_here("expected at least one statement between '{' and '}'"));
        }
        Ok(list)
    }

    fn parse_stmt(&mut self) -> Parse<Stmt> {
        let tok = self.next();

        // one token of lookahead: `X = ...` is an assignment to the
        // variable X even when X spells a keyword.
        let keyword = match &tok.kind {
            TokenKind::Name(name) if !self.check(&TokenKind::Equal) => Some(name.clone()),
            _ => None,
        };

        if let Some(keyword) = keyword {
            match keyword.as_str() {
                "read" => {
                    let var = self.expect_name("variable name after 'read'")?;
                    self.expect(TokenKind::Semicolon)?;
                    return Ok(Stmt::new(StmtKind::Read { var }));
                }
                "print" => {
                    let var = self.expect_name("variable name after 'print'")?;
                    self.expect(TokenKind::Semicolon)?;
                    return Ok(Stmt::new(StmtKind::Print { var }));
                }
                "call" => {
                    let proc = self.expect_name("procedure name after 'call'")?;
                    self.expect(TokenKind::Semicolon)?;
                    return Ok(Stmt::new(StmtKind::Call { proc }));
                }
                "if" => return self.parse_if_stmt(),
                "while" => return self.parse_while_stmt(),
                _ => {
                    return Err(Box::new(
                        Diag::error(format!("unexpected {} at beginning of statement", tok.kind))
                            .with_primary_label(tok.span, "here"),
                    ));
                }
            }
        }

        match tok.kind {
            TokenKind::Name(lhs) => {
                self.expect(TokenKind::Equal)?;
                let rhs = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Assign { lhs, rhs }))
            }
            kind => Err(Box::new(
                Diag::error(format!("unexpected {kind} at beginning of statement"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    fn parse_if_stmt(&mut self) -> Parse<Stmt> {
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_cond_expr(0)?;
        self.expect(TokenKind::RParen)?;

        self.expect_keyword("then")?;
        let then_body = self.parse_stmt_list()?;

        self.expect_keyword("else")?;
        let else_body = self.parse_stmt_list()?;

        Ok(Stmt::new(StmtKind::If {
            cond,
            then_body,
            else_body,
        }))
    }

    fn parse_while_stmt(&mut self) -> Parse<Stmt> {
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_cond_expr(0)?;
        self.expect(TokenKind::RParen)?;

        let body = self.parse_stmt_list()?;
        Ok(Stmt::new(StmtKind::While { cond, body }))
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> Parse<Expr> {
        let primary = self.parse_primary()?;
        self.parse_rhs(primary, 0)
    }

    fn parse_primary(&mut self) -> Parse<Expr> {
        let tok = self.next();
        match tok.kind {
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Int(value) => Ok(Expr::Const(value)),
            TokenKind::Name(name) => Ok(Expr::Var(name)),
            TokenKind::Eof => Err(Box::new(
                Diag::error("unexpected end of input in expression")
                    .with_primary_label(tok.span, "here"),
            )),
            kind => Err(Box::new(
                Diag::error(format!("invalid start of expression with {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    /// Left-associative precedence climbing over `+ - * / %`.
    fn parse_rhs(&mut self, mut lhs: Expr, min_prec: u8) -> Parse<Expr> {
        loop {
            let Some((op, prec)) = arith_op(&self.peek().kind) else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.advance();

            let mut rhs = self.parse_primary()?;
            if let Some((_, next_prec)) = arith_op(&self.peek().kind) {
                if next_prec > prec {
                    rhs = self.parse_rhs(rhs, prec + 1)?;
                }
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    /// Parses `expr rel_op expr`, with `lhs` already consumed.
    fn parse_rel_expr(&mut self, lhs: Expr) -> Parse<Expr> {
        let tok = self.next();
        let Some(op) = rel_op(&tok.kind) else {
            return Err(Box::new(
                Diag::error(format!("invalid relational operator {}", tok.kind))
                    .with_primary_label(tok.span, "here"),
            ));
        };

        let rhs = self.parse_expr()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Parses `(cond) && (cond)` / `(cond) || (cond)`, with the left
    /// operand already consumed.
    fn parse_binary_cond_expr(&mut self, lhs: Expr) -> Parse<Expr> {
        let tok = self.next();
        let op = match tok.kind {
            TokenKind::AndAnd => BinOp::And,
            TokenKind::OrOr => BinOp::Or,
            kind => {
                return Err(Box::new(
                    Diag::error(format!("expected '&&' or '||', found {kind}"))
                        .with_primary_label(tok.span, "here"),
                ));
            }
        };

        self.expect(TokenKind::LParen)?;
        let rhs = self.parse_cond_expr(0)?;
        self.expect(TokenKind::RParen)?;

        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Parses a conditional expression. `paren_depth` tracks how many
    /// parentheses the caller has opened, so that a `)` at depth > 0
    /// defers to the caller instead of being an error.
    fn parse_cond_expr(&mut self, paren_depth: u32) -> Parse<Expr> {
        if self.check(&TokenKind::Not) {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let operand = self.parse_cond_expr(paren_depth + 1)?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
            });
        }

        if self.check(&TokenKind::LParen) {
            self.advance();

            // The '(' may open a conditional or an arithmetic operand;
            // parse as cond-expr first, which bottoms out in a plain
            // expression when no relational operator is present.
            let mut lhs = self.parse_cond_expr(paren_depth + 1)?;
            self.expect(TokenKind::RParen)?;

            // continue a surrounding arithmetic expression if one follows,
            // e.g. `(x + 1) * 2 > y`.
            if arith_op(&self.peek().kind).is_some() {
                lhs = self.parse_rhs(lhs, 0)?;
            }

            return if self.check(&TokenKind::RParen) && paren_depth > 0 {
                Ok(lhs)
            } else if rel_op(&self.peek().kind).is_some() {
                if is_relational_expr(&lhs) {
                    Err(self.error_here("relational operators cannot be chained"))
                } else {
                    self.parse_rel_expr(lhs)
                }
            } else if matches!(self.peek().kind, TokenKind::AndAnd | TokenKind::OrOr) {
                self.parse_binary_cond_expr(lhs)
            } else {
                Err(self.error_here(format!(
                    "expected a conditional or relational operator after ')', found {}",
                    self.peek().kind
                )))
            };
        }

        let lhs = self.parse_expr()?;
        if self.check(&TokenKind::RParen) && paren_depth > 0 {
            return Ok(lhs);
        }

        // cond-exprs must be parenthesised, so this has to be a rel-expr.
        self.parse_rel_expr(lhs)
    }

    // --- token plumbing ---

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

    fn expect(&mut self, kind: TokenKind) -> Parse<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {kind}, found {}", self.peek().kind)))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Parse<()> {
        if self.peek().kind.is_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{keyword}', found {}", self.peek().kind)))
        }
    }

    fn expect_name(&mut self, what: &str) -> Parse<smol_str::SmolStr> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Name(name) => Ok(name),
            kind => Err(Box::new(
                Diag::error(format!("expected {what}, found {kind}"))
                    .with_primary_label(tok.span, "here"),
            )),
        }
    }

    fn expect_eof(&mut self) -> Parse<()> {
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error_here(format!("unexpected {} after expression", self.peek().kind)))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        Box::new(Diag::error(message.into()).with_primary_label(self.peek().span.clone(), "here"))
    }
}

fn arith_op(kind: &TokenKind) -> Option<(BinOp, u8)> {
    match kind {
        TokenKind::Plus => Some((BinOp::Add, 1)),
        TokenKind::Minus => Some((BinOp::Sub, 1)),
        TokenKind::Star => Some((BinOp::Mul, 2)),
        TokenKind::Slash => Some((BinOp::Div, 2)),
        TokenKind::Percent => Some((BinOp::Mod, 2)),
        _ => None,
    }
}

fn rel_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Lt => Some(BinOp::Lt),
        TokenKind::Gt => Some(BinOp::Gt),
        TokenKind::LtEq => Some(BinOp::LtEq),
        TokenKind::GtEq => Some(BinOp::GtEq),
        TokenKind::EqEq => Some(BinOp::Eq),
        TokenKind::NotEq => Some(BinOp::NotEq),
        _ => None,
    }
}

fn is_relational_expr(expr: &Expr) -> bool {
    matches!(expr, Expr::Binary { op, .. } if op.is_relational())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;

    fn parsed(source: &str) -> Program {
        let result = parse_program(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        result.ast.expect("expected AST")
    }

    #[test]
    fn parses_minimal_program() {
        let program = parsed("procedure main { x = 1; }");
        assert_eq!(program.procedures.len(), 1);
        assert_eq!(program.procedures[0].name, "main");
        assert_eq!(program.procedures[0].body.stmts.len(), 1);
    }

    #[test]
    fn keywords_are_soft() {
        let program = parsed("procedure procedure { while = 1; read = while + 1; if = 2; }");
        let body = &program.procedures[0].body;
        assert_eq!(body.stmts.len(), 3);
        for stmt in &body.stmts {
            assert!(matches!(stmt.kind, StmtKind::Assign { .. }));
        }
    }

    #[test]
    fn read_print_call_statements() {
        let program = parsed("procedure main { read x; print y; call main; }");
        let kinds: Vec<_> = program.procedures[0]
            .body
            .stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Read { .. } => "read",
                StmtKind::Print { .. } => "print",
                StmtKind::Call { .. } => "call",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["read", "print", "call"]);
    }

    #[test]
    fn expression_precedence() {
        let expr = parse_expression_text("1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");

        let expr = parse_expression_text("1 * 2 + 3 % 4").unwrap();
        assert_eq!(expr.to_string(), "((1 * 2) + (3 % 4))");

        let expr = parse_expression_text("a - b - c").unwrap();
        assert_eq!(expr.to_string(), "((a - b) - c)");
    }

    #[test]
    fn parenthesised_expressions() {
        let expr = parse_expression_text("(1 + 2) * 3").unwrap();
        assert_eq!(expr.to_string(), "((1 + 2) * 3)");
    }

    #[test]
    fn expression_text_must_be_fully_consumed() {
        assert!(parse_expression_text("x + 1 ;").is_err());
        assert!(parse_expression_text("x +").is_err());
        assert!(parse_expression_text("").is_err());
    }

    #[test]
    fn simple_conditional() {
        let program = parsed("procedure main { while (i != 0) { i = i - 1; } }");
        let StmtKind::While { cond, .. } = &program.procedures[0].body.stmts[0].kind else {
            panic!("expected while");
        };
        assert_eq!(cond.to_string(), "(i != 0)");
    }

    #[test]
    fn parenthesised_arithmetic_inside_conditional() {
        let program = parsed("procedure main { while ((x + 1) * 2 > y) { x = 1; } }");
        let StmtKind::While { cond, .. } = &program.procedures[0].body.stmts[0].kind else {
            panic!("expected while");
        };
        assert_eq!(cond.to_string(), "(((x + 1) * 2) > y)");
    }

    #[test]
    fn compound_conditionals() {
        let program =
            parsed("procedure main { if ((x == 1) && (!(y < 2))) then { x = 1; } else { x = 2; } }");
        let StmtKind::If { cond, .. } = &program.procedures[0].body.stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(cond.to_string(), "((x == 1) && !((y < 2)))");
    }

    #[test]
    fn nested_binary_conditionals() {
        let program =
            parsed("procedure main { while ((a > 1) || ((b > 2) && (c > 3))) { a = 0; } }");
        let StmtKind::While { cond, .. } = &program.procedures[0].body.stmts[0].kind else {
            panic!("expected while");
        };
        assert_eq!(cond.to_string(), "((a > 1) || ((b > 2) && (c > 3)))");
    }

    #[test]
    fn relational_operators_do_not_chain() {
        let result = parse_program("procedure main { while ((x < 1) < 2) { x = 1; } }");
        assert!(result.ast.is_none());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn empty_statement_list_is_an_error() {
        let result = parse_program("procedure main { }");
        assert!(result.ast.is_none());
    }

    #[test]
    fn missing_else_is_an_error() {
        let result = parse_program("procedure main { if (x == 1) then { y = 1; } }");
        assert!(result.ast.is_none());
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        let result = parse_program("procedure main { x = 1 }");
        assert!(result.ast.is_none());
    }

    #[test]
    fn empty_program_is_an_error() {
        let result = parse_program("");
        assert!(result.ast.is_none());
    }

    #[test]
    fn lexer_diagnostics_fail_the_parse() {
        let result = parse_program("procedure main { x = 01; }");
        assert!(result.ast.is_none());
        assert!(!result.diagnostics.is_empty());
    }
}
