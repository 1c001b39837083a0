//! Lexical analysis shared by the SIMPLE and PQL front ends.
//!
//! Both languages use the same token alphabet (names, integers, the
//! arithmetic/relational/logical operators, and a handful of
//! punctuation), so one scanner serves both. The lexer is
//! error-tolerant: it records a diagnostic and keeps scanning so that
//! the parser sees as much of the input as possible.

pub mod token;

use crate::diag::Diag;
use token::{Token, TokenKind};

/// Result of lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerResult {
    /// The tokens produced, including an EOF token at the end.
    pub tokens: Vec<Token>,
    /// Diagnostics encountered during scanning.
    pub diagnostics: Vec<Diag>,
}

/// A scanner over SIMPLE or PQL source text.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<Diag>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenizes the source text and returns the result.
    pub fn tokenize(mut self) -> LexerResult {
        while !self.is_at_end() {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }
            self.scan_token();
        }

        let eof_pos = self.source.len();
        self.tokens
            .push(Token::new(TokenKind::Eof, eof_pos..eof_pos));

        LexerResult {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn scan_token(&mut self) {
        let start = self.pos;
        let ch = self.advance();

        match ch {
            '(' => self.add_token(TokenKind::LParen, start),
            ')' => self.add_token(TokenKind::RParen, start),
            '{' => self.add_token(TokenKind::LBrace, start),
            '}' => self.add_token(TokenKind::RBrace, start),
            ';' => self.add_token(TokenKind::Semicolon, start),
            ',' => self.add_token(TokenKind::Comma, start),
            '.' => self.add_token(TokenKind::Dot, start),
            '#' => self.add_token(TokenKind::Hash, start),
            '+' => self.add_token(TokenKind::Plus, start),
            '-' => self.add_token(TokenKind::Minus, start),
            '*' => self.add_token(TokenKind::Star, start),
            '/' => self.add_token(TokenKind::Slash, start),
            '%' => self.add_token(TokenKind::Percent, start),

            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq, start);
                } else {
                    self.add_token(TokenKind::Lt, start);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq, start);
                } else {
                    self.add_token(TokenKind::Gt, start);
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::EqEq, start);
                } else {
                    self.add_token(TokenKind::Equal, start);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq, start);
                } else {
                    self.add_token(TokenKind::Not, start);
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenKind::AndAnd, start);
                } else {
                    self.error(start, "expected '&&'");
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenKind::OrOr, start);
                } else {
                    self.error(start, "expected '||'");
                }
            }

            '"' => self.scan_quoted(start),
            '_' => self.add_token(TokenKind::Underscore, start),

            '0'..='9' => self.scan_number(start),
            'a'..='z' | 'A'..='Z' => self.scan_name(start),

            _ => {
                self.error(start, &format!("invalid character '{ch}'"));
                // Error recovery: skip this character and continue.
            }
        }
    }

    /// Scans a name: a letter followed by letters, digits, or underscores.
    ///
    /// The underscore continuation is needed for the PQL `prog_line`
    /// entity; SIMPLE names never contain one, but the parser rejects
    /// them there for free because no SIMPLE production accepts it.
    fn scan_name(&mut self, start: usize) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        self.add_token(TokenKind::Name(text.into()), start);
    }

    /// Scans an integer literal. Multi-digit literals must not start
    /// with `0`.
    fn scan_number(&mut self, start: usize) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        if text.len() > 1 && text.starts_with('0') {
            self.diagnostics.push(
                Diag::error(format!("integer literal '{text}' has a leading zero"))
                    .with_primary_label(start..self.pos, "here")
                    .with_code("L002"),
            );
        }
        self.add_token(TokenKind::Int(text.into()), start);
    }

    /// Scans the raw text between double quotes.
    ///
    /// PQL uses quotes both for entity names (`"main"`) and for
    /// expression specs (`"x + 1"`); the parser re-lexes the contents
    /// as needed, so the scanner only captures the raw slice.
    fn scan_quoted(&mut self, start: usize) {
        let content_start = self.pos;
        while self.peek() != '"' && !self.is_at_end() {
            self.advance();
        }

        if self.is_at_end() {
            self.error(start, "unclosed quoted string");
            // Error recovery: synthesize the closing quote.
        }

        let text = &self.source[content_start..self.pos];
        if !self.is_at_end() {
            self.advance();
        }
        self.add_token(TokenKind::Str(text.into()), start);
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn add_token(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token::new(kind, start..self.pos));
    }

    fn error(&mut self, pos: usize, message: &str) {
        let span = pos..pos.saturating_add(1).min(self.source.len());
        self.diagnostics.push(
            Diag::error(message)
                .with_primary_label(span, "here")
                .with_code("L001"),
        );
    }

    fn peek(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let ch = self.peek();
        if ch != '\0' {
            self.pos += ch.len_utf8();
        }
        ch
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }
}

/// Convenience function to tokenize a source string.
pub fn tokenize(source: &str) -> LexerResult {
    Lexer::new(source).tokenize()
}
