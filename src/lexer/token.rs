//! Token types shared by the SIMPLE and PQL scanners.

use crate::ast::Span;
use smol_str::SmolStr;
use std::fmt;

/// The kind of a lexical token.
///
/// SIMPLE and PQL draw from the same token alphabet, so a single kind
/// enum serves both front ends. Keywords are soft in both languages and
/// are therefore lexed as plain names; the parsers decide what a name
/// means from context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An identifier or soft keyword.
    Name(SmolStr),
    /// An integer literal, kept as its lexeme.
    Int(SmolStr),
    /// The raw text between a pair of double quotes.
    Str(SmolStr),

    LParen,
    RParen,
    LBrace,
    RBrace,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
    Not,
    AndAnd,
    OrOr,

    /// A single `=`: assignment in SIMPLE, equality in PQL `with`.
    Equal,
    Semicolon,
    Comma,
    Dot,
    Hash,
    Underscore,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Name(name) => write!(f, "'{name}'"),
            TokenKind::Int(value) => write!(f, "'{value}'"),
            TokenKind::Str(text) => write!(f, "\"{text}\""),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::LtEq => write!(f, "'<='"),
            TokenKind::GtEq => write!(f, "'>='"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Not => write!(f, "'!'"),
            TokenKind::AndAnd => write!(f, "'&&'"),
            TokenKind::OrOr => write!(f, "'||'"),
            TokenKind::Equal => write!(f, "'='"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Hash => write!(f, "'#'"),
            TokenKind::Underscore => write!(f, "'_'"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

impl TokenKind {
    /// Returns the name text if this token is a name.
    pub fn as_name(&self) -> Option<&SmolStr> {
        match self {
            TokenKind::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true if this token is the given soft keyword.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, TokenKind::Name(name) if name == keyword)
    }
}

/// A lexical token with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Byte range in the source text.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_check_is_exact() {
        let kind = TokenKind::Name("while".into());
        assert!(kind.is_keyword("while"));
        assert!(!kind.is_keyword("While"));
        assert!(!TokenKind::Underscore.is_keyword("while"));
    }

    #[test]
    fn display_is_quoted() {
        assert_eq!(TokenKind::Name("x".into()).to_string(), "'x'");
        assert_eq!(TokenKind::EqEq.to_string(), "'=='");
        assert_eq!(TokenKind::Eof.to_string(), "end of input");
    }
}
