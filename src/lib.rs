//! Static program analyzer for the SIMPLE language.
//!
//! A SIMPLE program is parsed into an AST, a design extractor distils
//! it into a Program Knowledge Base (statement relations, the call
//! graph, uses/modifies, and a control-flow graph), and declarative
//! PQL queries are evaluated against that knowledge base.
//!
//! # Analyze and query
//!
//! ```
//! use spa_engine::Analyzer;
//!
//! let analyzer = Analyzer::from_source(
//!     "procedure main { x = 1; y = x + 1; print y; }",
//! )
//! .unwrap();
//!
//! let mut results = Vec::new();
//! analyzer.evaluate("assign a; Select a such that Follows(a, _)", &mut results);
//! results.sort();
//! assert_eq!(results, vec!["1", "2"]);
//! ```
//!
//! # Boolean queries
//!
//! ```
//! use spa_engine::Analyzer;
//!
//! let analyzer = Analyzer::from_source(
//!     "procedure main { x = 1; call helper; } procedure helper { print x; }",
//! )
//! .unwrap();
//!
//! let mut results = Vec::new();
//! analyzer.evaluate(
//!     "Select BOOLEAN such that Calls(\"main\", \"helper\")",
//!     &mut results,
//! );
//! assert_eq!(results, vec!["TRUE"]);
//! ```

use miette::Report;
use std::path::Path;
use tracing::error;

pub mod ast;
pub mod diag;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod pkb;
pub mod pql;

// Re-export the front-end entry points.
pub use lexer::{Lexer, LexerResult, tokenize};
pub use parser::{ParseResult, parse_program};
pub use pql::parse_query;

// Re-export the knowledge-base types.
pub use pkb::{Pkb, PkbError, extract};

/// A retained knowledge base with the driver contract the test harness
/// consumes: build once from a SIMPLE source, then evaluate any number
/// of PQL queries against it.
#[derive(Debug)]
pub struct Analyzer {
    pkb: Pkb,
}

impl Analyzer {
    /// Parses a SIMPLE program and runs the design extractor.
    ///
    /// Any parse or extraction failure aborts the whole pipeline: no
    /// knowledge base is retained and the diagnostics are returned.
    pub fn from_source(source: &str) -> Result<Self, Vec<Report>> {
        let parsed = parse_program(source);
        let Some(program) = parsed.ast else {
            return Err(parsed.diagnostics);
        };

        match pkb::extract(program) {
            Ok(pkb) => Ok(Self { pkb }),
            Err(err) => Err(vec![Report::msg(err.to_string())]),
        }
    }

    /// Reads and analyzes a SIMPLE source file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Vec<Report>> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| vec![Report::msg(format!("cannot read {}: {err}", path.display()))])?;
        Self::from_source(&source)
    }

    /// The retained knowledge base.
    pub fn pkb(&self) -> &Pkb {
        &self.pkb
    }

    /// Evaluates one PQL query, appending result strings to `out`.
    ///
    /// This is the harness contract: `out` is cleared first, a query
    /// that fails to parse leaves it empty (the error is logged), and
    /// a semantically invalid or unsatisfiable query yields the failed
    /// result (`FALSE` for BOOLEAN queries, nothing otherwise). It
    /// never panics.
    pub fn evaluate(&self, query: &str, out: &mut Vec<String>) {
        out.clear();
        match pql::parse_query(query) {
            Ok(parsed) => out.extend(eval::evaluate(&self.pkb, &parsed)),
            Err(diag) => {
                error!(query, error = %diag.message, "failed to parse PQL query");
            }
        }
    }

    /// Like [`Analyzer::evaluate`], but surfaces the parse failure.
    pub fn try_evaluate(&self, query: &str) -> Result<Vec<String>, Report> {
        let parsed = pql::parse_query(query).map_err(|diag| {
            diag::convert_diag_to_report(&diag, &diag::SourceFile::new(query))
        })?;
        Ok(eval::evaluate(&self.pkb, &parsed))
    }
}
