//! Internal diagnostic model for lexer, parser, and extractor errors.

use crate::ast::Span;
use miette::{Diagnostic, LabeledSpan, Report, Severity};
use std::fmt;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSeverity {
    /// A fatal error that prevents further processing.
    Error,
    /// A warning about potentially problematic code.
    Warning,
}

impl fmt::Display for DiagSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagSeverity::Error => write!(f, "error"),
            DiagSeverity::Warning => write!(f, "warning"),
        }
    }
}

/// Role of a labelled span in the overall diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRole {
    /// The primary location related to this diagnostic.
    Primary,
    /// A secondary or supporting location.
    Secondary,
}

/// A labelled span within a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagLabel {
    /// The span this label refers to.
    pub span: Span,
    /// The label text explaining this span's relevance.
    pub message: String,
    /// Whether this is a primary or secondary label.
    pub role: LabelRole,
}

/// A structured diagnostic message.
///
/// This is the internal representation used throughout the SIMPLE and PQL
/// front ends. It captures everything needed to render rich error reports
/// with source context, labelled spans, and help text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    /// The severity level of this diagnostic.
    pub severity: DiagSeverity,
    /// The main diagnostic message.
    pub message: String,
    /// Labelled spans showing relevant source locations.
    pub labels: Vec<DiagLabel>,
    /// Optional help text suggesting how to fix the issue.
    pub help: Option<String>,
    /// Optional diagnostic code (e.g. "L001" or "Q003").
    pub code: Option<String>,
}

impl Diag {
    /// Creates a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: DiagSeverity::Error,
            message: message.into(),
            labels: Vec::new(),
            help: None,
            code: None,
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: DiagSeverity::Warning,
            ..Self::error(message)
        }
    }

    /// Adds a primary label to this diagnostic.
    pub fn with_primary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            message: message.into(),
            role: LabelRole::Primary,
        });
        self
    }

    /// Adds a secondary label to this diagnostic.
    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            message: message.into(),
            role: LabelRole::Secondary,
        });
        self
    }

    /// Sets the help text for this diagnostic.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Sets the diagnostic code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// A wrapper around source text for diagnostic rendering.
///
/// Owns the text and validates spans against its bounds so that a
/// malformed span can never panic the report renderer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    content: String,
    name: Option<String>,
}

impl SourceFile {
    /// Creates a new source file from the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }

    /// Creates a new source file with a name.
    pub fn with_name(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the source content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the source file name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Clamps a span to valid bounds within this source.
    pub fn clamp_span(&self, span: &Span) -> Span {
        let len = self.content.len();
        let start = span.start.min(len);
        let end = span.end.min(len).max(start);
        start..end
    }
}

/// Converts internal diagnostics to miette Reports with source context.
pub fn convert_diagnostics_to_reports(diagnostics: &[Diag], source: &SourceFile) -> Vec<Report> {
    diagnostics
        .iter()
        .map(|diag| convert_diag_to_report(diag, source))
        .collect()
}

/// Converts a single diagnostic to a miette Report, clamping spans.
pub fn convert_diag_to_report(diag: &Diag, source: &SourceFile) -> Report {
    let mut labels = Vec::new();
    for label in &diag.labels {
        let clamped = source.clamp_span(&label.span);
        let span = (clamped.start, clamped.end - clamped.start);
        labels.push(match label.role {
            LabelRole::Primary => {
                LabeledSpan::new_primary_with_span(Some(label.message.clone()), span)
            }
            LabelRole::Secondary => LabeledSpan::new_with_span(Some(label.message.clone()), span),
        });
    }

    let diagnostic = BuiltDiagnostic {
        message: diag.message.clone(),
        severity: match diag.severity {
            DiagSeverity::Error => Severity::Error,
            DiagSeverity::Warning => Severity::Warning,
        },
        code: diag.code.clone(),
        help: diag.help.clone(),
        labels,
    };

    let report = Report::new(diagnostic);
    if let Some(name) = source.name() {
        report.with_source_code(miette::NamedSource::new(name, source.content().to_string()))
    } else {
        report.with_source_code(source.content().to_string())
    }
}

/// The final diagnostic type that implements miette's Diagnostic trait.
#[derive(Debug)]
struct BuiltDiagnostic {
    message: String,
    severity: Severity,
    code: Option<String>,
    help: Option<String>,
    labels: Vec<LabeledSpan>,
}

impl fmt::Display for BuiltDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BuiltDiagnostic {}

impl Diagnostic for BuiltDiagnostic {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.code
            .as_ref()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            None
        } else {
            Some(Box::new(self.labels.clone().into_iter()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_display() {
        assert_eq!(DiagSeverity::Error.to_string(), "error");
        assert_eq!(DiagSeverity::Warning.to_string(), "warning");
    }

    #[test]
    fn diag_builder() {
        let diag = Diag::error("unexpected token")
            .with_primary_label(0..5, "here")
            .with_help("try adding a semicolon")
            .with_code("P001");

        assert_eq!(diag.severity, DiagSeverity::Error);
        assert_eq!(diag.labels.len(), 1);
        assert_eq!(diag.labels[0].role, LabelRole::Primary);
        assert_eq!(diag.help.as_deref(), Some("try adding a semicolon"));
        assert_eq!(diag.code.as_deref(), Some("P001"));
    }

    #[test]
    fn diag_multi_label() {
        let diag = Diag::error("duplicate definition of procedure 'main'")
            .with_primary_label(20..25, "second definition here")
            .with_secondary_label(5..10, "first definition here");

        assert_eq!(diag.labels.len(), 2);
        assert_eq!(diag.labels[0].role, LabelRole::Primary);
        assert_eq!(diag.labels[1].role, LabelRole::Secondary);
    }

    #[test]
    fn source_file_clamp_span() {
        let src = SourceFile::new("hello");
        assert_eq!(src.clamp_span(&(0..10)), 0..5);
        assert_eq!(src.clamp_span(&(2..4)), 2..4);
        assert_eq!(src.clamp_span(&(10..20)), 5..5);
    }

    #[test]
    fn convert_simple_error() {
        let source = SourceFile::with_name("procedure main {", "test.simple");
        let diag = Diag::error("unexpected end of input").with_primary_label(15..16, "here");

        let report = convert_diag_to_report(&diag, &source);
        assert_eq!(report.to_string(), "unexpected end of input");
    }

    #[test]
    fn convert_with_invalid_span() {
        let source = SourceFile::new("short");
        let diag = Diag::error("error").with_primary_label(0..100, "out of bounds");

        let report = convert_diag_to_report(&diag, &source);
        assert_eq!(report.to_string(), "error");
    }

    #[test]
    fn convert_multiple_diagnostics() {
        let source = SourceFile::new("test source");
        let diags = vec![
            Diag::error("error 1").with_primary_label(0..4, "here"),
            Diag::warning("warning 1").with_primary_label(5..11, "there"),
        ];

        let reports = convert_diagnostics_to_reports(&diags, &source);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].to_string(), "error 1");
        assert_eq!(reports[1].to_string(), "warning 1");
    }
}
