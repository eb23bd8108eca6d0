//! Patra Error Handling - Unified Encapsulated API
//!
//! One diagnostic error type for every failure mode that is allowed to escape
//! the crate: parse failures surfaced at a top-level entry point, and
//! configuration errors raised during document rewriting. Parse failures that
//! stay *inside* a parse are plain values (`ParseResult::Failure`) and never
//! touch this module.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text carried alongside an error so diagnostics can render the
/// offending line and column.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real input text.
    /// This is the preferred method for error reporting.
    pub fn from_text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when no input text is involved (configuration
    /// errors, rewrite errors). Use only when real source cannot be obtained.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

/// The single error type - no wrapper, no variants, just essential data
#[derive(Debug)]
pub struct PatraError {
    /// What went wrong (type-specific data)
    pub kind: ErrorKind,
    /// Where it happened (context-specific source information)
    pub source_info: SourceInfo,
    /// How to help (auto-populated based on context)
    pub diagnostic_info: DiagnosticInfo,
}

/// All error types as a clean enum - no duplicate fields
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Parse errors - surfaced when a top-level parse entry point fails
    ParseFailure {
        message: String,
    },
    UnconsumedInput {
        remaining: String,
    },

    // Configuration errors - fatal for the document being rewritten
    ConfigKeyMissing {
        key: String,
    },
    ConfigTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },
    InvalidSelection {
        group: String,
        choice: String,
    },
}

/// Context-specific source information
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation - each context knows how to create appropriate errors
pub trait ErrorReporting {
    /// Create an error with context-appropriate enhancements
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> PatraError;

    /// Convenience methods for common error types
    fn parse_failure(&self, message: impl Into<String>, span: SourceSpan) -> PatraError {
        self.report(
            ErrorKind::ParseFailure {
                message: message.into(),
            },
            span,
        )
    }

    fn unconsumed_input(&self, remaining: impl Into<String>, span: SourceSpan) -> PatraError {
        self.report(
            ErrorKind::UnconsumedInput {
                remaining: remaining.into(),
            },
            span,
        )
    }

    fn config_key_missing(&self, key: &str) -> PatraError {
        self.report(ErrorKind::ConfigKeyMissing { key: key.into() }, unspanned())
    }

    fn config_type_mismatch(&self, key: &str, expected: &str, found: &str) -> PatraError {
        self.report(
            ErrorKind::ConfigTypeMismatch {
                key: key.into(),
                expected: expected.into(),
                found: found.into(),
            },
            unspanned(),
        )
    }

    fn invalid_selection(&self, group: &str, choice: &str) -> PatraError {
        self.report(
            ErrorKind::InvalidSelection {
                group: group.into(),
                choice: choice.into(),
            },
            unspanned(),
        )
    }
}

impl ErrorKind {
    /// Get the error category for test assertions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParseFailure { .. } | Self::UnconsumedInput { .. } => ErrorCategory::Parse,

            Self::ConfigKeyMissing { .. }
            | Self::ConfigTypeMismatch { .. }
            | Self::InvalidSelection { .. } => ErrorCategory::Config,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::ParseFailure { .. } => "parse_failure",
            Self::UnconsumedInput { .. } => "unconsumed_input",
            Self::ConfigKeyMissing { .. } => "config_key_missing",
            Self::ConfigTypeMismatch { .. } => "config_type_mismatch",
            Self::InvalidSelection { .. } => "invalid_selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Config,
}

impl std::error::Error for PatraError {}

impl fmt::Display for PatraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::ParseFailure { message } => {
                write!(f, "Parse error: {}", message)
            }
            ErrorKind::UnconsumedInput { remaining } => {
                write!(f, "Parse error: unconsumed input '{}'", remaining)
            }
            ErrorKind::ConfigKeyMissing { key } => {
                write!(f, "Configuration error: missing key '{}'", key)
            }
            ErrorKind::ConfigTypeMismatch {
                key,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Configuration error: key '{}' expected {}, found {}",
                    key, expected, found
                )
            }
            ErrorKind::InvalidSelection { group, choice } => {
                write!(
                    f,
                    "Configuration error: selection '{}' is not a choice of group '{}'",
                    choice, group
                )
            }
        }
    }
}

impl Diagnostic for PatraError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl PatraError {
    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::ParseFailure { .. } => "parse failed here".into(),
            ErrorKind::UnconsumedInput { .. } => "input left over here".into(),
            ErrorKind::ConfigKeyMissing { .. } => "missing configuration key".into(),
            ErrorKind::ConfigTypeMismatch { .. } => "mistyped configuration value".into(),
            ErrorKind::InvalidSelection { .. } => "unknown selection".into(),
        }
    }
}

/// General-purpose error creation context used throughout the crate
/// for creating properly contextualized PatraError instances.
pub struct ReportContext {
    pub source: SourceContext,
    pub phase: String,
}

impl ReportContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }
}

impl ErrorReporting for ReportContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> PatraError {
        let error_code = format!("patra::{}::{}", self.phase, kind.code_suffix());

        PatraError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

/// Creates a placeholder span for errors not tied to a specific source code
/// location, such as configuration errors raised outside any parse.
/// This makes the intent of using an empty span explicit and searchable.
pub fn unspanned() -> miette::SourceSpan {
    miette::SourceSpan::from(0..0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_carry_the_reporting_phase() {
        let reporter = ReportContext::new(SourceContext::from_text("doc.md", "*oops"), "parse");
        let err = reporter.parse_failure("expected 'a', found 'o'", (1..2).into());
        assert_eq!(err.diagnostic_info.error_code, "patra::parse::parse_failure");
        assert_eq!(err.kind.category(), ErrorCategory::Parse);
    }

    #[test]
    fn config_errors_are_their_own_category() {
        let reporter = ReportContext::new(SourceContext::fallback("configuration"), "config");
        let err = reporter.config_type_mismatch("pdf.toc", "boolean", "string");
        assert_eq!(err.kind.category(), ErrorCategory::Config);
        assert!(err.to_string().contains("pdf.toc"));
    }
}
