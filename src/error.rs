//! Error types for scanning, rendering and emission

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::scanner::lexer::identifier_len;
use crate::template::DialectError;
use crate::validate::ValidationReport;

pub use crate::scanner::lexer::Span;

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A placeholder sentinel that does not form a valid `$${name}` token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("malformed placeholder at offset {}: {reason}", .span.start)]
    MalformedToken { span: Span, reason: String },
}

impl ScanError {
    /// Build the error for the sentinel starting at `offset`, explaining
    /// what follows it in `source`
    pub fn malformed(source: &str, offset: usize) -> Self {
        let sentinel = offset..(offset + 3).min(source.len());
        let rest = &source[sentinel.end..];
        let len = identifier_len(rest);
        let after = rest[len..].chars().next();

        let reason = match (len, after) {
            (_, None) => "unterminated placeholder at end of input".to_string(),
            (0, Some('}')) => "empty placeholder name".to_string(),
            (0, Some(c)) => format!("placeholder name cannot start with {:?}", c),
            (_, Some('\n')) | (_, Some('\r')) => "missing closing brace".to_string(),
            (_, Some('$')) if rest[len..].starts_with("$${") => {
                "nested placeholder".to_string()
            }
            (_, Some(c)) => format!("invalid character {:?} in placeholder name", c),
        };

        ScanError::MalformedToken {
            span: sentinel.start..sentinel.end + len,
            reason,
        }
    }

    /// Byte offset of the opening `$` of the sentinel
    pub fn offset(&self) -> usize {
        match self {
            ScanError::MalformedToken { span, .. } => span.start,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            ScanError::MalformedToken { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ScanError::MalformedToken { span, reason } => {
                let written = Report::build(ReportKind::Error, filename, span.start)
                    .with_message("malformed placeholder")
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}\nExpected: $${{name}}", reason))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if written.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Errors that can occur while rendering or emitting a job script
#[derive(Debug, Error)]
pub enum Error {
    /// Template text contains a malformed placeholder
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Bindings failed validation; nothing was rendered
    #[error("bindings rejected:\n{0}")]
    Validation(ValidationReport),

    /// Renderer reached a required placeholder with no value
    #[error("placeholder '{name}' at offset {offset} has no bound value")]
    UnboundToken { name: String, offset: usize },

    /// Dialect lookup failed
    #[error("unknown dialect '{name}' (known: {known})")]
    UnknownDialect { name: String, known: String },

    /// I/O failure while emitting the script or its metadata
    #[error("failed to write {destination}: {source}")]
    WriteFailure {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    /// Dialect definition could not be loaded
    #[error(transparent)]
    Dialect(#[from] DialectError),
}

impl From<ValidationReport> for Error {
    fn from(report: ValidationReport) -> Self {
        Error::Validation(report)
    }
}

impl Error {
    pub fn unknown_dialect<'a>(
        name: impl Into<String>,
        known: impl Iterator<Item = &'a str>,
    ) -> Self {
        Self::UnknownDialect {
            name: name.into(),
            known: known.collect::<Vec<_>>().join(", "),
        }
    }

    pub fn write_failure(destination: impl Into<String>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            destination: destination.into(),
            source,
        }
    }

    /// Validation report if this is a validation failure
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Validation(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(source: &str, offset: usize) -> String {
        match ScanError::malformed(source, offset) {
            ScanError::MalformedToken { reason, .. } => reason,
        }
    }

    #[test]
    fn test_malformed_reasons() {
        assert_eq!(reason("$${nnodes", 0), "unterminated placeholder at end of input");
        assert_eq!(reason("$${}", 0), "empty placeholder name");
        assert_eq!(reason("$${1x}", 0), "placeholder name cannot start with '1'");
        assert_eq!(reason("$${a\n}", 0), "missing closing brace");
        assert_eq!(reason("$${a$${b}}", 0), "nested placeholder");
        assert_eq!(reason("$${a-b}", 0), "invalid character '-' in placeholder name");
    }

    #[test]
    fn test_malformed_span_covers_name() {
        let err = ScanError::malformed("x $${nnodes\n", 2);
        assert_eq!(err.offset(), 2);
        assert_eq!(err.span(), &(2..11));
        assert!(err.to_string().contains("offset 2"));
    }

    #[test]
    fn test_format_includes_reason() {
        let source = "#COBALT -n $${nnodes\n";
        let err = ScanError::malformed(source, 11);
        let formatted = err.format(source, "job.tmpl");
        assert!(formatted.contains("malformed placeholder"));
        assert!(formatted.contains("missing closing brace"));
    }

    #[test]
    fn test_unknown_dialect_lists_known() {
        let err = Error::unknown_dialect("sge", ["cobalt", "slurm"].into_iter());
        assert_eq!(err.to_string(), "unknown dialect 'sge' (known: cobalt, slurm)");
    }
}
