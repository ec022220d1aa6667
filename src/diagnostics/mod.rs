use crate::line_index::LineIndex;
use crate::span::Span;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("validation error in {operation}: {msg}")]
    Validation { operation: &'static str, msg: String },

    #[error("parse error in {path}:{line}:{column}: {msg}")]
    Parse { path: String, line: u32, column: u32, msg: String, span: Span },

    #[error("{path}: {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { path: String, size: u64, limit: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("instrumented output for {path} does not parse (line {line}: {msg})\n  | {line_content}")]
    SyntaxValidationFailed { path: String, line: u32, msg: String, line_content: String },

    #[error("runtime error in {operation}: {msg}")]
    Runtime { operation: &'static str, msg: String },
}

impl CoverageError {
    pub fn validation(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Validation { operation, msg: msg.into() }
    }

    /// Build a parse error, resolving `span` to a 1-based line/column in `source`.
    pub fn parse(path: impl Into<String>, source: &str, msg: impl Into<String>, span: Span) -> Self {
        let (line, column) = LineIndex::new(source).line_col(span.start);
        Self::parse_at(path, line, column, msg, span)
    }

    pub fn parse_at(path: impl Into<String>, line: u32, column: u32, msg: impl Into<String>, span: Span) -> Self {
        Self::Parse { path: path.into(), line, column, msg: msg.into(), span }
    }

    pub fn size_limit(path: impl Into<String>, size: u64, limit: u64) -> Self {
        Self::SizeLimitExceeded { path: path.into(), size, limit }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn syntax_validation(
        path: impl Into<String>,
        line: u32,
        msg: impl Into<String>,
        line_content: impl Into<String>,
    ) -> Self {
        Self::SyntaxValidationFailed {
            path: path.into(),
            line,
            msg: msg.into(),
            line_content: line_content.into(),
        }
    }

    pub fn runtime(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Runtime { operation, msg: msg.into() }
    }

    /// Fill in the file path of a parse error produced before the path was known.
    pub fn with_path(self, new_path: &str) -> Self {
        match self {
            Self::Parse { path, line, column, msg, span } if path.is_empty() => {
                Self::Parse { path: new_path.to_string(), line, column, msg, span }
            }
            other => other,
        }
    }

    /// Whether this error stops a file from being tracked at all.
    /// Parse errors are not fatal: the caller falls back to heuristic classification.
    pub fn is_fatal_for_file(&self) -> bool {
        matches!(self, Self::SizeLimitExceeded { .. } | Self::Io { .. } | Self::Validation { .. })
    }

    /// Short machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Parse { .. } => "parse",
            Self::SizeLimitExceeded { .. } => "size_limit_exceeded",
            Self::Io { .. } => "io",
            Self::SyntaxValidationFailed { .. } => "syntax_validation_failed",
            Self::Runtime { .. } => "runtime",
        }
    }
}

/// Render a CoverageError with ariadne for nice terminal output.
pub fn render_error(source: &str, filename: &str, err: &CoverageError) {
    use std::io::IsTerminal;

    let stderr = std::io::stderr();
    let color = stderr.is_terminal();
    if write_error(source, filename, err, color, stderr).is_err() {
        eprintln!("error: {err}");
    }
}

/// Write the rendered error to `out`. Parse errors get an ariadne report
/// whose header names `filename`.
pub fn write_error<W: std::io::Write>(
    source: &str,
    filename: &str,
    err: &CoverageError,
    color: bool,
    mut out: W,
) -> std::io::Result<()> {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    match err {
        CoverageError::Parse { msg, span, .. } => {
            let end = span.end.max(span.start + 1).min(source.len().max(span.start));
            Report::build(ReportKind::Error, filename, span.start)
                .with_config(Config::default().with_color(color))
                .with_message(format!("parse error in {filename}"))
                .with_label(Label::new((filename, span.start..end)).with_message(msg))
                .finish()
                .write((filename, Source::from(source)), out)
        }
        CoverageError::SyntaxValidationFailed { path, line, msg, line_content } => {
            writeln!(out, "error[instrument]: {msg}")?;
            writeln!(out, "  --> {path}:{line}")?;
            writeln!(out, "   | {line_content}")
        }
        other => writeln!(out, "error[{}]: {other}", other.kind()),
    }
}
