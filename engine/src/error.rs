use std::path::{Path, PathBuf};

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use weave::Span;

/// An error raised while running `calc` code or evaluating a guard.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("`{function}` expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("{0}")]
    Failed(String),
}

/// A [`ScriptError`] with the 1-based line of the block it happened on.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub line: Option<usize>,
    pub error: ScriptError,
}

/// Errors that terminate an expansion run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Weave(#[from] weave::Error),

    #[error("block {index} failed: {error}")]
    ExecutionFailure {
        index: usize,
        span: Span,
        /// Line in the source file where the failing statement sits.
        line: Option<usize>,
        partial_output: String,
        error: ScriptError,
    },

    #[error("undefined reference `{name}` in guard `{guard}`")]
    UndefinedReference {
        name: String,
        guard: String,
        span: Span,
    },

    #[error("guard `{guard}` failed: {error}")]
    GuardType {
        guard: String,
        error: ScriptError,
        span: Span,
    },

    #[error("document was classified for `{document}` but the executor runs `{executor}`")]
    LanguageMismatch { document: String, executor: String },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::Weave(e) => e.span(),
            Error::ExecutionFailure { span, .. }
            | Error::UndefinedReference { span, .. }
            | Error::GuardType { span, .. } => Some(span),
            Error::LanguageMismatch { .. } | Error::Io { .. } => None,
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let base = Diagnostic::new(Severity::Error).with_message(self.to_string());
        match self {
            Error::Weave(e) => e.to_diagnostic(),
            Error::ExecutionFailure {
                span,
                line,
                partial_output,
                ..
            } => {
                let mut notes = Vec::new();
                if let Some(line) = line {
                    notes.push(format!("failing statement is on line {line}"));
                }
                if !partial_output.is_empty() {
                    notes.push(format!("output before the failure:\n{}", partial_output.trim_end()));
                }
                base.with_labels(vec![
                    Label::primary(span.file_id, span.range.clone())
                        .with_message("this block failed"),
                ])
                .with_notes(notes)
            }
            Error::UndefinedReference { name, span, .. } => base
                .with_labels(vec![
                    Label::primary(span.file_id, span.range.clone())
                        .with_message(format!("`{name}` is not bound yet")),
                ])
                .with_notes(vec![
                    "guards only see variables bound by blocks that appear before them".to_string(),
                ]),
            Error::GuardType { span, .. } => {
                base.with_labels(vec![Label::primary(span.file_id, span.range.clone())])
            }
            Error::LanguageMismatch { .. } | Error::Io { .. } => base,
        }
    }
}
