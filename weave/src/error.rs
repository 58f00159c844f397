use std::path::{Path, PathBuf};

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

use crate::source::Span;

/// Errors raised before any code runs: parsing, include resolution and
/// block classification. Every variant except [`Error::Io`] carries the span
/// of the offending marker or block.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{message}")]
    Syntax { message: String, span: Span },

    #[error("circular include: {}", display_cycle(cycle))]
    CircularInclude { cycle: Vec<String>, span: Span },

    #[error("section `{section}` not found in {}", path.display())]
    SectionNotFound {
        section: String,
        path: PathBuf,
        available: Vec<String>,
        span: Span,
    },

    #[error("include depth exceeds the limit of {limit}")]
    IncludeDepthExceeded { limit: usize, span: Span },

    #[error("cannot include {}: {source}", path.display())]
    IncludeNotFound {
        path: PathBuf,
        source: std::io::Error,
        span: Span,
    },

    #[error("include directive `{path}` was not resolved")]
    UnresolvedDirective { path: String, span: Span },

    #[error("unknown modifier `{token}`")]
    UnknownModifier {
        token: String,
        known: Vec<String>,
        span: Span,
    },

    #[error("modifier `{first}` conflicts with `{second}`")]
    ModifierConflict {
        first: String,
        second: String,
        span: Span,
    },
}

fn display_cycle(cycle: &[String]) -> String {
    cycle.join(" -> ")
}

impl Error {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Error::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::Io { .. } => None,
            Error::Syntax { span, .. }
            | Error::CircularInclude { span, .. }
            | Error::SectionNotFound { span, .. }
            | Error::IncludeDepthExceeded { span, .. }
            | Error::IncludeNotFound { span, .. }
            | Error::UnresolvedDirective { span, .. }
            | Error::UnknownModifier { span, .. }
            | Error::ModifierConflict { span, .. } => Some(span),
        }
    }

    fn notes(&self) -> Vec<String> {
        match self {
            Error::CircularInclude { cycle, .. } => {
                vec![format!("include chain: {}", display_cycle(cycle))]
            }
            Error::SectionNotFound { available, .. } if available.is_empty() => {
                vec!["the target file has no headings".to_string()]
            }
            Error::SectionNotFound { available, .. } => {
                vec![format!("available sections: {}", available.join(", "))]
            }
            Error::IncludeDepthExceeded { .. } => {
                vec!["raise `max_include_depth` if the nesting is intentional".to_string()]
            }
            Error::UnknownModifier { known, .. } => {
                vec![format!("known modifiers: {}", known.join(", "))]
            }
            _ => Vec::new(),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::new(Severity::Error)
            .with_message(self.to_string())
            .with_notes(self.notes());
        match self.span() {
            Some(span) => {
                diagnostic.with_labels(vec![Label::primary(span.file_id, span.range.clone())])
            }
            None => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span {
            file_id: 0,
            range: 0..4,
            line: 1,
        }
    }

    #[test]
    fn cycle_is_named_in_message() {
        let err = Error::CircularInclude {
            cycle: vec!["a.md".into(), "b.md".into(), "a.md".into()],
            span: span(),
        };
        assert_eq!(err.to_string(), "circular include: a.md -> b.md -> a.md");
        assert_eq!(err.span().map(|s| s.line), Some(1));
    }

    #[test]
    fn conflict_names_both_flags() {
        let err = Error::ModifierConflict {
            first: "no-exec".into(),
            second: "output-only".into(),
            span: span(),
        };
        let msg = err.to_string();
        assert!(msg.contains("no-exec") && msg.contains("output-only"));
    }
}
