pub mod classify;
pub mod document;
pub mod error;
pub mod expr;
pub mod parser;
pub mod resolver;
pub mod source;

pub use classify::{ClassifiedDocument, Modifier, ModifierRegistry, ModifierSet, classify};
pub use document::{CodeBlock, Conditional, Directive, Document, Node, Prose};
pub use error::Error;
pub use resolver::{DEFAULT_MAX_INCLUDE_DEPTH, Resolver};
pub use source::{SourceMap, Span};

/// Convenience alias for results produced while parsing, resolving and classifying.
pub type Result<T> = std::result::Result<T, Error>;
