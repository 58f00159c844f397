pub mod expression;
mod structural;

pub use expression::{SyntaxError, parse_expression, parse_guard, parse_script};
pub use structural::{Section, find_section, sections};

use std::ops::Range;

use crate::Result;
use crate::document::Document;

/// Parser entry point for one source file.
pub struct Parser<'a> {
    source: &'a str,
    file_id: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the whole source into a Document.
    pub fn parse(&self) -> Result<Document> {
        self.parse_range(0..self.source.len())
    }

    /// Parse only `window` of the source (used for section includes). Spans
    /// still refer to offsets in the full file.
    pub fn parse_range(&self, window: Range<usize>) -> Result<Document> {
        let nodes = structural::parse_nodes(self.source, self.file_id, window)?;
        Ok(Document {
            nodes,
            source_id: self.file_id,
        })
    }
}
