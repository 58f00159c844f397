use std::collections::HashMap;
use std::fmt;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;

/// A byte range inside one registered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// File ID in the [`SourceMap`] (also the codespan-reporting file ID).
    pub file_id: usize,
    pub range: Range<usize>,
    /// 1-based line of `range.start`.
    pub line: usize,
}

impl Span {
    pub fn new(source: &str, file_id: usize, range: Range<usize>) -> Self {
        let line = byte_offset_to_line(source, range.start);
        Span {
            file_id,
            range,
            line,
        }
    }
}

#[derive(Debug)]
struct SourceFile {
    name: String,
    path: Option<PathBuf>,
    source: String,
}

/// Every source file touched by one preprocessing run.
///
/// Files read from disk are cached by canonical path, so including the same
/// fragment twice yields the same file ID.
pub struct SourceMap {
    files: SimpleFiles<String, String>,
    entries: Vec<SourceFile>,
    by_path: HashMap<PathBuf, usize>,
}

impl Default for SourceMap {
    fn default() -> Self {
        SourceMap {
            files: SimpleFiles::new(),
            entries: Vec::new(),
            by_path: HashMap::new(),
        }
    }
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMap")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Read `path` from disk and register it. Returns the cached ID if the
    /// file was already loaded.
    pub fn load(&mut self, path: &Path) -> io::Result<usize> {
        let canonical = path.canonicalize()?;
        if let Some(&id) = self.by_path.get(&canonical) {
            return Ok(id);
        }
        let source = std::fs::read_to_string(&canonical)?;
        let id = self.push(path.display().to_string(), Some(canonical.clone()), source);
        self.by_path.insert(canonical, id);
        Ok(id)
    }

    /// Register an in-memory source that has no backing file.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        self.push(name.into(), None, source.into())
    }

    fn push(&mut self, name: String, path: Option<PathBuf>, source: String) -> usize {
        let id = self.files.add(name.clone(), source.clone());
        self.entries.push(SourceFile { name, path, source });
        debug_assert_eq!(id + 1, self.entries.len());
        id
    }

    pub fn source(&self, file_id: usize) -> &str {
        self.entries
            .get(file_id)
            .map(|f| f.source.as_str())
            .unwrap_or("")
    }

    pub fn name(&self, file_id: usize) -> &str {
        self.entries
            .get(file_id)
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Canonical path of a file loaded from disk.
    pub fn path(&self, file_id: usize) -> Option<&Path> {
        self.entries.get(file_id)?.path.as_deref()
    }

    /// `name:line` for human-readable positions.
    pub fn location(&self, span: &Span) -> String {
        format!("{}:{}", self.name(span.file_id), span.line)
    }

    /// The codespan-reporting file database.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Convert a byte offset in `source` to a 1-based line number.
pub fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}
