use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::Result;
use crate::document::{Conditional, Directive, Document, Node};
use crate::error::Error;
use crate::parser::{Parser, find_section, sections};
use crate::source::SourceMap;

/// Include chains deeper than this fail with [`Error::IncludeDepthExceeded`].
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 50;

/// One file (or file section) currently being included.
struct Frame {
    path: PathBuf,
    section: Option<String>,
    label: String,
}

impl Frame {
    fn is(&self, path: &Path, section: Option<&str>) -> bool {
        self.path == path && self.section.as_deref() == section
    }
}

/// Inlines `!include` directives.
///
/// Nested directives resolve relative to the directory of the file that
/// contains them, so fragments can be moved together with their own
/// includes.
pub struct Resolver<'a> {
    sources: &'a mut SourceMap,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(sources: &'a mut SourceMap) -> Self {
        Resolver {
            sources,
            max_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Read and parse a root document.
    pub fn load(&mut self, path: &Path) -> Result<Document> {
        let id = self.sources.load(path).map_err(|e| Error::io(path, e))?;
        Parser::new(self.sources.source(id), id).parse()
    }

    /// Produce a new document with every directive replaced by the nodes of
    /// its target. Directives of `document` itself resolve against
    /// `base_dir`.
    #[instrument(skip_all, fields(file = %self.sources.name(document.source_id)))]
    pub fn resolve(&mut self, document: &Document, base_dir: &Path) -> Result<Document> {
        let mut stack = Vec::new();
        if let Some(path) = self.sources.path(document.source_id) {
            stack.push(Frame {
                path: path.to_path_buf(),
                section: None,
                label: self.sources.name(document.source_id).to_string(),
            });
        }

        let nodes = self.resolve_nodes(&document.nodes, base_dir, 0, &mut stack)?;
        Ok(Document {
            nodes,
            source_id: document.source_id,
        })
    }

    fn resolve_nodes(
        &mut self,
        nodes: &[Node],
        dir: &Path,
        depth: usize,
        stack: &mut Vec<Frame>,
    ) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Directive(directive) => {
                    out.extend(self.include(directive, dir, depth, stack)?);
                }
                Node::Conditional(conditional) => {
                    let children = self.resolve_nodes(&conditional.children, dir, depth, stack)?;
                    out.push(Node::Conditional(Conditional {
                        guard: conditional.guard.clone(),
                        source: conditional.source.clone(),
                        children,
                        span: conditional.span.clone(),
                    }));
                }
                other => out.push(other.clone()),
            }
        }
        Ok(out)
    }

    fn include(
        &mut self,
        directive: &Directive,
        dir: &Path,
        depth: usize,
        stack: &mut Vec<Frame>,
    ) -> Result<Vec<Node>> {
        let target = dir.join(&directive.path);
        let not_found = |source| Error::IncludeNotFound {
            path: target.clone(),
            source,
            span: directive.span.clone(),
        };
        let canonical = target.canonicalize().map_err(not_found)?;

        let section = directive.section.as_deref();
        let label = match section {
            Some(name) => format!("{}#{}", directive.path, name),
            None => directive.path.clone(),
        };

        // Cycles are reported before depth so a self-include names itself.
        if let Some(pos) = stack.iter().position(|f| f.is(&canonical, section)) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|f| f.label.clone()).collect();
            cycle.push(label);
            return Err(Error::CircularInclude {
                cycle,
                span: directive.span.clone(),
            });
        }

        let depth = depth + 1;
        if depth > self.max_depth {
            return Err(Error::IncludeDepthExceeded {
                limit: self.max_depth,
                span: directive.span.clone(),
            });
        }

        let id = self.sources.load(&target).map_err(not_found)?;
        debug!(path = %target.display(), ?section, depth, "including");

        let document = {
            let source = self.sources.source(id);
            let parser = Parser::new(source, id);
            match section {
                None => parser.parse()?,
                Some(name) => {
                    let found = sections(source);
                    let Some(hit) = find_section(&found, name) else {
                        return Err(Error::SectionNotFound {
                            section: name.to_string(),
                            path: target,
                            available: found.into_iter().map(|s| s.name).collect(),
                            span: directive.span.clone(),
                        });
                    };
                    parser.parse_range(hit.range.clone())?
                }
            }
        };

        let parent = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());

        stack.push(Frame {
            path: canonical,
            section: directive.section.clone(),
            label,
        });
        let nodes = self.resolve_nodes(&document.nodes, &parent, depth, stack);
        stack.pop();
        nodes
    }
}
