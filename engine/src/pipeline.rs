use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, instrument};
use weave::parser::Parser;
use weave::{
    ClassifiedDocument, DEFAULT_MAX_INCLUDE_DEPTH, Document, ModifierRegistry, Resolver, SourceMap,
    classify,
};

use crate::artifact::{self, Artifact, DEFAULT_ARTIFACT_PREFIX};
use crate::assembler::{Assembler, DEFAULT_ARTIFACT_DIR, DEFAULT_OUTPUT_LANGUAGE};
use crate::engine::Engine;
use crate::error::Error;
use crate::executor::Executor;

/// Settings for one expansion run.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_include_depth: usize,
    /// Directory artifacts are referenced under, relative to the output
    /// document.
    pub artifact_dir: String,
    pub artifact_prefix: String,
    pub output_language: String,
    pub registry: ModifierRegistry,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            artifact_dir: DEFAULT_ARTIFACT_DIR.to_string(),
            artifact_prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
            output_language: DEFAULT_OUTPUT_LANGUAGE.to_string(),
            registry: ModifierRegistry::new(),
        }
    }
}

/// The result of a successful run. Nothing is on disk until
/// [`Expansion::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub markdown: String,
    pub artifacts: Vec<Artifact>,
}

impl Expansion {
    /// Write the artifacts, then the document. The document is written to a
    /// temporary file and renamed into place.
    pub fn write(&self, output: &Path, artifact_dir: &Path) -> Result<(), Error> {
        artifact::persist(&self.artifacts, artifact_dir)?;

        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
        file.write_all(self.markdown.as_bytes())
            .map_err(|e| Error::io(output, e))?;
        file.persist(output).map_err(|e| Error::io(output, e.error))?;
        info!(
            output = %output.display(),
            artifacts = self.artifacts.len(),
            "wrote expanded document"
        );
        Ok(())
    }

    /// Write only the artifacts (used when the document goes to stdout).
    pub fn write_artifacts(&self, artifact_dir: &Path) -> Result<Vec<PathBuf>, Error> {
        artifact::persist(&self.artifacts, artifact_dir)
    }
}

/// Resolver, classifier, engine and assembler, in that order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: Options,
}

impl Pipeline {
    pub fn new(options: Options) -> Self {
        Pipeline { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Resolve and classify `root` without executing anything.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn check(
        &self,
        sources: &mut SourceMap,
        root: &Path,
        base_dir: &Path,
        language: &str,
    ) -> Result<ClassifiedDocument, Error> {
        let mut resolver = Resolver::new(sources).with_max_depth(self.options.max_include_depth);
        let document = resolver.load(root)?;
        self.prepare(resolver, &document, base_dir, language)
    }

    /// [`Pipeline::check`] for an in-memory root document.
    pub fn check_source(
        &self,
        sources: &mut SourceMap,
        name: &str,
        text: &str,
        base_dir: &Path,
        language: &str,
    ) -> Result<ClassifiedDocument, Error> {
        let id = sources.add(name, text);
        let document = Parser::new(sources.source(id), id).parse()?;
        let resolver = Resolver::new(sources).with_max_depth(self.options.max_include_depth);
        self.prepare(resolver, &document, base_dir, language)
    }

    fn prepare(
        &self,
        mut resolver: Resolver<'_>,
        document: &Document,
        base_dir: &Path,
        language: &str,
    ) -> Result<ClassifiedDocument, Error> {
        let flattened = resolver.resolve(document, base_dir)?;
        let classified = classify(flattened, &self.options.registry, language)?;
        info!(blocks = classified.block_count(), "document classified");
        Ok(classified)
    }

    /// Expand the file at `root`.
    pub fn expand(
        &self,
        sources: &mut SourceMap,
        root: &Path,
        base_dir: &Path,
        executor: &mut dyn Executor,
    ) -> Result<Expansion, Error> {
        let classified = self.check(sources, root, base_dir, executor.language())?;
        self.run(&classified, executor)
    }

    /// Expand an in-memory root document.
    pub fn expand_source(
        &self,
        sources: &mut SourceMap,
        name: &str,
        text: &str,
        base_dir: &Path,
        executor: &mut dyn Executor,
    ) -> Result<Expansion, Error> {
        let classified = self.check_source(sources, name, text, base_dir, executor.language())?;
        self.run(&classified, executor)
    }

    /// Execute and assemble an already classified document.
    #[instrument(skip_all)]
    pub fn run(
        &self,
        classified: &ClassifiedDocument,
        executor: &mut dyn Executor,
    ) -> Result<Expansion, Error> {
        let mut engine = Engine::new(executor).with_artifact_prefix(&self.options.artifact_prefix);
        let executed = engine.run(classified)?;
        let markdown = Assembler::new(&self.options.artifact_dir, &self.options.output_language)
            .assemble(&executed);
        let artifacts = engine.into_artifacts();
        info!(bytes = markdown.len(), artifacts = artifacts.len(), "document expanded");
        Ok(Expansion {
            markdown,
            artifacts,
        })
    }
}
