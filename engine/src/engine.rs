use tracing::{debug, instrument};
use weave::{ClassifiedDocument, CodeBlock, Node};

use crate::artifact::{Artifact, ArtifactStore};
use crate::error::Error;
use crate::executor::Executor;
use crate::guard::evaluate_guard;
use crate::session::SessionState;

/// Lifecycle of one code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Not reached yet. Blocks in a false branch stay here.
    Pending,
    /// `no-exec` (explicit or implied).
    Skipped,
    Running,
    Succeeded,
    Failed,
}

/// What an executed block produced, with artifacts already named.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResult {
    pub output: String,
    pub artifacts: Vec<String>,
}

/// A node after execution: conditionals are decided and blocks carry
/// their results.
#[derive(Debug, Clone, PartialEq)]
pub enum Executed {
    Prose(String),
    Block {
        block: CodeBlock,
        /// `None` for blocks that were not executed.
        result: Option<BlockResult>,
    },
    Conditional {
        guard: String,
        included: bool,
        /// Empty when the guard was false.
        children: Vec<Executed>,
    },
}

/// Runs the blocks of a classified document in document order against one
/// session, deciding conditionals as it reaches them.
pub struct Engine<'e> {
    executor: &'e mut dyn Executor,
    session: SessionState,
    artifacts: ArtifactStore,
    states: Vec<BlockState>,
}

impl<'e> Engine<'e> {
    pub fn new(executor: &'e mut dyn Executor) -> Self {
        Engine {
            executor,
            session: SessionState::new(),
            artifacts: ArtifactStore::default(),
            states: Vec::new(),
        }
    }

    pub fn with_artifact_prefix(mut self, prefix: &str) -> Self {
        self.artifacts = ArtifactStore::new(prefix);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn state(&self, index: usize) -> Option<BlockState> {
        self.states.get(index).copied()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts.into_artifacts()
    }

    /// Execute the document. Stops at the first failing block or guard.
    #[instrument(skip_all, fields(language = document.language(), blocks = document.block_count()))]
    pub fn run(&mut self, document: &ClassifiedDocument) -> Result<Vec<Executed>, Error> {
        if document.language() != self.executor.language() {
            return Err(Error::LanguageMismatch {
                document: document.language().to_string(),
                executor: self.executor.language().to_string(),
            });
        }
        self.states = vec![BlockState::Pending; document.block_count()];
        self.nodes(&document.document().nodes)
    }

    fn nodes(&mut self, nodes: &[Node]) -> Result<Vec<Executed>, Error> {
        nodes.iter().map(|node| self.node(node)).collect()
    }

    fn node(&mut self, node: &Node) -> Result<Executed, Error> {
        match node {
            Node::Prose(prose) => Ok(Executed::Prose(prose.text.clone())),
            Node::CodeBlock(block) => self.block(block),
            Node::Conditional(conditional) => {
                // Inner guards are only evaluated when this one holds.
                let included = evaluate_guard(conditional, &self.session)?;
                debug!(guard = %conditional.source, included, "conditional");
                let children = if included {
                    self.nodes(&conditional.children)?
                } else {
                    Vec::new()
                };
                Ok(Executed::Conditional {
                    guard: conditional.source.clone(),
                    included,
                    children,
                })
            }
            Node::Directive(directive) => Err(weave::Error::UnresolvedDirective {
                path: directive.path.clone(),
                span: directive.span.clone(),
            }
            .into()),
        }
    }

    fn block(&mut self, block: &CodeBlock) -> Result<Executed, Error> {
        let index = block.index;
        if !block.modifiers.executes() {
            self.transition(index, BlockState::Skipped);
            return Ok(Executed::Block {
                block: block.clone(),
                result: None,
            });
        }

        self.transition(index, BlockState::Running);
        self.session.enter_block(index);
        let execution = self.executor.execute(&block.content, &mut self.session);

        if let Some(failure) = execution.error {
            self.transition(index, BlockState::Failed);
            return Err(Error::ExecutionFailure {
                index,
                span: block.span.clone(),
                // Content line 1 is the line after the opening fence.
                line: failure.line.map(|l| block.span.line + l),
                partial_output: execution.output,
                error: failure.error,
            });
        }

        let artifacts = self.artifacts.claim(index, execution.artifacts);
        self.transition(index, BlockState::Succeeded);
        Ok(Executed::Block {
            block: block.clone(),
            result: Some(BlockResult {
                output: execution.output,
                artifacts,
            }),
        })
    }

    fn transition(&mut self, index: usize, to: BlockState) {
        if let Some(slot) = self.states.get_mut(index) {
            debug!(index, from = ?*slot, to = ?to, "block");
            *slot = to;
        }
    }
}
