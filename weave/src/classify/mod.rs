mod modifier;

pub use modifier::{Modifier, ModifierRegistry, ModifierSet};

use tracing::{debug, instrument};

use crate::Result;
use crate::document::{CodeBlock, Conditional, Document, Node};
use crate::error::Error;

/// A document whose blocks all carry a validated modifier set and a
/// document-order index.
///
/// Only [`classify`] builds one, so anything that takes a
/// `ClassifiedDocument` runs after every block has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDocument {
    document: Document,
    language: String,
}

impl ClassifiedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Language executed by this run; every other block is `no-exec`.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn block_count(&self) -> usize {
        self.document.code_blocks().len()
    }
}

/// Annotate every code block of a flattened document.
///
/// Fails on the first unknown tag, conflicting pair, or directive left
/// unresolved. Blocks inside conditionals are checked too, whatever their
/// guard will evaluate to.
#[instrument(skip_all, fields(language = %language))]
pub fn classify(
    document: Document,
    registry: &ModifierRegistry,
    language: &str,
) -> Result<ClassifiedDocument> {
    let mut classifier = Classifier {
        registry,
        language,
        next_index: 0,
    };
    let nodes = classifier.nodes(document.nodes)?;
    debug!(blocks = classifier.next_index, "classified");
    Ok(ClassifiedDocument {
        document: Document {
            nodes,
            source_id: document.source_id,
        },
        language: language.to_string(),
    })
}

struct Classifier<'r> {
    registry: &'r ModifierRegistry,
    language: &'r str,
    next_index: usize,
}

impl Classifier<'_> {
    fn nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        nodes.into_iter().map(|node| self.node(node)).collect()
    }

    fn node(&mut self, node: Node) -> Result<Node> {
        match node {
            Node::Directive(directive) => Err(Error::UnresolvedDirective {
                path: directive.path,
                span: directive.span,
            }),
            Node::CodeBlock(block) => self.block(block).map(Node::CodeBlock),
            Node::Conditional(conditional) => {
                let children = self.nodes(conditional.children)?;
                Ok(Node::Conditional(Conditional {
                    children,
                    ..conditional
                }))
            }
            prose => Ok(prose),
        }
    }

    fn block(&mut self, mut block: CodeBlock) -> Result<CodeBlock> {
        let mut seen: Vec<(&str, Modifier)> = Vec::new();
        for tag in &block.tags {
            let modifier = self.registry.lookup(tag).ok_or_else(|| Error::UnknownModifier {
                token: tag.clone(),
                known: self.registry.known_tokens(),
                span: block.span.clone(),
            })?;
            if let Some((first, _)) = seen.iter().find(|(_, m)| m.conflicts_with(modifier)) {
                return Err(Error::ModifierConflict {
                    first: first.to_string(),
                    second: tag.clone(),
                    span: block.span.clone(),
                });
            }
            seen.push((tag, modifier));
        }

        let mut modifiers = ModifierSet::default();
        for (_, modifier) in &seen {
            modifiers.insert(*modifier);
        }

        if block.language.as_deref() != Some(self.language) {
            if let Some((tag, _)) = seen.iter().find(|(_, m)| m.requires_execution()) {
                let implied = match &block.language {
                    Some(lang) => format!("no-exec (implied by language `{lang}`)"),
                    None => "no-exec (implied by a block without a language)".to_string(),
                };
                return Err(Error::ModifierConflict {
                    first: implied,
                    second: tag.to_string(),
                    span: block.span.clone(),
                });
            }
            modifiers.insert(Modifier::NoExec);
        }

        block.index = self.next_index;
        self.next_index += 1;
        debug!(
            index = block.index,
            language = block.language.as_deref().unwrap_or(""),
            modifiers = %modifiers,
            "block"
        );
        block.modifiers = modifiers;
        Ok(block)
    }
}
