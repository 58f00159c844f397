use crate::classify::ModifierSet;
use crate::expr::Guard;
use crate::source::Span;

/// An ordered sequence of nodes in source order.
///
/// Documents are never edited in place: include expansion and classification
/// each produce a new Document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
    /// File the document was parsed from.
    pub source_id: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Prose(Prose),
    Directive(Directive),
    CodeBlock(CodeBlock),
    Conditional(Conditional),
}

/// Literal Markdown, passed through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Prose {
    pub text: String,
    pub span: Span,
}

/// `!include path[#section]`
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub path: String,
    pub section: Option<String>,
    pub span: Span,
}

/// A fenced code block.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    /// First word of the info string.
    pub language: Option<String>,
    /// Info string with the modifier tag list removed; re-emitted verbatim.
    pub info: String,
    /// Raw modifier tags as written between `{` and `}`.
    pub tags: Vec<String>,
    /// Resolved modifiers. Empty until the classifier runs.
    pub modifiers: ModifierSet,
    /// Position among all code blocks of the flattened document. Zero until
    /// the classifier runs.
    pub index: usize,
    /// Opening fence characters, e.g. "```" or "~~~~".
    pub fence: String,
    pub content: String,
    /// Container prefix of the opening fence line, e.g. `"> "` inside a
    /// blockquote or `"  "` inside a list item. Repeated on every
    /// continuation line so the block stays inside its container.
    pub prefix: String,
    pub span: Span,
}

/// `!if guard` ... `!endif`
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub guard: Guard,
    /// Guard text as written.
    pub source: String,
    pub children: Vec<Node>,
    pub span: Span,
}

impl Document {
    pub fn empty(source_id: usize) -> Self {
        Document {
            nodes: Vec::new(),
            source_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All code blocks, depth-first in document order.
    pub fn code_blocks(&self) -> Vec<&CodeBlock> {
        let mut blocks = Vec::new();
        collect_blocks(&self.nodes, &mut blocks);
        blocks
    }

    /// True if any include directive remains, including inside conditionals.
    pub fn has_directives(&self) -> bool {
        fn any(nodes: &[Node]) -> bool {
            nodes.iter().any(|node| match node {
                Node::Directive(_) => true,
                Node::Conditional(c) => any(&c.children),
                _ => false,
            })
        }
        any(&self.nodes)
    }
}

fn collect_blocks<'a>(nodes: &'a [Node], out: &mut Vec<&'a CodeBlock>) {
    for node in nodes {
        match node {
            Node::CodeBlock(block) => out.push(block),
            Node::Conditional(c) => collect_blocks(&c.children, out),
            _ => {}
        }
    }
}

impl Node {
    pub fn span(&self) -> &Span {
        match self {
            Node::Prose(p) => &p.span,
            Node::Directive(d) => &d.span,
            Node::CodeBlock(b) => &b.span,
            Node::Conditional(c) => &c.span,
        }
    }
}
