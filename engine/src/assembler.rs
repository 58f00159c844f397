use weave::CodeBlock;

use crate::engine::{BlockResult, Executed};

pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
pub const DEFAULT_OUTPUT_LANGUAGE: &str = "text";

/// Turns executed nodes back into Markdown.
///
/// Nodes are emitted in order; the assembler only filters (false
/// conditionals, hidden parts of blocks) and substitutes (results).
#[derive(Debug, Clone)]
pub struct Assembler {
    /// Directory prefix used in artifact references.
    artifact_dir: String,
    /// Info string of the fence wrapping captured output.
    output_language: String,
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new(DEFAULT_ARTIFACT_DIR, DEFAULT_OUTPUT_LANGUAGE)
    }
}

impl Assembler {
    pub fn new(artifact_dir: impl Into<String>, output_language: impl Into<String>) -> Self {
        Assembler {
            artifact_dir: artifact_dir.into(),
            output_language: output_language.into(),
        }
    }

    pub fn assemble(&self, nodes: &[Executed]) -> String {
        let mut out = String::new();
        self.emit(nodes, &mut out);
        out
    }

    fn emit(&self, nodes: &[Executed], out: &mut String) {
        for node in nodes {
            match node {
                Executed::Prose(text) => out.push_str(text),
                Executed::Block { block, result } => self.block(block, result.as_ref(), out),
                Executed::Conditional {
                    included: true,
                    children,
                    ..
                } => self.emit(children, out),
                Executed::Conditional { .. } => {}
            }
        }
    }

    fn block(&self, block: &CodeBlock, result: Option<&BlockResult>, out: &mut String) {
        let modifiers = &block.modifiers;
        let mut pieces = Vec::new();

        if modifiers.shows_code() {
            pieces.push(code_fence(block));
        }
        if let Some(result) = result {
            if modifiers.shows_output() && !result.output.is_empty() {
                pieces.push(output_fence(&self.output_language, &result.output));
            }
            if modifiers.shows_artifacts() && !result.artifacts.is_empty() {
                let refs: String = result
                    .artifacts
                    .iter()
                    .map(|name| format!("![]({})\n", self.artifact_ref(name)))
                    .collect();
                pieces.push(refs);
            }
        }

        if pieces.is_empty() {
            return;
        }
        // Pieces are separated by a blank line.
        out.push_str(&prefix_continuation(&pieces.join("\n"), &block.prefix));
    }

    fn artifact_ref(&self, name: &str) -> String {
        let dir = self.artifact_dir.trim_end_matches('/');
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        }
    }
}

fn code_fence(block: &CodeBlock) -> String {
    let mut text = format!("{}{}\n", block.fence, block.info);
    text.push_str(&block.content);
    if !block.content.is_empty() && !block.content.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&block.fence);
    text.push('\n');
    text
}

/// Fence captured output with more backticks than any run inside it.
fn output_fence(language: &str, output: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in output.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat((longest + 1).max(3));

    let mut text = format!("{fence}{language}\n{output}");
    if !output.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&fence);
    text.push('\n');
    text
}

/// Prefix every line but the first, which continues the line the original
/// fence started on. Blank lines get the prefix without trailing
/// whitespace, so `>` keeps a blockquote open and list items stay empty.
fn prefix_continuation(text: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return text.to_string();
    }
    let blank = prefix.trim_end();
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if i > 0 {
            if line.trim().is_empty() {
                out.push_str(blank);
            } else {
                out.push_str(prefix);
            }
        }
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_fence_outgrows_backticks() {
        assert_eq!(output_fence("text", "a\n"), "```text\na\n```\n");
        assert_eq!(output_fence("text", "````x"), "`````text\n````x\n`````\n");
    }

    #[test]
    fn continuation_lines_are_prefixed() {
        assert_eq!(prefix_continuation("a\nb\n\nc\n", "  "), "a\n  b\n\n  c\n");
        assert_eq!(prefix_continuation("a\nb\n\nc\n", "> "), "a\n> b\n>\n> c\n");
        assert_eq!(prefix_continuation("a\nb\n", ""), "a\nb\n");
    }

    #[test]
    fn artifact_refs_join_the_directory() {
        assert_eq!(Assembler::new("figs/", "text").artifact_ref("x.svg"), "figs/x.svg");
        assert_eq!(Assembler::new("", "text").artifact_ref("x.svg"), "x.svg");
    }
}
