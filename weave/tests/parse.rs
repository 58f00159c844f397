use weave::parser::Parser;
use weave::{Document, Error, Node};

fn parse(source: &str) -> Document {
    Parser::new(source, 0).parse().expect("parse failed")
}

fn parse_err(source: &str) -> Error {
    Parser::new(source, 0).parse().expect_err("expected a parse error")
}

fn kinds(nodes: &[Node]) -> Vec<&'static str> {
    nodes
        .iter()
        .map(|n| match n {
            Node::Prose(_) => "prose",
            Node::Directive(_) => "directive",
            Node::CodeBlock(_) => "code",
            Node::Conditional(_) => "if",
        })
        .collect()
}

#[test]
fn markers_split_prose() {
    let doc = parse("Intro\n!if x == 3\nVisible\n!endif\n```calc {silent}\nx = 1\n```\nOutro\n");
    assert_eq!(kinds(&doc.nodes), vec!["prose", "if", "code", "prose"]);

    let Node::Conditional(cond) = &doc.nodes[1] else {
        panic!("expected conditional");
    };
    assert_eq!(cond.source, "x == 3");
    assert_eq!(kinds(&cond.children), vec!["prose"]);
    let Node::Prose(visible) = &cond.children[0] else {
        panic!("expected prose");
    };
    assert_eq!(visible.text, "Visible\n");
    assert_eq!(cond.span.line, 2);
}

#[test]
fn markers_inside_code_are_literal() {
    let doc = parse("```calc\n!if x\n!include a.md\n```\n");
    assert_eq!(kinds(&doc.nodes), vec!["code"]);
    let blocks = doc.code_blocks();
    assert_eq!(blocks[0].content, "!if x\n!include a.md\n");
    assert!(!doc.has_directives());
}

#[test]
fn markers_inside_indented_code_are_literal() {
    let doc = parse("Para\n\n    !include a.md\n\nAfter\n");
    assert!(!doc.has_directives());
}

#[test]
fn marker_words_need_a_boundary() {
    let doc = parse("!ifdef is not a guard\n!included neither\n");
    assert_eq!(kinds(&doc.nodes), vec!["prose"]);
}

#[test]
fn include_with_section() {
    let doc = parse("!include parts/b.md#Setup Steps\n");
    let Node::Directive(directive) = &doc.nodes[0] else {
        panic!("expected directive");
    };
    assert_eq!(directive.path, "parts/b.md");
    assert_eq!(directive.section.as_deref(), Some("Setup Steps"));
    assert!(doc.has_directives());
}

#[test]
fn include_without_path_is_an_error() {
    assert!(matches!(parse_err("!include\n"), Error::Syntax { .. }));
    assert!(matches!(parse_err("!include #Only\n"), Error::Syntax { .. }));
}

#[test]
fn fence_info_tags() {
    let doc = parse("~~~~calc {hide-output, silent}\n1 + 1\n~~~~\n");
    let block = doc.code_blocks()[0];
    assert_eq!(block.language.as_deref(), Some("calc"));
    assert_eq!(block.info, "calc");
    assert_eq!(block.tags, vec!["hide-output", "silent"]);
    assert_eq!(block.fence, "~~~~");
    assert_eq!(block.content, "1 + 1\n");
    assert!(block.modifiers.is_empty());
}

#[test]
fn unterminated_tag_list_is_an_error() {
    let err = parse_err("```calc {silent\nx = 1\n```\n");
    assert!(err.to_string().contains("missing `}`"), "{err}");
}

#[test]
fn block_in_list_item_keeps_indent() {
    let doc = parse("- item\n\n  ```calc\n  x = 1\n  ```\n");
    let block = doc.code_blocks()[0];
    assert_eq!(block.prefix, "  ");
    assert_eq!(block.content, "x = 1\n");
}

#[test]
fn block_in_blockquote_keeps_quote_marker() {
    let doc = parse("> ```calc\n> x = 1\n> ```\n");
    let block = doc.code_blocks()[0];
    assert_eq!(block.prefix, "> ");
    assert_eq!(block.content, "x = 1\n");
}

#[test]
fn list_marker_on_fence_line_becomes_spaces() {
    let doc = parse("> 1. ~~~calc\n>    x = 1\n>    ~~~\n");
    let block = doc.code_blocks()[0];
    assert_eq!(block.prefix, ">    ");
    assert_eq!(block.fence, "~~~");
    assert_eq!(block.content, "x = 1\n");
}

#[test]
fn tilde_fence_in_list_item() {
    let doc = parse("- item\n\n  ~~~calc {silent}\n  x = 1\n  ~~~\n");
    let block = doc.code_blocks()[0];
    assert_eq!(block.prefix, "  ");
    assert_eq!(block.fence, "~~~");
    assert_eq!(block.info, "calc");
}

#[test]
fn conditionals_nest() {
    let doc = parse("!if a\n!if b\ninner\n!endif\nouter\n!endif\n");
    let Node::Conditional(outer) = &doc.nodes[0] else {
        panic!("expected conditional");
    };
    assert_eq!(kinds(&outer.children), vec!["if", "prose"]);
}

#[test]
fn unbalanced_markers() {
    let err = parse_err("text\n!endif\n");
    assert!(err.to_string().contains("without matching"), "{err}");
    assert_eq!(err.span().map(|s| s.line), Some(2));

    let err = parse_err("!if ready\ntext\n");
    assert!(err.to_string().contains("unterminated"), "{err}");
    assert_eq!(err.span().map(|s| s.line), Some(1));
}

#[test]
fn guard_calls_are_rejected_with_position() {
    let source = "prose\n!if len(name) > 2\nx\n!endif\n";
    let err = parse_err(source);
    assert!(err.to_string().contains("calls are not allowed"), "{err}");
    let span = err.span().expect("positional error");
    assert_eq!(span.line, 2);
    assert_eq!(&source[span.range.clone()], "len");
}

#[test]
fn empty_guard_is_an_error() {
    assert!(matches!(parse_err("!if\n!endif\n"), Error::Syntax { .. }));
}

#[test]
fn sections_of_a_file() {
    let source = "# Guide\nintro\n## Setup Steps\nsetup\n### Detail\nmore\n## Usage\nuse\n";
    let found = weave::parser::sections(source);
    let setup = weave::parser::find_section(&found, "setup   steps").expect("section");
    assert_eq!(&source[setup.range.clone()], "## Setup Steps\nsetup\n### Detail\nmore\n");
    assert_eq!(setup.level, 2);
}
