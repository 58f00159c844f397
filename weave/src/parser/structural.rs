use std::ops::Range;

use pulldown_cmark::{
    CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd,
};

use crate::classify::ModifierSet;
use crate::document::{CodeBlock, Conditional, Directive, Node, Prose};
use crate::error::Error;
use crate::expr::Guard;
use crate::parser::expression;
use crate::source::Span;

const INCLUDE_MARKER: &str = "!include";
const IF_MARKER: &str = "!if";
const ENDIF_MARKER: &str = "!endif";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse `window` of `source` into nodes.
///
/// pulldown-cmark locates code blocks; everything between them is scanned
/// line by line for `!include` / `!if` / `!endif` markers, so markers inside
/// code are never interpreted.
pub fn parse_nodes(
    source: &str,
    file_id: usize,
    window: Range<usize>,
) -> Result<Vec<Node>, Error> {
    let regions = scan_code_regions(source, window.clone());

    let mut state = ParseState::new(source, file_id);
    let mut cursor = window.start;
    for region in regions {
        state.scan_prose(cursor..region.range.start)?;
        cursor = region.range.end;
        match region.kind {
            RegionKind::Fenced { info, content } => {
                let block = state.code_block(region.range, &info, content)?;
                state.push(Node::CodeBlock(block));
            }
            RegionKind::Indented => state.push_prose(region.range),
        }
    }
    state.scan_prose(cursor..window.end)?;
    state.finalize()
}

/// A heading section: the heading line up to the next heading of the same
/// or a shallower level.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub level: u8,
    pub range: Range<usize>,
}

/// All heading sections of `source`, in order.
pub fn sections(source: &str) -> Vec<Section> {
    let events: Vec<(Event<'_>, Range<usize>)> =
        CmarkParser::new_ext(source, cmark_options()).into_offset_iter().collect();

    let mut headings: Vec<(String, u8, usize)> = Vec::new();
    let mut i = 0;
    while i < events.len() {
        match &events[i].0 {
            Event::Start(Tag::Heading { level, .. }) => {
                let level = heading_level_to_u8(level);
                let start = events[i].1.start;
                i += 1;
                let name = normalize_heading(&collect_heading_text(&events, &mut i));
                headings.push((name, level, start));
            }
            _ => i += 1,
        }
    }

    headings
        .iter()
        .enumerate()
        .map(|(idx, (name, level, start))| {
            let end = headings[idx + 1..]
                .iter()
                .find(|(_, l, _)| l <= level)
                .map(|(_, _, s)| *s)
                .unwrap_or(source.len());
            Section {
                name: name.clone(),
                level: *level,
                range: *start..end,
            }
        })
        .collect()
}

/// Find a section by name: exact match first, then case-insensitive.
pub fn find_section<'s>(sections: &'s [Section], name: &str) -> Option<&'s Section> {
    let wanted = normalize_heading(name);
    sections.iter().find(|s| s.name == wanted).or_else(|| {
        let lower = wanted.to_lowercase();
        sections.iter().find(|s| s.name.to_lowercase() == lower)
    })
}

// ---------------------------------------------------------------------------
// Code regions
// ---------------------------------------------------------------------------

struct CodeRegion {
    range: Range<usize>,
    kind: RegionKind,
}

enum RegionKind {
    Fenced { info: String, content: String },
    Indented,
}

fn cmark_options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES
}

fn scan_code_regions(source: &str, window: Range<usize>) -> Vec<CodeRegion> {
    let text = &source[window.clone()];
    let events: Vec<(Event<'_>, Range<usize>)> =
        CmarkParser::new_ext(text, cmark_options()).into_offset_iter().collect();

    let mut regions = Vec::new();
    let mut i = 0;
    while i < events.len() {
        let (ref ev, ref range) = events[i];
        match ev {
            Event::Start(Tag::CodeBlock(kind)) => {
                let start = window.start + range.start;
                let end = extend_to_line_end(source, window.start + range.end, window.end);
                let kind = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let info = info.to_string();
                        i += 1;
                        let content = collect_text_until(&events, &mut i, |e| {
                            matches!(e, TagEnd::CodeBlock)
                        });
                        RegionKind::Fenced { info, content }
                    }
                    CodeBlockKind::Indented => {
                        i += 1;
                        skip_until(&events, &mut i, |e| matches!(e, TagEnd::CodeBlock));
                        RegionKind::Indented
                    }
                };
                regions.push(CodeRegion {
                    range: start..end,
                    kind,
                });
            }
            _ => i += 1,
        }
    }
    regions
}

/// Make a code region own the rest of its closing line, newline included.
fn extend_to_line_end(source: &str, end: usize, limit: usize) -> usize {
    if end == 0 || end >= limit || source.as_bytes()[end - 1] == b'\n' {
        return end;
    }
    let rest = &source[end..limit];
    match rest.find('\n') {
        Some(nl) if rest[..nl].trim().is_empty() => end + nl + 1,
        None if rest.trim().is_empty() => limit,
        _ => end,
    }
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct OpenConditional {
    guard: Guard,
    source: String,
    span: Span,
    children: Vec<Node>,
}

struct ParseState<'a> {
    source: &'a str,
    file_id: usize,
    /// Completed top-level nodes.
    root: Vec<Node>,
    /// Stack of `!if` spans being built. Innermost = current scope.
    open: Vec<OpenConditional>,
}

enum Marker {
    Include(Range<usize>),
    If(Range<usize>),
    EndIf(Range<usize>),
}

impl<'a> ParseState<'a> {
    fn new(source: &'a str, file_id: usize) -> Self {
        ParseState {
            source,
            file_id,
            root: Vec::new(),
            open: Vec::new(),
        }
    }

    fn span(&self, range: Range<usize>) -> Span {
        Span::new(self.source, self.file_id, range)
    }

    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(open) => open.children.push(node),
            None => self.root.push(node),
        }
    }

    fn push_prose(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let text = self.source[range.clone()].to_string();
        let span = self.span(range);
        self.push(Node::Prose(Prose { text, span }));
    }

    /// Split a prose region at marker lines.
    fn scan_prose(&mut self, region: Range<usize>) -> Result<(), Error> {
        let mut pos = region.start;
        let mut prose_start = region.start;

        while pos < region.end {
            let line_end = self.source[pos..region.end]
                .find('\n')
                .map(|nl| pos + nl + 1)
                .unwrap_or(region.end);
            let at_line_start = pos == 0 || self.source.as_bytes()[pos - 1] == b'\n';

            if at_line_start {
                if let Some(marker) = parse_marker(&self.source[pos..line_end]) {
                    self.push_prose(prose_start..pos);
                    self.apply_marker(marker, pos, line_end)?;
                    prose_start = line_end;
                }
            }
            pos = line_end;
        }

        self.push_prose(prose_start..region.end);
        Ok(())
    }

    fn apply_marker(
        &mut self,
        marker: Marker,
        line_start: usize,
        line_end: usize,
    ) -> Result<(), Error> {
        let source = self.source;
        let line = &source[line_start..line_end];
        let content_end = line_start + line.trim_end().len();
        let span = self.span(line_start..content_end);
        let shift = |r: &Range<usize>| line_start + r.start..line_start + r.end;

        match marker {
            Marker::Include(arg) => {
                let target = source[shift(&arg)].trim();
                if target.is_empty() {
                    return Err(Error::syntax("`!include` requires a path", span));
                }
                let (path, section) = match target.rsplit_once('#') {
                    Some((path, section)) => {
                        let section = section.trim();
                        if section.is_empty() {
                            return Err(Error::syntax("empty section name after `#`", span));
                        }
                        (path.trim(), Some(section.to_string()))
                    }
                    None => (target, None),
                };
                if path.is_empty() {
                    return Err(Error::syntax("`!include` requires a path before `#`", span));
                }
                self.push(Node::Directive(Directive {
                    path: path.to_string(),
                    section,
                    span,
                }));
            }
            Marker::If(arg) => {
                let range = shift(&arg);
                let text = &source[range.clone()];
                if text.trim().is_empty() {
                    return Err(Error::syntax("`!if` requires a guard expression", span));
                }
                let guard = expression::parse_guard(text, range.start).map_err(|e| {
                    Error::syntax(format!("invalid guard: {}", e.message), self.span(e.range))
                })?;
                self.open.push(OpenConditional {
                    guard,
                    source: text.to_string(),
                    span,
                    children: Vec::new(),
                });
            }
            Marker::EndIf(trailing) => {
                if !trailing.is_empty() {
                    return Err(Error::syntax("unexpected text after `!endif`", span));
                }
                let open = self
                    .open
                    .pop()
                    .ok_or_else(|| Error::syntax("`!endif` without matching `!if`", span))?;
                self.push(Node::Conditional(Conditional {
                    guard: open.guard,
                    source: open.source,
                    children: open.children,
                    span: open.span,
                }));
            }
        }
        Ok(())
    }

    fn code_block(
        &self,
        range: Range<usize>,
        info: &str,
        content: String,
    ) -> Result<CodeBlock, Error> {
        let span = self.span(range.clone());
        let (info, tags) = split_info(info).map_err(|msg| Error::syntax(msg, span.clone()))?;
        let language = info.split_whitespace().next().map(str::to_string);

        let fence_char = self.source[range.start..].chars().next().unwrap_or('`');
        let fence: String = self.source[range.start..]
            .chars()
            .take_while(|&c| c == fence_char)
            .collect();

        let line_start = self.source[..range.start]
            .rfind('\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        let prefix = container_prefix(&self.source[line_start..range.start]);

        Ok(CodeBlock {
            language,
            info,
            tags,
            modifiers: ModifierSet::default(),
            index: 0,
            fence,
            content,
            prefix,
            span,
        })
    }

    fn finalize(self) -> Result<Vec<Node>, Error> {
        if let Some(open) = self.open.last() {
            return Err(Error::syntax(
                "unterminated `!if` (missing `!endif`)",
                open.span.clone(),
            ));
        }
        Ok(self.root)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// What precedes the fence on its line, as repeated on continuation lines:
/// blockquote markers and whitespace are kept, list markers become spaces.
fn container_prefix(lead: &str) -> String {
    lead.chars()
        .map(|c| if c == '>' || c.is_whitespace() { c } else { ' ' })
        .collect()
}

/// Recognise a marker line. Ranges are relative to the line.
fn parse_marker(line: &str) -> Option<Marker> {
    let body = line.trim_end_matches(['\n', '\r']);
    let lead = body.len() - body.trim_start().len();

    let argument = |keyword: &str| -> Option<Range<usize>> {
        let after = body[lead..].strip_prefix(keyword)?;
        if !after.is_empty() && !after.starts_with(char::is_whitespace) {
            return None;
        }
        let start = lead + keyword.len() + (after.len() - after.trim_start().len());
        let end = lead + keyword.len() + after.trim_end().len();
        Some(start..end.max(start))
    };

    if let Some(arg) = argument(INCLUDE_MARKER) {
        return Some(Marker::Include(arg));
    }
    if let Some(arg) = argument(ENDIF_MARKER) {
        return Some(Marker::EndIf(arg));
    }
    argument(IF_MARKER).map(Marker::If)
}

/// Split `calc {hide-output, silent}` into the info text and its tag list.
fn split_info(info: &str) -> Result<(String, Vec<String>), String> {
    let Some(open) = info.find('{') else {
        return Ok((info.trim().to_string(), Vec::new()));
    };
    let rest = &info[open + 1..];
    let close = rest
        .find('}')
        .ok_or_else(|| "unterminated modifier list (missing `}`)".to_string())?;
    if !rest[close + 1..].trim().is_empty() {
        return Err("unexpected text after modifier list".to_string());
    }
    let tags = rest[..close]
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Ok((info[..open].trim().to_string(), tags))
}

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Collect heading text (all Text events until End(Heading)).
fn collect_heading_text(events: &[(Event<'_>, Range<usize>)], i: &mut usize) -> String {
    let mut name = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(TagEnd::Heading(_)) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Code(s) => {
                name.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    name
}

/// Strip leading/trailing whitespace, collapse interior whitespace.
fn normalize_heading(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collect all text content until a matching End tag.
fn collect_text_until(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

fn skip_until(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) {
    while *i < events.len() {
        let done = matches!(&events[*i].0, Event::End(tag_end) if is_end(tag_end));
        *i += 1;
        if done {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_need_a_word_boundary() {
        assert!(matches!(parse_marker("!include a.md\n"), Some(Marker::Include(r)) if r == (9..13)));
        assert!(matches!(parse_marker("  !if x > 1"), Some(Marker::If(r)) if r == (6..11)));
        assert!(matches!(parse_marker("!endif\n"), Some(Marker::EndIf(r)) if r.is_empty()));
        assert!(parse_marker("!ifdef FOO").is_none());
        assert!(parse_marker("!includes a.md").is_none());
        assert!(parse_marker("text !if x").is_none());
    }

    #[test]
    fn info_tags_are_split_on_commas_and_spaces() {
        let (info, tags) = split_info("calc {hide-output, silent  no-exec}").unwrap();
        assert_eq!(info, "calc");
        assert_eq!(tags, vec!["hide-output", "silent", "no-exec"]);
        assert_eq!(split_info("rust,ignore").unwrap(), ("rust,ignore".to_string(), vec![]));
        assert!(split_info("calc {silent").is_err());
        assert!(split_info("calc {silent} extra").is_err());
    }

    #[test]
    fn closing_line_is_owned_by_the_code_region() {
        let src = "```\nx\n```  \nafter";
        assert_eq!(extend_to_line_end(src, 9, src.len()), 12);
        assert_eq!(extend_to_line_end(src, 12, src.len()), 12);
    }

    #[test]
    fn sections_end_at_same_or_shallower_heading() {
        let src = "# A\ntext\n## B\nmore\n### C\n## D\n# E\n";
        let found = sections(src);
        let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
        let b = find_section(&found, "b").unwrap();
        assert_eq!(&src[b.range.clone()], "## B\nmore\n### C\n");
    }
}
