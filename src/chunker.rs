use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunk::{Chunk, ChunkKind, ChunkPath, ChunkedDocument};
use crate::error::{DeltaError, DeltaResult, SourceSpan};
use crate::mt::spans::has_translatable_text;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}(?: +|$)").expect("heading pattern is valid"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)(?:[-*+]|\d{1,9}[.)])(?: +|$)").expect("list marker pattern is valid")
});
static FOOTNOTE_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\^[^\]\s]+\]:[ \t]*").expect("footnote pattern is valid")
});
static THEMATIC_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
        .expect("thematic break pattern is valid")
});
static TABLE_DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|?\s*:?-+:?\s*(?:\|\s*:?-+:?\s*)*\|?\s*$")
        .expect("table delimiter pattern is valid")
});
static MDX_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:import|export)\s").expect("mdx pattern is valid"));
static TAG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*<(/?)([A-Za-z][A-Za-z0-9._-]*)").expect("tag name pattern is valid")
});

/// Tags that only ever appear inside running text.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "br", "code", "em", "i", "img", "kbd", "mark", "s", "small", "span",
    "strong", "sub", "sup", "u", "wbr",
];

/// Void tags that form a block of their own.
const VOID_BLOCK_TAGS: &[&str] = &["hr", "input", "link", "meta", "source"];

/// Line boundaries within the source: `start..end` excludes the line break,
/// `next` is where the following line begins.
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    end: usize,
    next: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Structure {
    Leaf { indent: usize },
    ListItem { indent: usize },
    Open { name: String },
    Close { name: String },
}

#[derive(Debug)]
struct ScannedBlock {
    kind: ChunkKind,
    last_line: usize,
    /// Absolute byte range of translatable text, if any.
    text: Option<Range<usize>>,
    structure: Structure,
}

#[derive(Debug)]
struct OpenContainer {
    name: String,
    path: ChunkPath,
    children: usize,
    line: usize,
}

#[derive(Debug)]
struct OpenListItem {
    indent: usize,
    path: ChunkPath,
    children: usize,
}

/// Splits an MDX document into an ordered sequence of chunks.
///
/// The chunker works line by line. Every byte of the input ends up in exactly
/// one chunk's `raw_span`, so joining the spans gives back the input.
pub struct Chunker<'a> {
    source: &'a str,
    lines: Vec<Line>,
    position: usize,
    chunks: Vec<Chunk>,
    root_ordinal: usize,
    containers: Vec<OpenContainer>,
    lists: Vec<OpenListItem>,
}

impl<'a> Chunker<'a> {
    pub fn new(source: &'a str) -> Self {
        Chunker {
            source,
            lines: split_lines(source),
            position: 0,
            chunks: Vec::new(),
            root_ordinal: 0,
            containers: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Chunk the whole document, or reject it with a `StructuralParse` error.
    pub fn chunk(mut self) -> DeltaResult<ChunkedDocument> {
        if self.is_blank(0) {
            let last = self.skip_blank_lines(0);
            let path = self.next_sibling_path();
            let raw_end = self.lines[last].next;
            self.chunks.push(Chunk::opaque(
                ChunkKind::OpaqueStructural,
                path,
                self.source[..raw_end].to_string(),
                0,
            ));
            self.position = last + 1;
        }

        while self.position < self.lines.len() {
            let first = self.position;
            let block = self.scan_block(first)?;
            let last = self.skip_blank_lines(block.last_line + 1);
            let path = self.place(&block, first)?;
            self.emit(block.kind, path, first, last, block.text);
            self.position = last + 1;
        }

        if let Some(open) = self.containers.last() {
            return Err(self.parse_error(
                open.line,
                format!("<{}> is never closed", open.name),
            ));
        }

        Ok(ChunkedDocument {
            chunks: self.chunks,
        })
    }

    // ========== Structure Tracking ==========

    fn next_sibling_path(&mut self) -> ChunkPath {
        match self.containers.last_mut() {
            Some(container) => {
                let path = container.path.child(container.children);
                container.children += 1;
                path
            }
            None => {
                let path = ChunkPath::root(self.root_ordinal);
                self.root_ordinal += 1;
                path
            }
        }
    }

    fn child_of_open_list_item(&mut self, indent: usize) -> Option<ChunkPath> {
        while self.lists.last().is_some_and(|item| item.indent >= indent) {
            self.lists.pop();
        }
        self.lists.last_mut().map(|item| {
            let path = item.path.child(item.children);
            item.children += 1;
            path
        })
    }

    /// Assign the path of a scanned block and update the open structure.
    fn place(&mut self, block: &ScannedBlock, first: usize) -> DeltaResult<ChunkPath> {
        match &block.structure {
            Structure::Open { name } => {
                self.lists.clear();
                let path = self.next_sibling_path();
                self.containers.push(OpenContainer {
                    name: name.clone(),
                    path: path.clone(),
                    children: 0,
                    line: first,
                });
                Ok(path)
            }
            Structure::Close { name } => {
                self.lists.clear();
                let Some(open) = self.containers.pop() else {
                    return Err(self.parse_error(
                        first,
                        format!("</{}> has no matching opening tag", name),
                    ));
                };
                if &open.name != name {
                    return Err(self.parse_error(
                        first,
                        format!("</{}> closes <{}>", name, open.name),
                    ));
                }
                Ok(open.path.child(open.children))
            }
            Structure::ListItem { indent } => {
                let path = match self.child_of_open_list_item(*indent) {
                    Some(path) => path,
                    None => self.next_sibling_path(),
                };
                self.lists.push(OpenListItem {
                    indent: *indent,
                    path: path.clone(),
                    children: 0,
                });
                Ok(path)
            }
            Structure::Leaf { indent } => {
                if *indent > 0 && self.lists.last().is_some_and(|item| item.indent < *indent) {
                    if let Some(path) = self.child_of_open_list_item(*indent) {
                        return Ok(path);
                    }
                }
                self.lists.clear();
                Ok(self.next_sibling_path())
            }
        }
    }

    fn emit(
        &mut self,
        kind: ChunkKind,
        path: ChunkPath,
        first: usize,
        last: usize,
        text: Option<Range<usize>>,
    ) {
        let start = self.lines[first].start;
        let end = self.lines[last].next;
        let raw = self.source[start..end].to_string();
        let chunk = match text {
            Some(range) if kind.is_translatable() => Chunk::translatable(
                kind,
                path,
                raw,
                start,
                (range.start - start)..(range.end - start),
            ),
            _ => Chunk::opaque(kind, path, raw, start),
        };
        self.chunks.push(chunk);
    }

    // ========== Block Scanning ==========

    fn scan_block(&self, first: usize) -> DeltaResult<ScannedBlock> {
        let line = self.line_text(first);

        if first == 0 && line.trim_end() == "---" {
            return self.scan_front_matter();
        }
        if let Some(fence) = fence_marker(line) {
            return self.scan_fence(first, fence);
        }
        if self.containers.is_empty() && MDX_STATEMENT.is_match(line) {
            return Ok(verbatim(ChunkKind::OpaqueStructural, first));
        }
        if line.trim_start().starts_with("<!--") {
            return self.scan_comment(first);
        }
        if let Some(block) = self.scan_markup(first)? {
            return Ok(block);
        }
        if HEADING.is_match(line) {
            let marker_end = HEADING.find(line).map(|m| m.end()).unwrap_or(0);
            let start = self.lines[first].start + marker_end;
            let end = self.lines[first].start + line.trim_end().len();
            if end <= start {
                return Ok(verbatim(ChunkKind::OpaqueStructural, first));
            }
            return Ok(text_block(ChunkKind::Heading, first, start..end, 0));
        }
        if THEMATIC_BREAK.is_match(line) {
            return Ok(verbatim(ChunkKind::OpaqueStructural, first));
        }
        if line.trim_start().starts_with('|') {
            return Ok(self.scan_table_row(first));
        }
        if let Some(captures) = LIST_MARKER.captures(line) {
            let indent = captures.get(1).map(|m| m.as_str().len()).unwrap_or(0);
            let marker_end = captures.get(0).map(|m| m.end()).unwrap_or(0);
            return Ok(self.scan_list_item(first, indent, marker_end));
        }
        Ok(self.scan_paragraph(first))
    }

    fn scan_front_matter(&self) -> DeltaResult<ScannedBlock> {
        (1..self.lines.len())
            .find(|&idx| self.line_text(idx).trim_end() == "---")
            .map(|last| verbatim(ChunkKind::OpaqueStructural, last))
            .ok_or_else(|| self.parse_error(0, "front matter is never closed".to_string()))
    }

    fn scan_fence(&self, first: usize, fence: (char, usize)) -> DeltaResult<ScannedBlock> {
        let (marker, width) = fence;
        (first + 1..self.lines.len())
            .find(|&idx| closes_fence(self.line_text(idx), marker, width))
            .map(|last| verbatim(ChunkKind::CodeBlock, last))
            .ok_or_else(|| self.parse_error(first, "code fence is never closed".to_string()))
    }

    fn scan_comment(&self, first: usize) -> DeltaResult<ScannedBlock> {
        let from = self.lines[first].start;
        let end = self.source[from..]
            .find("-->")
            .map(|offset| from + offset)
            .ok_or_else(|| self.parse_error(first, "HTML comment is never closed".to_string()))?;
        Ok(verbatim(ChunkKind::OpaqueStructural, self.line_of(end)))
    }

    /// JSX components, containers and raw HTML blocks. Inline tags fall
    /// through to paragraph scanning.
    fn scan_markup(&self, first: usize) -> DeltaResult<Option<ScannedBlock>> {
        let line = self.line_text(first);
        let Some(captures) = TAG_NAME.captures(line) else {
            return Ok(None);
        };
        let closing = captures.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default().to_string();
        let lower = name.to_ascii_lowercase();

        if INLINE_TAGS.contains(&lower.as_str()) {
            return Ok(None);
        }
        if closing {
            return Ok(Some(ScannedBlock {
                kind: ChunkKind::OpaqueStructural,
                last_line: first,
                text: None,
                structure: Structure::Close { name },
            }));
        }

        let tag_start = self.lines[first].start + line.find('<').unwrap_or(0);
        let (tag_end, self_closing) = self
            .scan_tag_end(tag_start + 1)
            .ok_or_else(|| self.parse_error(first, format!("<{}> tag is never terminated", name)))?;
        let tag_last_line = self.line_of(tag_end.saturating_sub(1));

        if self_closing || VOID_BLOCK_TAGS.contains(&lower.as_str()) {
            return Ok(Some(verbatim(ChunkKind::OpaqueStructural, tag_last_line)));
        }

        let rest_of_line = &self.source[tag_end..self.lines[tag_last_line].end];
        if rest_of_line.contains(&format!("</{}>", name)) {
            // Single-line element: its text is translatable like a paragraph.
            return Ok(None);
        }

        if is_container(&name) {
            return Ok(Some(ScannedBlock {
                kind: ChunkKind::OpaqueStructural,
                last_line: tag_last_line,
                text: None,
                structure: Structure::Open { name },
            }));
        }

        let last = self
            .find_html_block_end(tag_end, &lower)
            .ok_or_else(|| self.parse_error(first, format!("<{}> block is never closed", name)))?;
        Ok(Some(verbatim(ChunkKind::OpaqueStructural, last)))
    }

    /// Byte offset just past the `>` that ends the tag opened before `from`,
    /// and whether the tag is self-closing. Quoted strings, template literals
    /// and `{}` expressions may contain `>` and span lines.
    fn scan_tag_end(&self, from: usize) -> Option<(usize, bool)> {
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut depth = 0usize;
        let mut previous = '\0';

        for (offset, c) in self.source[from..].char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => return Some((from + offset + 1, previous == '/')),
                _ => {}
            }
            if !c.is_whitespace() {
                previous = c;
            }
        }
        None
    }

    /// Line index holding the `</name>` that balances an HTML block opened just before `from`.
    fn find_html_block_end(&self, from: usize, name: &str) -> Option<usize> {
        let mut depth = 1usize;
        let mut idx = self.line_of(from);
        let mut segment_start = from;
        while idx < self.lines.len() {
            let segment = self.source[segment_start..self.lines[idx].end].to_ascii_lowercase();
            let (opens, closes) = count_tags(&segment, name);
            depth += opens;
            if closes >= depth {
                return Some(idx);
            }
            depth -= closes;
            idx += 1;
            if let Some(line) = self.lines.get(idx) {
                segment_start = line.start;
            }
        }
        None
    }

    fn scan_table_row(&self, first: usize) -> ScannedBlock {
        let line = self.line_text(first);
        if TABLE_DELIMITER.is_match(line) || !has_translatable_text(line) {
            return verbatim(ChunkKind::OpaqueStructural, first);
        }
        let indent = line.len() - line.trim_start().len();
        let start = self.lines[first].start + indent;
        let end = self.lines[first].start + line.trim_end().len();
        text_block(ChunkKind::InlineMarkupRun, first, start..end, indent)
    }

    fn scan_list_item(&self, first: usize, indent: usize, marker_end: usize) -> ScannedBlock {
        let mut last = first;
        while last + 1 < self.lines.len()
            && !self.is_blank(last + 1)
            && !self.is_block_start(last + 1)
        {
            last += 1;
        }
        let start = self.lines[first].start + marker_end;
        let end = self.lines[last].start + self.line_text(last).trim_end().len();
        let text = start..end.max(start);

        if !has_translatable_text(&self.source[text.clone()]) {
            return ScannedBlock {
                kind: ChunkKind::OpaqueStructural,
                last_line: last,
                text: None,
                structure: Structure::ListItem { indent },
            };
        }
        ScannedBlock {
            kind: ChunkKind::ListItem,
            last_line: last,
            text: Some(text),
            structure: Structure::ListItem { indent },
        }
    }

    fn scan_paragraph(&self, first: usize) -> ScannedBlock {
        let mut last = first;
        while last + 1 < self.lines.len()
            && !self.is_blank(last + 1)
            && !self.is_block_start(last + 1)
        {
            last += 1;
        }

        let line = self.line_text(first);
        let indent = line.len() - line.trim_start().len();
        let prefix = FOOTNOTE_DEF
            .find(line.trim_start())
            .map(|m| m.end())
            .unwrap_or(0);
        let start = self.lines[first].start + indent + prefix;
        let end = self.lines[last].start + self.line_text(last).trim_end().len();
        let text = start..end.max(start);

        if !has_translatable_text(&self.source[text.clone()]) {
            return ScannedBlock {
                kind: ChunkKind::OpaqueStructural,
                last_line: last,
                text: None,
                structure: Structure::Leaf { indent },
            };
        }
        text_block(ChunkKind::Paragraph, last, text, indent)
    }

    // ========== Line Helpers ==========

    fn line_text(&self, idx: usize) -> &'a str {
        let line = self.lines[idx];
        &self.source[line.start..line.end]
    }

    fn is_blank(&self, idx: usize) -> bool {
        idx < self.lines.len() && self.line_text(idx).trim().is_empty()
    }

    /// Index of the last line of a blank run starting at `from`, or `from - 1`
    /// when `from` is not blank.
    fn skip_blank_lines(&self, from: usize) -> usize {
        let mut idx = from;
        while self.is_blank(idx) {
            idx += 1;
        }
        idx - 1
    }

    fn line_of(&self, byte: usize) -> usize {
        self.lines
            .partition_point(|line| line.start <= byte)
            .saturating_sub(1)
    }

    /// Whether a line begins a new block and therefore ends a running paragraph.
    fn is_block_start(&self, idx: usize) -> bool {
        starts_block(self.line_text(idx))
    }

    fn parse_error(&self, line_idx: usize, message: String) -> DeltaError {
        let line = self.lines.get(line_idx).copied().unwrap_or(Line {
            start: self.source.len(),
            end: self.source.len(),
            next: self.source.len(),
        });
        let snippet: String = self.source[line.start..line.end].chars().take(60).collect();
        DeltaError::StructuralParse {
            span: SourceSpan {
                start: line.start,
                end: line.end,
                line: line_idx + 1,
                snippet,
            },
            message,
        }
    }
}

/// Convenience wrapper around [`Chunker`].
pub fn chunk_document(source: &str) -> DeltaResult<ChunkedDocument> {
    Chunker::new(source).chunk()
}

fn verbatim(kind: ChunkKind, last_line: usize) -> ScannedBlock {
    ScannedBlock {
        kind,
        last_line,
        text: None,
        structure: Structure::Leaf { indent: 0 },
    }
}

fn text_block(kind: ChunkKind, last_line: usize, text: Range<usize>, indent: usize) -> ScannedBlock {
    ScannedBlock {
        kind,
        last_line,
        text: Some(text),
        structure: Structure::Leaf { indent },
    }
}

fn split_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(Line {
                start,
                end: idx,
                next: idx + 1,
            });
            start = idx + 1;
        }
    }
    if start < source.len() {
        lines.push(Line {
            start,
            end: source.len(),
            next: source.len(),
        });
    }
    lines
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let width = trimmed.chars().take_while(|c| *c == marker).count();
    (width >= 3).then_some((marker, width))
}

fn closes_fence(line: &str, marker: char, width: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().take_while(|c| *c == marker).count() >= width
        && trimmed.chars().all(|c| c == marker)
}

/// Capitalised JSX components and `div` wrap chunked children.
fn is_container(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase) || name == "div"
}

/// Count `<name` openings and `</name` closings in an already lowercased segment.
fn count_tags(segment: &str, name: &str) -> (usize, usize) {
    let is_boundary = |rest: &str| {
        rest.chars()
            .next()
            .is_none_or(|c| c.is_whitespace() || c == '>' || c == '/')
    };
    let opening = format!("<{}", name);
    let closing = format!("</{}", name);
    let opens = segment
        .match_indices(&opening)
        .filter(|(idx, _)| is_boundary(&segment[idx + opening.len()..]))
        .count();
    let closes = segment
        .match_indices(&closing)
        .filter(|(idx, _)| is_boundary(&segment[idx + closing.len()..]))
        .count();
    (opens, closes)
}

fn starts_block(line: &str) -> bool {
    let trimmed = line.trim_start();
    if HEADING.is_match(line)
        || fence_marker(line).is_some()
        || THEMATIC_BREAK.is_match(line)
        || LIST_MARKER.is_match(line)
        || FOOTNOTE_DEF.is_match(trimmed)
        || trimmed.starts_with('|')
        || trimmed.starts_with("<!--")
    {
        return true;
    }
    match TAG_NAME.captures(line) {
        Some(captures) => {
            let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            !INLINE_TAGS.contains(&name.to_ascii_lowercase().as_str())
        }
        None => false,
    }
}

/// Whether `line`, placed at the start of a line, would be read as markup
/// rather than running text: anything that interrupts a paragraph, plus
/// block quotes and MDX `import`/`export` statements.
pub(crate) fn opens_block(line: &str) -> bool {
    starts_block(line) || line.trim_start().starts_with('>') || MDX_STATEMENT.is_match(line)
}
