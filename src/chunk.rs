use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, normalize_content};

/// The structural role of a chunk within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    Heading,
    Paragraph,
    ListItem,
    CodeBlock,
    InlineMarkupRun,
    OpaqueStructural,
}

impl ChunkKind {
    /// Code blocks and opaque structure are carried through verbatim.
    pub fn is_translatable(self) -> bool {
        !matches!(self, ChunkKind::CodeBlock | ChunkKind::OpaqueStructural)
    }

    /// Stable tag mixed into the fingerprint digest.
    pub fn tag(self) -> &'static str {
        match self {
            ChunkKind::Heading => "heading",
            ChunkKind::Paragraph => "paragraph",
            ChunkKind::ListItem => "list-item",
            ChunkKind::CodeBlock => "code-block",
            ChunkKind::InlineMarkupRun => "inline-markup-run",
            ChunkKind::OpaqueStructural => "opaque-structural",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Position of a chunk in the document tree: the ordinal among its structural
/// siblings, prefixed by the path of its parent container or list item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChunkPath(pub Vec<usize>);

impl ChunkPath {
    pub fn root(ordinal: usize) -> Self {
        ChunkPath(vec![ordinal])
    }

    pub fn child(&self, ordinal: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(ordinal);
        ChunkPath(segments)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Display for ChunkPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

impl std::str::FromStr for ChunkPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid chunk path segment '{}' in '{}'", part, s))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ChunkPath)
    }
}

/// One structural unit of a document.
///
/// `raw_span` holds the exact original bytes of the chunk including its
/// markup and trailing blank lines. For translatable chunks `text_range`
/// locates the translatable text inside `raw_span`; everything around it is
/// structural and re-emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub path: ChunkPath,
    /// Normalized translatable text, or the raw bytes for non-translatable kinds.
    pub content: String,
    pub raw_span: String,
    /// Byte range of `raw_span` within the whole document.
    pub source_range: Range<usize>,
    /// Byte range of the translatable text within `raw_span`.
    pub text_range: Range<usize>,
    fingerprint: Fingerprint,
}

impl Chunk {
    pub fn translatable(
        kind: ChunkKind,
        path: ChunkPath,
        raw_span: String,
        source_start: usize,
        text_range: Range<usize>,
    ) -> Self {
        let content = normalize_content(&raw_span[text_range.clone()]);
        let fingerprint = Fingerprint::of(kind, &content);
        let source_range = source_start..source_start + raw_span.len();
        Chunk {
            kind,
            path,
            content,
            raw_span,
            source_range,
            text_range,
            fingerprint,
        }
    }

    pub fn opaque(kind: ChunkKind, path: ChunkPath, raw_span: String, source_start: usize) -> Self {
        let fingerprint = Fingerprint::of(kind, &raw_span);
        let source_range = source_start..source_start + raw_span.len();
        let text_range = 0..raw_span.len();
        Chunk {
            kind,
            path,
            content: raw_span.clone(),
            raw_span,
            source_range,
            text_range,
            fingerprint,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_translatable(&self) -> bool {
        self.kind.is_translatable()
    }

    /// Markup preceding the translatable text (e.g. `"## "` or `"- "`).
    pub fn prefix(&self) -> &str {
        &self.raw_span[..self.text_range.start]
    }

    /// Markup and blank lines following the translatable text.
    pub fn suffix(&self) -> &str {
        &self.raw_span[self.text_range.end..]
    }
}

/// An ordered, fully chunked document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedDocument {
    pub chunks: Vec<Chunk>,
}

impl ChunkedDocument {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    pub fn find_by_path(&self, path: &ChunkPath) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| &chunk.path == path)
    }

    pub fn fingerprints(&self) -> Vec<&Fingerprint> {
        self.chunks.iter().map(Chunk::fingerprint).collect()
    }

    /// Concatenation of every raw span: the original document.
    pub fn to_source(&self) -> String {
        self.chunks.iter().map(|chunk| chunk.raw_span.as_str()).collect()
    }
}
