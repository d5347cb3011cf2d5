//! Protected inline spans
//!
//! Translatable text can carry inline material that must come back from the
//! translator byte-for-byte: inline code (`` `grid{:typst}` ``), inline HTML or
//! JSX tags, link destinations, footnote references and hard line breaks. This
//! module locates those spans and checks that a translation preserved them.
//!
//! Example: for the source `Use `text{:typst}` to [style](reference/text).`
//! the protected spans are `` `text{:typst}` `` and `](reference/text)`; the
//! link label `style` stays translatable.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunk::ChunkKind;

static INLINE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`[^`]+`|</?[A-Za-z][^<>]*>|\]\([^)\s]*\)|\[\^[^\]\s]+\]|\\\n")
        .expect("inline span pattern is valid")
});

/// A protected span located in a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    /// The exact protected text
    pub text: String,
    /// Byte range within the scanned text
    pub range: Range<usize>,
}

/// Locate all protected spans in order of appearance
pub fn extract_inline_spans(text: &str) -> Vec<InlineSpan> {
    INLINE_SPAN
        .find_iter(text)
        .map(|m| InlineSpan {
            text: m.as_str().to_string(),
            range: m.range(),
        })
        .collect()
}

/// Text with every protected span removed
fn strip_spans(text: &str) -> String {
    INLINE_SPAN.replace_all(text, " ").into_owned()
}

/// Whether any letters remain once protected spans are removed
///
/// A paragraph made only of an `<img />` tag or a code span has nothing to
/// translate and is carried through verbatim.
pub fn has_translatable_text(text: &str) -> bool {
    strip_spans(text).chars().any(char::is_alphabetic)
}

/// Number of unescaped `|` cell separators outside protected spans
pub fn count_cell_separators(text: &str) -> usize {
    let stripped = strip_spans(text);
    let mut count = 0;
    let mut escaped = false;
    for c in stripped.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '|' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count
}

fn span_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for span in extract_inline_spans(text) {
        *counts.entry(span.text).or_insert(0) += 1;
    }
    counts
}

/// Protected spans of `source` that `translated` does not reproduce exactly
///
/// Each distinct span must occur the same number of times in both texts. The
/// result lists offending spans; it is empty when the translation is faithful.
pub fn find_missing_spans(source: &str, translated: &str) -> Vec<String> {
    let expected = span_counts(source);
    let found = span_counts(translated);

    expected
        .into_iter()
        .filter(|(span, count)| found.get(span).copied().unwrap_or(0) != *count)
        .map(|(span, _)| span)
        .collect()
}

/// Verify a translation against its source content
///
/// # Returns
/// * `Ok(())` - every protected span survived (and, for table rows, the cell count)
/// * `Err(Vec<String>)` - descriptions of what was lost
pub fn verify_integrity(kind: ChunkKind, source: &str, translated: &str) -> Result<(), Vec<String>> {
    let mut problems = find_missing_spans(source, translated);

    if kind == ChunkKind::InlineMarkupRun {
        let expected = count_cell_separators(source);
        let found = count_cell_separators(translated);
        if expected != found {
            problems.push(format!("{} cell separators (found {})", expected, found));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
