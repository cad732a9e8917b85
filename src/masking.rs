//! Destructive, length-preserving masking.
//!
//! Flat text is rewritten into a new string; structured sources are rewritten
//! fragment by fragment in place. Every character inside a masked span becomes
//! one mask character, so the character count never changes, and fragments are
//! never merged, split, removed or reordered.

use crate::detection::Match;
use crate::projection::{FragmentId, FragmentMapping, StructuredSource};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_MASK_CHAR: char = '*';

/// Result of masking flat text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedText {
    pub text: String,
    /// True iff at least one character was replaced
    pub changed: bool,
}

/// Result of masking a structured source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MaskOutcome {
    /// True iff some fragment's text actually differs after the rewrite
    pub changed: bool,
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Clamp a span into `text`, widening it to char boundaries.
/// Returns `None` for empty or inverted spans.
fn clamp_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if end <= start {
        return None;
    }
    let len = text.len();
    let start = floor_boundary(text, start.min(len));
    let end = ceil_boundary(text, end.min(len).max(start));
    (start < end).then_some((start, end))
}

fn push_mask(out: &mut String, segment: &str, mask_char: char) {
    out.extend(std::iter::repeat(mask_char).take(segment.chars().count()));
}

/// Rewrite `text` with every span masked in a single left-to-right pass.
///
/// Spans are clamped into the text; zero-length and inverted spans are
/// dropped. A span already covered by an earlier one contributes nothing.
fn mask_spans(
    text: &str,
    spans: impl IntoIterator<Item = (usize, usize)>,
    mask_char: char,
) -> (String, bool) {
    let mut spans: Vec<(usize, usize)> = spans
        .into_iter()
        .filter_map(|(start, end)| clamp_span(text, start, end))
        .collect();
    spans.sort_by_key(|(start, _)| *start);

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut changed = false;

    for (start, end) in spans {
        if end <= cursor {
            continue;
        }
        let start = start.max(cursor);
        result.push_str(&text[cursor..start]);
        push_mask(&mut result, &text[start..end], mask_char);
        cursor = end;
        changed = true;
    }

    result.push_str(&text[cursor..]);
    (result, changed)
}

/// Mask `matches` in flat `text`.
///
/// Overlapping spans are tolerated; spans outside the text are clamped or
/// dropped.
pub fn mask_text(text: &str, matches: &[Match], mask_char: char) -> MaskedText {
    if text.is_empty() || matches.is_empty() {
        return MaskedText {
            text: text.to_string(),
            changed: false,
        };
    }

    let (text, changed) = mask_spans(text, matches.iter().map(|m| (m.start, m.end)), mask_char);
    MaskedText { text, changed }
}

/// Mask `matches` inside the fragments of `source`.
///
/// `mappings` must be a fresh [`crate::projection::project`] of `source`;
/// mappings taken before an edit produce undefined (but memory-safe) results.
/// Every match is first cut into fragment-local ranges against the untouched
/// fragments, then each fragment is rewritten once. Masking a multi-byte
/// character with a one-byte mask shrinks its fragment, so ranges are never
/// read against an already rewritten fragment.
pub fn mask_structured<S: StructuredSource + ?Sized>(
    source: &mut S,
    matches: &[Match],
    mappings: &[FragmentMapping],
    mask_char: char,
) -> MaskOutcome {
    if matches.is_empty() || mappings.is_empty() {
        return MaskOutcome::default();
    }

    let mut pending: BTreeMap<FragmentId, Vec<(usize, usize)>> = BTreeMap::new();
    for m in matches.iter().filter(|m| m.start < m.end) {
        for mapping in mappings {
            let from = m.start.max(mapping.start);
            let to = m.end.min(mapping.end);
            if from < to {
                pending
                    .entry(mapping.fragment)
                    .or_default()
                    .push((from - mapping.start, to - mapping.start));
            }
        }
    }

    let mut changed = false;
    for (fragment, ranges) in pending.into_iter().rev() {
        let Some(original) = source.fragment_text(fragment) else {
            debug!(fragment = fragment.0, "Mapping points at a missing fragment");
            continue;
        };

        let (rewritten, _) = mask_spans(original, ranges, mask_char);
        if rewritten != original && source.set_fragment_text(fragment, rewritten) {
            changed = true;
        }
    }

    MaskOutcome { changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionSource, EntityType};
    use crate::projection::{project, Node, RichText};

    fn span(start: usize, end: usize) -> Match {
        Match {
            detector_id: "test".to_string(),
            source: DetectionSource::Pattern,
            entity_type: EntityType::Email,
            value: String::new(),
            start,
            end,
            priority: 0,
            reason: None,
        }
    }

    #[test]
    fn test_masks_spans_and_preserves_length() {
        let text = "call 1234 or email qwer";
        let masked = mask_text(text, &[span(5, 9), span(19, 23)], '*');
        assert_eq!(masked.text, "call **** or email ****");
        assert_eq!(masked.text.len(), text.len());
        assert!(masked.changed);
    }

    #[test]
    fn test_clamps_and_drops_invalid_spans() {
        let masked = mask_text("abc", &[span(2, 10), span(3, 3), span(2, 1)], '#');
        assert_eq!(masked.text, "ab#");

        let masked = mask_text("abc", &[span(5, 9)], '#');
        assert_eq!(masked.text, "abc");
        assert!(!masked.changed);
    }

    #[test]
    fn test_overlapping_spans_are_tolerated() {
        let masked = mask_text("abcdefgh", &[span(1, 5), span(2, 4), span(4, 7)], '*');
        assert_eq!(masked.text, "a******h");
    }

    #[test]
    fn test_only_masked_characters_change() {
        let text = "keep SECRET keep";
        let masked = mask_text(text, &[span(5, 11)], 'x');
        let differing = text
            .chars()
            .zip(masked.text.chars())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(differing, 6);
    }

    #[test]
    fn test_multibyte_characters_mask_one_for_one() {
        let text = "이름 김철수 끝";
        let start = text.find("김철수").unwrap();
        let end = start + "김철수".len();
        let masked = mask_text(text, &[span(start + 1, end)], '*');
        assert_eq!(masked.text, "이름 *** 끝");
        assert_eq!(masked.text.chars().count(), text.chars().count());
    }

    #[test]
    fn test_structured_mask_across_fragments() {
        let mut doc = RichText::new(vec![
            Node::block(vec![Node::text("mail jo"), Node::inline(vec![Node::text("hn@x.io now")])]),
            Node::block(vec![Node::text("second line")]),
        ]);
        let projection = project(&doc);
        let start = projection.plain_text.find("john@x.io").unwrap();
        let outcome = mask_structured(
            &mut doc,
            &[span(start, start + "john@x.io".len())],
            &projection.mappings,
            '*',
        );
        assert!(outcome.changed);
        assert_eq!(doc.fragments(), vec!["mail **", "******* now", "second line"]);
    }

    #[test]
    fn test_structured_mask_preserves_fragment_count() {
        let mut doc = RichText::new(vec![Node::text("a"), Node::text("bc"), Node::text("d")]);
        let projection = project(&doc);
        mask_structured(&mut doc, &[span(0, 4)], &projection.mappings, '*');
        assert_eq!(doc.fragments(), vec!["*", "**", "*"]);
        assert_eq!(doc.fragment_text(FragmentId(1)), Some("**"));
    }

    #[test]
    fn test_structured_mask_nested_spans_over_multibyte_text() {
        let mut doc = RichText::new(vec![Node::text("이름 김철수 끝"), Node::text("!")]);
        let projection = project(&doc);
        let text = &projection.plain_text;
        let inner = text.find("김철수").unwrap();
        let inner_end = inner + "김철수".len();
        let outer_end = text.find(" 끝").unwrap();

        let outcome = mask_structured(
            &mut doc,
            &[span(inner, inner_end), span(0, outer_end)],
            &projection.mappings,
            '*',
        );
        assert!(outcome.changed);
        assert_eq!(doc.fragments(), vec!["****** 끝", "!"]);
    }

    #[test]
    fn test_structured_mask_unchanged_when_already_masked() {
        let mut doc = RichText::new(vec![Node::text("***")]);
        let projection = project(&doc);
        let outcome = mask_structured(&mut doc, &[span(0, 3)], &projection.mappings, '*');
        assert!(!outcome.changed);
    }
}
