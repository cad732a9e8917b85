//! Text normalization ahead of matching.
//!
//! Normalization can change byte lengths (a no-break space is two bytes, its
//! replacement one; a fullwidth digit is three bytes, its replacement one), so
//! [`NormalizedText`] keeps enough of the source layout to translate spans in
//! the normalized string back to spans in the caller's string.

use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::UnicodeNormalization;

/// A run of the normalized string and the source run it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    norm_start: usize,
    norm_end: usize,
    orig_start: usize,
    orig_end: usize,
    /// Normalization left this run untouched, so offsets map one to one
    identical: bool,
}

/// Normalized text plus a map back to the source offsets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    segments: Vec<Segment>,
    original_len: usize,
}

impl NormalizedText {
    /// Normalize `source`.
    ///
    /// Each starter character is normalized together with the combining marks
    /// that follow it, so every output run can be traced to one source run.
    pub fn new(source: &str) -> Self {
        let mut normalized = Self {
            text: String::with_capacity(source.len()),
            segments: Vec::new(),
            original_len: source.len(),
        };

        let mut chars = source.char_indices().peekable();
        while let Some((start, _)) = chars.next() {
            let end = loop {
                match chars.peek() {
                    Some(&(i, c)) if canonical_combining_class(c) == 0 => break i,
                    Some(_) => {
                        chars.next();
                    }
                    None => break source.len(),
                }
            };
            normalized.push_cluster(&source[start..end], start, end);
        }

        normalized
    }

    fn push_cluster(&mut self, cluster: &str, orig_start: usize, orig_end: usize) {
        let norm_start = self.text.len();
        self.text.extend(cluster.nfkc().map(fold_lookalike));
        let norm_end = self.text.len();
        let identical = &self.text[norm_start..] == cluster;

        if let Some(last) = self.segments.last_mut() {
            if identical && last.identical {
                last.norm_end = norm_end;
                last.orig_end = orig_end;
                return;
            }
        }
        self.segments.push(Segment {
            norm_start,
            norm_end,
            orig_start,
            orig_end,
            identical,
        });
    }

    /// Whether normalization changed nothing
    pub fn is_unchanged(&self) -> bool {
        self.segments.iter().all(|s| s.identical)
    }

    /// Translate a half-open span of [`Self::text`] into the source string.
    ///
    /// Ends that fall inside a rewritten run widen to cover the whole run.
    pub fn to_original(&self, start: usize, end: usize) -> (usize, usize) {
        let start = match self.segments.iter().find(|s| start < s.norm_end) {
            Some(s) if s.identical => s.orig_start + start.saturating_sub(s.norm_start),
            Some(s) => s.orig_start,
            None => self.original_len,
        };
        let end = match self.segments.iter().find(|s| end <= s.norm_end && end > s.norm_start) {
            Some(s) if s.identical => s.orig_start + (end - s.norm_start),
            Some(s) => s.orig_end,
            None if end == 0 => 0,
            None => self.original_len,
        };
        (start, end.max(start))
    }
}

fn fold_lookalike(c: char) -> char {
    match c {
        '\u{00A0}' | '\u{2000}'..='\u{200B}' | '\u{202F}' | '\u{205F}' => ' ',
        '\u{FF0B}' | '\u{FE62}' => '+',
        '\u{2010}' | '\u{2012}'..='\u{2014}' | '\u{FE63}' => '-',
        other => other,
    }
}

/// Normalize text before pattern matching.
///
/// Applies NFKC, turns exotic spaces into plain spaces and maps look-alike
/// plus and minus signs to ASCII. Idempotent; never trims.
pub fn normalize_text(text: &str) -> String {
    NormalizedText::new(text).text
}
