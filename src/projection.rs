//! Flattening of structured text sources.
//!
//! A structured source (a rich-text region) is a tree whose leaves are text
//! fragments. Detection runs on a flat string, so the tree is projected into
//! one plain string plus a mapping from each fragment to the byte range it
//! occupies in that string. Block boundaries and line breaks insert a single
//! `\n` that belongs to no fragment.
//!
//! Mappings are only valid for the exact source state they were computed
//! from. Re-project after every edit to the source.

use serde::{Deserialize, Serialize};

/// Opaque handle to one text fragment of a structured source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(pub usize);

/// One step of a document-order traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit<'a> {
    /// A text-bearing fragment
    Text { id: FragmentId, text: &'a str },
    /// Entering a block-level container (paragraph, list item, heading...)
    Block,
    /// An explicit line-break marker
    LineBreak,
}

/// A tree of text fragments that can be projected and masked in place
pub trait StructuredSource {
    /// Walk the source in document order
    fn visit(&self, visitor: &mut dyn FnMut(Visit<'_>));

    fn fragment_text(&self, id: FragmentId) -> Option<&str>;

    /// Replace a fragment's text. Returns false if `id` does not exist.
    fn set_fragment_text(&mut self, id: FragmentId, text: String) -> bool;
}

/// Where one fragment lands in the projected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMapping {
    pub fragment: FragmentId,
    pub start: usize,
    pub end: usize,
}

/// Plain text plus fragment mappings, in traversal order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub plain_text: String,
    pub mappings: Vec<FragmentMapping>,
}

impl Projection {
    /// Translate a span of the plain text back into fragment-local ranges
    pub fn fragments_for(&self, start: usize, end: usize) -> Vec<(FragmentId, usize, usize)> {
        self.mappings
            .iter()
            .filter_map(|m| {
                let from = start.max(m.start);
                let to = end.min(m.end);
                (from < to).then(|| (m.fragment, from - m.start, to - m.start))
            })
            .collect()
    }
}

/// Flatten `source` into plain text and fragment mappings. Never mutates it.
pub fn project<S: StructuredSource + ?Sized>(source: &S) -> Projection {
    let mut projection = Projection::default();

    source.visit(&mut |step| match step {
        Visit::Text { id, text } => {
            if text.is_empty() {
                return;
            }
            let start = projection.plain_text.len();
            projection.plain_text.push_str(text);
            projection.mappings.push(FragmentMapping {
                fragment: id,
                start,
                end: projection.plain_text.len(),
            });
        }
        Visit::Block | Visit::LineBreak => {
            let text = &projection.plain_text;
            if !text.is_empty() && !text.ends_with('\n') {
                projection.plain_text.push('\n');
            }
        }
    });

    projection
}

/// A node of an in-memory rich-text tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Text { text: String },
    Block { children: Vec<Node> },
    Inline { children: Vec<Node> },
    LineBreak,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    pub fn block(children: Vec<Node>) -> Self {
        Node::Block { children }
    }

    pub fn inline(children: Vec<Node>) -> Self {
        Node::Inline { children }
    }
}

/// In-memory structured source.
///
/// Fragment ids are pre-order indices of text nodes, including empty ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub children: Vec<Node>,
}

impl RichText {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Texts of every fragment in document order
    pub fn fragments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_texts(&self.children, &mut out);
        out
    }

    fn text_node_mut(&mut self, id: FragmentId) -> Option<&mut String> {
        let mut remaining = id.0;
        find_text_mut(&mut self.children, &mut remaining)
    }
}

fn collect_texts<'a>(nodes: &'a [Node], out: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Text { text } => out.push(text),
            Node::Block { children } | Node::Inline { children } => collect_texts(children, out),
            Node::LineBreak => {}
        }
    }
}

fn find_text_mut<'a>(nodes: &'a mut [Node], remaining: &mut usize) -> Option<&'a mut String> {
    for node in nodes {
        match node {
            Node::Text { text } => {
                if *remaining == 0 {
                    return Some(text);
                }
                *remaining -= 1;
            }
            Node::Block { children } | Node::Inline { children } => {
                if let Some(found) = find_text_mut(children, remaining) {
                    return Some(found);
                }
            }
            Node::LineBreak => {}
        }
    }
    None
}

fn visit_nodes(nodes: &[Node], next_id: &mut usize, visitor: &mut dyn FnMut(Visit<'_>)) {
    for node in nodes {
        match node {
            Node::Text { text } => {
                let id = FragmentId(*next_id);
                *next_id += 1;
                visitor(Visit::Text { id, text });
            }
            Node::Block { children } => {
                visitor(Visit::Block);
                visit_nodes(children, next_id, visitor);
            }
            Node::Inline { children } => visit_nodes(children, next_id, visitor),
            Node::LineBreak => visitor(Visit::LineBreak),
        }
    }
}

impl StructuredSource for RichText {
    fn visit(&self, visitor: &mut dyn FnMut(Visit<'_>)) {
        let mut next_id = 0;
        visit_nodes(&self.children, &mut next_id, visitor);
    }

    fn fragment_text(&self, id: FragmentId) -> Option<&str> {
        self.fragments().get(id.0).copied()
    }

    fn set_fragment_text(&mut self, id: FragmentId, text: String) -> bool {
        match self.text_node_mut(id) {
            Some(slot) => {
                *slot = text;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_fragments_concatenate_without_gaps() {
        let doc = RichText::new(vec![
            Node::text("Hello "),
            Node::inline(vec![Node::text("wor"), Node::text("ld")]),
            Node::text("!"),
        ]);
        let projection = project(&doc);
        assert_eq!(projection.plain_text, "Hello world!");

        let mut cursor = 0;
        for mapping in &projection.mappings {
            assert_eq!(mapping.start, cursor);
            cursor = mapping.end;
        }
        assert_eq!(cursor, projection.plain_text.len());
    }

    #[test]
    fn test_blocks_insert_single_newline() {
        let doc = RichText::new(vec![
            Node::block(vec![Node::text("first")]),
            Node::block(vec![Node::block(vec![Node::text("second")])]),
            Node::LineBreak,
            Node::text("third"),
        ]);
        let projection = project(&doc);
        assert_eq!(projection.plain_text, "first\nsecond\nthird");
        assert_eq!(projection.mappings[1].start, 6);
        assert_eq!(projection.mappings[2].start, 13);
        assert_eq!(projection.mappings[0].end, 5);
    }

    #[test]
    fn test_leading_block_adds_no_newline() {
        let doc = RichText::new(vec![Node::block(vec![Node::text("only")])]);
        assert_eq!(project(&doc).plain_text, "only");
    }

    #[test]
    fn test_empty_fragments_keep_ids_but_have_no_mapping() {
        let doc = RichText::new(vec![Node::text(""), Node::text("abc")]);
        let projection = project(&doc);
        assert_eq!(projection.mappings.len(), 1);
        assert_eq!(projection.mappings[0].fragment, FragmentId(1));
    }

    #[test]
    fn test_empty_source() {
        let projection = project(&RichText::default());
        assert!(projection.plain_text.is_empty());
        assert!(projection.mappings.is_empty());
    }

    #[test]
    fn test_fragments_for_translates_to_local_ranges() {
        let doc = RichText::new(vec![Node::text("ab"), Node::text("cdef")]);
        let projection = project(&doc);
        assert_eq!(
            projection.fragments_for(1, 4),
            vec![(FragmentId(0), 1, 2), (FragmentId(1), 0, 2)]
        );
    }

    #[test]
    fn test_set_fragment_text() {
        let mut doc = RichText::new(vec![Node::block(vec![Node::text("a"), Node::text("b")])]);
        assert!(doc.set_fragment_text(FragmentId(1), "B".to_string()));
        assert!(!doc.set_fragment_text(FragmentId(5), "x".to_string()));
        assert_eq!(doc.fragments(), vec!["a", "B"]);
        assert_eq!(doc.fragment_text(FragmentId(1)), Some("B"));
    }
}
