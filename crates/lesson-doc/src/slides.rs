//! Slide pagination
//!
//! A lesson is split into slides at paragraphs whose text contains
//! [`SLIDE_MARKER`]. Marker paragraphs themselves belong to no slide, and
//! empty slides are dropped.

use crate::ast::{Document, Node};
use crate::json::nodes_to_value;
use serde::{Serialize, Serializer};

/// Sentinel the editor inserts to start a new slide
pub const SLIDE_MARKER: &str = "<!-- Slide -->";

/// A page of top-level nodes borrowed from a document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Slide<'a> {
    pub nodes: Vec<&'a Node>,
}

impl<'a> Slide<'a> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Node> + '_ {
        self.nodes.iter().copied()
    }
}

impl Serialize for Slide<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        nodes_to_value(self.iter()).serialize(serializer)
    }
}

/// Whether `node` is a paragraph with a direct text child containing the marker
pub fn is_slide_marker(node: &Node) -> bool {
    match node {
        Node::Paragraph(p) => p
            .content
            .iter()
            .any(|child| matches!(child, Node::Text(t) if t.text.contains(SLIDE_MARKER))),
        _ => false,
    }
}

/// Partition top-level nodes into non-empty slides, preserving order
pub fn split_slides(nodes: &[Node]) -> Vec<Slide<'_>> {
    let mut slides = vec![Slide::default()];

    for node in nodes {
        if is_slide_marker(node) {
            slides.push(Slide::default());
        } else if let Some(current) = slides.last_mut() {
            current.nodes.push(node);
        }
    }

    slides.retain(|s| !s.is_empty());
    log::debug!("split {} nodes into {} slides", nodes.len(), slides.len());
    slides
}

impl Document {
    /// Slides of this document; empty when the document has no content
    pub fn slides(&self) -> Vec<Slide<'_>> {
        split_slides(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Node {
        Node::paragraph(vec![Node::text(text)])
    }

    fn marker() -> Node {
        p(SLIDE_MARKER)
    }

    fn texts(slides: &[Slide<'_>]) -> Vec<Vec<String>> {
        slides
            .iter()
            .map(|s| s.iter().map(|n| crate::ast::plain_text(std::slice::from_ref(n))).collect())
            .collect()
    }

    #[test]
    fn test_no_markers_single_slide() {
        let nodes = vec![p("A"), Node::heading(2, vec![Node::text("B")]), p("C")];
        let slides = split_slides(&nodes);
        assert_eq!(slides.len(), 1);
        let expected: Vec<&Node> = nodes.iter().collect();
        assert_eq!(slides[0].nodes, expected);
    }

    #[test]
    fn test_empty_document_no_slides() {
        assert!(split_slides(&[]).is_empty());
        assert!(Document::empty().slides().is_empty());
    }

    #[test]
    fn test_leading_marker() {
        let nodes = vec![marker(), p("A")];
        assert_eq!(texts(&split_slides(&nodes)), vec![vec!["A"]]);
    }

    #[test]
    fn test_three_slides() {
        let nodes = vec![p("A"), marker(), p("B"), marker(), p("C")];
        assert_eq!(
            texts(&split_slides(&nodes)),
            vec![vec!["A"], vec!["B"], vec!["C"]]
        );
    }

    #[test]
    fn test_consecutive_and_trailing_markers() {
        let nodes = vec![p("A"), marker(), marker(), marker(), p("B"), marker()];
        assert_eq!(texts(&split_slides(&nodes)), vec![vec!["A"], vec!["B"]]);
    }

    #[test]
    fn test_only_markers() {
        let nodes = vec![marker(), marker()];
        assert!(split_slides(&nodes).is_empty());
    }

    #[test]
    fn test_marker_with_surrounding_text() {
        let nodes = vec![p("A"), p("next <!-- Slide --> please"), p("B")];
        assert_eq!(texts(&split_slides(&nodes)), vec![vec!["A"], vec!["B"]]);
    }

    #[test]
    fn test_marker_must_be_direct_text_child_of_paragraph() {
        // Headings and nested paragraphs never split
        let nodes = vec![
            p("A"),
            Node::heading(1, vec![Node::text(SLIDE_MARKER)]),
            Node::blockquote(vec![marker()]),
            p("B"),
        ];
        let slides = split_slides(&nodes);
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].len(), 4);
    }

    #[test]
    fn test_marker_split_across_text_nodes_does_not_match() {
        let node = Node::paragraph(vec![Node::text("<!-- Sli"), Node::text("de -->")]);
        assert!(!is_slide_marker(&node));
    }

    #[test]
    fn test_slides_concatenate_to_non_marker_nodes() {
        let nodes = vec![
            marker(),
            p("1"),
            p("2"),
            marker(),
            Node::horizontal_rule(),
            marker(),
            marker(),
            p("3"),
        ];
        let flattened: Vec<&Node> = split_slides(&nodes)
            .iter()
            .flat_map(|s| s.nodes.clone())
            .collect();
        let expected: Vec<&Node> = nodes.iter().filter(|n| !is_slide_marker(n)).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_slide_serializes_as_node_array() {
        let nodes = vec![p("A")];
        let slides = split_slides(&nodes);
        assert_eq!(
            serde_json::to_value(&slides).unwrap(),
            serde_json::json!([[{"type": "paragraph", "content": [{"type": "text", "text": "A"}]}]])
        );
    }
}
