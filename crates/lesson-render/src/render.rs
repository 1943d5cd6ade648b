//! Lesson document to element tree
//!
//! Pure recursive conversion: every node maps to one element, unknown node
//! types keep their children without a wrapper, unknown marks wrap nothing.

use crate::element::{Element, Tag};
use lesson_doc::{Document, List, Mark, Node, Slide, TableCell, Text};

/// Render a whole document as a fragment of top-level elements
pub fn render_document(doc: &Document) -> Element {
    Element::Fragment(render_nodes(doc.content()))
}

/// Render the nodes of one slide as a fragment
pub fn render_slide(slide: &Slide<'_>) -> Element {
    Element::Fragment(render_nodes(slide.iter()))
}

fn render_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Vec<Element> {
    nodes.into_iter().map(render_node).collect()
}

fn render_node(node: &Node) -> Element {
    match node {
        Node::Text(t) => render_text(t),
        Node::Paragraph(p) => Element::node(Tag::Paragraph, render_nodes(&p.content)),
        Node::Heading(h) => Element::node(
            Tag::Heading(h.effective_level()),
            render_nodes(&h.content),
        ),
        Node::List(l) | Node::BulletList(l) | Node::OrderedList(l) => render_list(l),
        // Outside a list an item is just its children
        Node::ListItem(li) => Element::Fragment(render_nodes(&li.content)),
        Node::CodeBlock(c) => {
            let text = c.text();
            let code = if text.is_empty() {
                Vec::new()
            } else {
                vec![Element::Text(text)]
            };
            Element::node(Tag::Pre, vec![Element::node(Tag::Code, code)])
        }
        Node::Blockquote(b) => Element::node(Tag::Blockquote, render_nodes(&b.content)),
        Node::HorizontalRule(_) => Element::void(Tag::HorizontalRule),
        Node::HardBreak => Element::void(Tag::LineBreak),
        Node::Image(img) => Element::void(Tag::Image {
            src: img.src.clone(),
            alt: img.alt.clone(),
            title: img.title.clone(),
        }),
        Node::Table(t) => Element::node(Tag::Table, render_nodes(&t.content)),
        Node::TableRow(r) => Element::node(Tag::TableRow, render_nodes(&r.content)),
        Node::TableCell(TableCell { header, content }) => {
            let tag = if *header {
                Tag::TableHeaderCell
            } else {
                Tag::TableCell
            };
            Element::node(tag, render_nodes(content))
        }
        Node::Unknown(u) => {
            log::trace!("rendering children of unknown node `{}`", u.type_name);
            Element::Fragment(render_nodes(&u.content))
        }
    }
}

fn render_list(list: &List) -> Element {
    let tag = if list.kind.is_ordered() {
        Tag::OrderedList { start: list.start }
    } else {
        Tag::UnorderedList
    };
    let items = list
        .content
        .iter()
        .map(|child| {
            let children = match child {
                // Hoisted so items don't nest a block inside the <li>
                Node::Paragraph(p) => render_nodes(&p.content),
                Node::ListItem(li) => render_item_content(&li.content),
                other => vec![render_node(other)],
            };
            Element::node(Tag::ListItem, children)
        })
        .collect();
    Element::node(tag, items)
}

/// A list item's leading paragraph is hoisted; the rest render as blocks
fn render_item_content(content: &[Node]) -> Vec<Element> {
    let mut out = Vec::new();
    for (i, node) in content.iter().enumerate() {
        match node {
            Node::Paragraph(p) if i == 0 => out.extend(render_nodes(&p.content)),
            other => out.push(render_node(other)),
        }
    }
    out
}

/// Wrap the text in its marks; the first mark ends up outermost and `code`
/// innermost, matching the Markdown writer
fn render_text(text: &Text) -> Element {
    let mut element = Element::Text(text.text.clone());
    for mark in text.nesting_marks().into_iter().rev() {
        let tag = match mark {
            Mark::Bold => Tag::Strong,
            Mark::Italic => Tag::Emphasis,
            Mark::Strike => Tag::Strikethrough,
            Mark::Underline => Tag::Underline,
            Mark::Code => Tag::Code,
            Mark::Link(link) => Tag::Anchor {
                href: link.href.clone(),
                title: link.title.clone(),
            },
            Mark::Unknown { .. } => continue,
        };
        element = Element::node(tag, vec![element]);
    }
    element
}
