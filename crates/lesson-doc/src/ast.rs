//! Lesson document tree
//!
//! The shape follows the ProseMirror JSON produced by the ProseKit basic
//! schema: a `doc` root holding block nodes, text leaves carrying marks.
//! Attributes are typed per node kind instead of an open mapping.

use serde_json::{Map, Value};

/// Heading level used when a heading carries no `level` attribute
pub const DEFAULT_HEADING_LEVEL: u64 = 1;

/// Root of a lesson document (`type: "doc"`)
///
/// Only constructed through the validating constructors in [`crate::parser`],
/// so every consumer may assume the nesting rules and depth bound hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub(crate) content: Vec<Node>,
}

impl Document {
    /// A document with no top-level nodes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Top-level block nodes in document order
    pub fn content(&self) -> &[Node] {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> Vec<Node> {
        self.content
    }
}

/// A document node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Block nodes
    Paragraph(Paragraph),
    Heading(Heading),
    /// ProseKit's generic list, ordered or not depending on `kind`
    List(List),
    BulletList(List),
    OrderedList(List),
    ListItem(ListItem),
    CodeBlock(CodeBlock),
    Blockquote(Blockquote),
    HorizontalRule(HorizontalRule),
    Table(Table),
    TableRow(TableRow),
    TableCell(TableCell),

    // Inline nodes
    Text(Text),
    HardBreak,
    /// Block or inline, depending on the schema that produced it
    Image(Image),

    /// Any type this crate does not know; children are kept
    Unknown(Unknown),
}

/// Paragraph node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub content: Vec<Node>,
}

/// Heading node
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    /// Level as stored; see [`Heading::effective_level`]
    pub level: u64,
    pub content: Vec<Node>,
}

impl Heading {
    /// Level clamped into 1..=6; anything out of range renders as 6
    pub fn effective_level(&self) -> u8 {
        if (1..=6).contains(&self.level) {
            self.level as u8
        } else {
            6
        }
    }
}

/// Kind of a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Ordered,
    /// e.g. ProseKit's `task` and `toggle`; rendered as bullets
    Other(String),
}

impl ListKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "bullet" => ListKind::Bullet,
            "ordered" => ListKind::Ordered,
            other => ListKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ListKind::Bullet => "bullet",
            ListKind::Ordered => "ordered",
            ListKind::Other(s) => s.as_str(),
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, ListKind::Ordered)
    }
}

/// List node (`list`, `bulletList` or `orderedList`)
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub kind: ListKind,
    /// First number of an ordered list
    pub start: Option<u32>,
    pub content: Vec<Node>,
}

impl List {
    /// First item number, defaulting to 1
    pub fn first_number(&self) -> u32 {
        self.start.unwrap_or(1)
    }
}

/// List item node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListItem {
    pub content: Vec<Node>,
}

/// Code block node; children are plain text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub content: Vec<Node>,
}

impl CodeBlock {
    /// Literal text of the block, marks ignored
    pub fn text(&self) -> String {
        plain_text(&self.content)
    }
}

/// Blockquote node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blockquote {
    pub content: Vec<Node>,
}

/// Horizontal rule
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HorizontalRule {
    /// Markdown markup the rule was written with, if known
    pub markup: Option<String>,
}

/// Table node; children are rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub content: Vec<Node>,
}

/// Table row; children are cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    pub content: Vec<Node>,
}

/// Table cell (`tableCell`, or `tableHeaderCell` when `header` is set)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableCell {
    pub header: bool,
    pub content: Vec<Node>,
}

/// Text leaf
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    /// Outermost mark first
    pub marks: Vec<Mark>,
}

impl Text {
    /// Marks in wrapping order, outermost first, with `code` moved innermost
    ///
    /// Inline code cannot contain other formatting, so renderers and writers
    /// both open it last.
    pub fn nesting_marks(&self) -> Vec<&Mark> {
        let (code, mut rest): (Vec<&Mark>, Vec<&Mark>) =
            self.marks.iter().partition(|m| matches!(m, Mark::Code));
        rest.extend(code);
        rest
    }
}

/// Image node
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub src: String,
    pub alt: String,
    pub title: Option<String>,
}

/// Node of a type outside the known schema
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    pub type_name: String,
    pub attrs: Map<String, Value>,
    pub content: Vec<Node>,
}

/// Inline style annotation on a text node
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    Bold,
    Italic,
    /// `strike` or `strikethrough`
    Strike,
    Underline,
    Code,
    Link(Link),
    Unknown {
        name: String,
        attrs: Map<String, Value>,
    },
}

impl Mark {
    /// Schema name of the mark
    pub fn name(&self) -> &str {
        match self {
            Mark::Bold => "bold",
            Mark::Italic => "italic",
            Mark::Strike => "strike",
            Mark::Underline => "underline",
            Mark::Code => "code",
            Mark::Link(_) => "link",
            Mark::Unknown { name, .. } => name.as_str(),
        }
    }
}

/// Link mark attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub href: String,
    pub title: Option<String>,
}

impl Node {
    /// Schema type name, as it appears in the `type` field
    pub fn type_name(&self) -> &str {
        match self {
            Node::Paragraph(_) => "paragraph",
            Node::Heading(_) => "heading",
            Node::List(_) => "list",
            Node::BulletList(_) => "bulletList",
            Node::OrderedList(_) => "orderedList",
            Node::ListItem(_) => "listItem",
            Node::CodeBlock(_) => "codeBlock",
            Node::Blockquote(_) => "blockquote",
            Node::HorizontalRule(_) => "horizontalRule",
            Node::Table(_) => "table",
            Node::TableRow(_) => "tableRow",
            Node::TableCell(c) if c.header => "tableHeaderCell",
            Node::TableCell(_) => "tableCell",
            Node::Text(_) => "text",
            Node::HardBreak => "hardBreak",
            Node::Image(_) => "image",
            Node::Unknown(u) => u.type_name.as_str(),
        }
    }

    /// Child nodes; empty for leaves
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Paragraph(p) => &p.content,
            Node::Heading(h) => &h.content,
            Node::List(l) | Node::BulletList(l) | Node::OrderedList(l) => &l.content,
            Node::ListItem(li) => &li.content,
            Node::CodeBlock(c) => &c.content,
            Node::Blockquote(b) => &b.content,
            Node::Table(t) => &t.content,
            Node::TableRow(r) => &r.content,
            Node::TableCell(c) => &c.content,
            Node::Unknown(u) => &u.content,
            Node::Text(_) | Node::HardBreak | Node::HorizontalRule(_) | Node::Image(_) => &[],
        }
    }

    /// Whether the node flows inside a paragraph
    pub fn is_inline(&self) -> bool {
        matches!(self, Node::Text(_) | Node::HardBreak)
    }

    /// The list payload of any of the three list node types
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Node::List(l) | Node::BulletList(l) | Node::OrderedList(l) => Some(l),
            _ => None,
        }
    }
}

/// Concatenated text of all text leaves below `nodes`
pub fn plain_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.text),
            Node::HardBreak => out.push('\n'),
            other => collect_text(other.children(), out),
        }
    }
}

// Convenience constructors
impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(Text {
            text: s.into(),
            marks: Vec::new(),
        })
    }

    pub fn marked_text(s: impl Into<String>, marks: Vec<Mark>) -> Self {
        Node::Text(Text {
            text: s.into(),
            marks,
        })
    }

    pub fn paragraph(content: Vec<Node>) -> Self {
        Node::Paragraph(Paragraph { content })
    }

    pub fn heading(level: u64, content: Vec<Node>) -> Self {
        Node::Heading(Heading { level, content })
    }

    pub fn list(kind: ListKind, content: Vec<Node>) -> Self {
        Node::List(List {
            kind,
            start: None,
            content,
        })
    }

    pub fn ordered_list_from(start: u32, content: Vec<Node>) -> Self {
        Node::List(List {
            kind: ListKind::Ordered,
            start: Some(start),
            content,
        })
    }

    pub fn bullet_list(content: Vec<Node>) -> Self {
        Node::BulletList(List {
            kind: ListKind::Bullet,
            start: None,
            content,
        })
    }

    pub fn ordered_list(start: Option<u32>, content: Vec<Node>) -> Self {
        Node::OrderedList(List {
            kind: ListKind::Ordered,
            start,
            content,
        })
    }

    pub fn list_item(content: Vec<Node>) -> Self {
        Node::ListItem(ListItem { content })
    }

    pub fn code_block(language: Option<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        let content = if code.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(code)]
        };
        Node::CodeBlock(CodeBlock { language, content })
    }

    pub fn blockquote(content: Vec<Node>) -> Self {
        Node::Blockquote(Blockquote { content })
    }

    pub fn horizontal_rule() -> Self {
        Node::HorizontalRule(HorizontalRule::default())
    }

    pub fn hard_break() -> Self {
        Node::HardBreak
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Node::Image(Image {
            src: src.into(),
            alt: alt.into(),
            title: None,
        })
    }

    pub fn image_with_title(
        src: impl Into<String>,
        alt: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Node::Image(Image {
            src: src.into(),
            alt: alt.into(),
            title: Some(title.into()),
        })
    }

    pub fn table(content: Vec<Node>) -> Self {
        Node::Table(Table { content })
    }

    pub fn table_row(content: Vec<Node>) -> Self {
        Node::TableRow(TableRow { content })
    }

    pub fn table_cell(content: Vec<Node>) -> Self {
        Node::TableCell(TableCell {
            header: false,
            content,
        })
    }

    pub fn table_header_cell(content: Vec<Node>) -> Self {
        Node::TableCell(TableCell {
            header: true,
            content,
        })
    }

    pub fn unknown(type_name: impl Into<String>, content: Vec<Node>) -> Self {
        Node::Unknown(Unknown {
            type_name: type_name.into(),
            attrs: Map::new(),
            content,
        })
    }
}

impl Mark {
    pub fn link(href: impl Into<String>) -> Self {
        Mark::Link(Link {
            href: href.into(),
            title: None,
        })
    }

    pub fn link_with_title(href: impl Into<String>, title: impl Into<String>) -> Self {
        Mark::Link(Link {
            href: href.into(),
            title: Some(title.into()),
        })
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Mark::Unknown {
            name: name.into(),
            attrs: Map::new(),
        }
    }
}
