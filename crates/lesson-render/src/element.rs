//! Presentational element tree
//!
//! A small HTML-like tree handed to whatever UI layer displays a lesson.

use std::fmt;

/// Element kinds produced by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Paragraph,
    /// Always within 1..=6
    Heading(u8),
    OrderedList {
        start: Option<u32>,
    },
    UnorderedList,
    ListItem,
    Pre,
    Code,
    Blockquote,
    HorizontalRule,
    LineBreak,
    Strong,
    Emphasis,
    Strikethrough,
    Underline,
    Anchor {
        href: String,
        title: Option<String>,
    },
    Image {
        src: String,
        alt: String,
        title: Option<String>,
    },
    Table,
    TableRow,
    TableHeaderCell,
    TableCell,
}

impl Tag {
    /// HTML element name
    pub fn name(&self) -> &'static str {
        match self {
            Tag::Paragraph => "p",
            Tag::Heading(1) => "h1",
            Tag::Heading(2) => "h2",
            Tag::Heading(3) => "h3",
            Tag::Heading(4) => "h4",
            Tag::Heading(5) => "h5",
            Tag::Heading(_) => "h6",
            Tag::OrderedList { .. } => "ol",
            Tag::UnorderedList => "ul",
            Tag::ListItem => "li",
            Tag::Pre => "pre",
            Tag::Code => "code",
            Tag::Blockquote => "blockquote",
            Tag::HorizontalRule => "hr",
            Tag::LineBreak => "br",
            Tag::Strong => "strong",
            Tag::Emphasis => "em",
            Tag::Strikethrough => "del",
            Tag::Underline => "u",
            Tag::Anchor { .. } => "a",
            Tag::Image { .. } => "img",
            Tag::Table => "table",
            Tag::TableRow => "tr",
            Tag::TableHeaderCell => "th",
            Tag::TableCell => "td",
        }
    }

    /// Self-closing elements never have children
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            Tag::HorizontalRule | Tag::LineBreak | Tag::Image { .. }
        )
    }

    /// Attribute name/value pairs in output order
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        match self {
            Tag::OrderedList { start: Some(start) } if *start != 1 => {
                attrs.push(("start", start.to_string()));
            }
            Tag::Anchor { href, title } => {
                attrs.push(("href", href.clone()));
                if let Some(title) = title {
                    attrs.push(("title", title.clone()));
                }
            }
            Tag::Image { src, alt, title } => {
                attrs.push(("src", src.clone()));
                attrs.push(("alt", alt.clone()));
                if let Some(title) = title {
                    attrs.push(("title", title.clone()));
                }
            }
            _ => {}
        }
        attrs
    }
}

/// A rendered element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Text(String),
    Node { tag: Tag, children: Vec<Element> },
    /// Children without a wrapping element
    Fragment(Vec<Element>),
}

impl Element {
    pub fn text(s: impl Into<String>) -> Self {
        Element::Text(s.into())
    }

    pub fn node(tag: Tag, children: Vec<Element>) -> Self {
        Element::Node { tag, children }
    }

    pub fn void(tag: Tag) -> Self {
        Element::Node {
            tag,
            children: Vec::new(),
        }
    }

    /// The wrapping tag, if any
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Element::Node { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Element] {
        match self {
            Element::Text(_) => &[],
            Element::Node { children, .. } | Element::Fragment(children) => children,
        }
    }

    /// Concatenated text, ignoring all markup
    pub fn text_content(&self) -> String {
        match self {
            Element::Text(s) => s.clone(),
            other => other.children().iter().map(Element::text_content).collect(),
        }
    }

    /// Serialize to an HTML fragment
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        crate::html::write_html(self, &mut out);
        out
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}
