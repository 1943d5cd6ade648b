//! Stored document parser
//!
//! Maps ProseMirror-style JSON into the typed tree in [`crate::ast`] and
//! enforces the nesting rules and depth bound every consumer relies on.

use crate::ast::{
    Blockquote, CodeBlock, DEFAULT_HEADING_LEVEL, Document, Heading, HorizontalRule, Image, Link,
    List, ListItem, ListKind, Mark, Node, Paragraph, Table, TableCell, TableRow, Text, Unknown,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum nesting depth accepted by default (the root is depth 0)
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Document construction errors
#[derive(Debug, Error)]
pub enum DocError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON object at {path}")]
    NotAnObject { path: String },

    #[error("Node at {path} has no `type`")]
    MissingType { path: String },

    #[error("Node `type` at {path} is not a string")]
    TypeNotString { path: String },

    #[error("Expected a \"doc\" root node, found \"{found}\"")]
    RootNotDoc { found: String },

    #[error("Text node at {path} has no string `text`")]
    TextNotString { path: String },

    #[error("Text node at {path} must not have `content`")]
    TextWithContent { path: String },

    #[error("`{node}` node at {path} must not have children")]
    UnexpectedContent { path: String, node: String },

    #[error("`content` at {path} is not an array")]
    ContentNotArray { path: String },

    #[error("`marks` at {path} is not an array")]
    MarksNotArray { path: String },

    #[error("`attrs` at {path} is not an object")]
    AttrsNotObject { path: String },

    #[error("Mark at {path} has no string `type`")]
    MarkMissingType { path: String },

    #[error("`{node}` at {path} is missing required attribute `{attr}`")]
    MissingAttr {
        path: String,
        node: String,
        attr: &'static str,
    },

    #[error("`{node}` at {path} has invalid attribute `{attr}`: expected {expected}")]
    InvalidAttr {
        path: String,
        node: String,
        attr: &'static str,
        expected: &'static str,
    },

    #[error("`{child}` is not allowed inside `{parent}` at {path}")]
    InvalidNesting {
        path: String,
        parent: String,
        child: String,
    },

    #[error("Document nesting exceeds the maximum depth of {max_depth} at {path}")]
    TooDeep { path: String, max_depth: usize },
}

/// Result type for document construction
pub type DocResult<T> = Result<T, DocError>;

/// Limits applied while constructing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest allowed node; top-level blocks sit at depth 1
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Document {
    /// Build a document from top-level nodes, enforcing nesting rules
    pub fn try_new(content: Vec<Node>) -> DocResult<Self> {
        Self::try_new_with(content, &ParseOptions::default())
    }

    pub fn try_new_with(content: Vec<Node>, options: &ParseOptions) -> DocResult<Self> {
        let doc = Document { content };
        validate(&doc, options)?;
        Ok(doc)
    }

    /// Parse a stored JSON document
    pub fn from_json(json: &str) -> DocResult<Self> {
        Self::from_json_with(json, &ParseOptions::default())
    }

    pub fn from_json_with(json: &str, options: &ParseOptions) -> DocResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value_with(&value, options)
    }

    /// Parse an already deserialized JSON document
    pub fn from_value(value: &Value) -> DocResult<Self> {
        Self::from_value_with(value, &ParseOptions::default())
    }

    pub fn from_value_with(value: &Value, options: &ParseOptions) -> DocResult<Self> {
        let path = "";
        let obj = value.as_object().ok_or_else(|| DocError::NotAnObject {
            path: display_path(path),
        })?;
        let type_name = node_type(obj, path)?;
        if type_name != "doc" {
            return Err(DocError::RootNotDoc {
                found: type_name.to_string(),
            });
        }
        let content = parse_content(obj, path, options.max_depth, 1)?;
        log::trace!("parsed document with {} top-level nodes", content.len());
        Self::try_new_with(content, options)
    }
}

/// Check nesting rules and the depth bound of a whole document
pub fn validate(doc: &Document, options: &ParseOptions) -> DocResult<()> {
    validate_children(Rule::Blocks, "doc", &doc.content, "", 1, options.max_depth)
}

/// What a container node accepts as children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Blocks,
    Inline,
    CodeText,
    Rows,
    Cells,
    Any,
    Leaf,
}

fn rule_for(node: &Node) -> Rule {
    match node {
        Node::Paragraph(_) | Node::Heading(_) => Rule::Inline,
        Node::CodeBlock(_) => Rule::CodeText,
        Node::Table(_) => Rule::Rows,
        Node::TableRow(_) => Rule::Cells,
        Node::List(_)
        | Node::BulletList(_)
        | Node::OrderedList(_)
        | Node::ListItem(_)
        | Node::Blockquote(_)
        | Node::TableCell(_) => Rule::Blocks,
        Node::Unknown(_) => Rule::Any,
        Node::Text(_) | Node::HardBreak | Node::HorizontalRule(_) | Node::Image(_) => Rule::Leaf,
    }
}

fn allows(rule: Rule, child: &Node) -> bool {
    if matches!(child, Node::Unknown(_)) {
        return rule != Rule::Leaf && rule != Rule::CodeText;
    }
    match rule {
        Rule::Blocks => !child.is_inline() && !matches!(child, Node::TableRow(_) | Node::TableCell(_)),
        Rule::Inline => child.is_inline() || matches!(child, Node::Image(_)),
        Rule::CodeText => matches!(child, Node::Text(_)),
        Rule::Rows => matches!(child, Node::TableRow(_)),
        Rule::Cells => matches!(child, Node::TableCell(_)),
        Rule::Any => true,
        Rule::Leaf => false,
    }
}

fn validate_children(
    rule: Rule,
    parent: &str,
    children: &[Node],
    path: &str,
    depth: usize,
    max_depth: usize,
) -> DocResult<()> {
    for (i, child) in children.iter().enumerate() {
        let child_path = content_path(path, i);
        if depth > max_depth {
            return Err(DocError::TooDeep {
                path: child_path,
                max_depth,
            });
        }
        if !allows(rule, child) {
            return Err(DocError::InvalidNesting {
                path: child_path,
                parent: parent.to_string(),
                child: child.type_name().to_string(),
            });
        }
        validate_children(
            rule_for(child),
            child.type_name(),
            child.children(),
            &child_path,
            depth + 1,
            max_depth,
        )?;
    }
    Ok(())
}

fn parse_node(value: &Value, path: &str, max_depth: usize, depth: usize) -> DocResult<Node> {
    if depth > max_depth {
        return Err(DocError::TooDeep {
            path: display_path(path),
            max_depth,
        });
    }
    let obj = value.as_object().ok_or_else(|| DocError::NotAnObject {
        path: display_path(path),
    })?;
    let type_name = node_type(obj, path)?;
    let attrs = attrs_of(obj, path)?;

    if type_name == "text" {
        return parse_text(obj, path);
    }

    let content = parse_content(obj, path, max_depth, depth + 1)?;
    let attr_ctx = AttrCtx {
        attrs,
        node: type_name,
        path,
    };

    let node = match type_name {
        "paragraph" => Node::Paragraph(Paragraph { content }),
        "heading" => {
            let level = attr_ctx
                .uint("level")?
                .unwrap_or(DEFAULT_HEADING_LEVEL);
            Node::Heading(Heading { level, content })
        }
        "list" => {
            let kind = attr_ctx
                .string("kind")?
                .map(|k| ListKind::parse(&k))
                .unwrap_or(ListKind::Bullet);
            Node::List(List {
                kind,
                start: attr_ctx.list_start()?,
                content,
            })
        }
        "bulletList" => Node::BulletList(List {
            kind: ListKind::Bullet,
            start: None,
            content,
        }),
        "orderedList" => Node::OrderedList(List {
            kind: ListKind::Ordered,
            start: attr_ctx.list_start()?,
            content,
        }),
        "listItem" => Node::ListItem(ListItem { content }),
        "codeBlock" => {
            let language = match attr_ctx.string("language")? {
                Some(lang) => Some(lang),
                None => attr_ctx.string("params")?,
            }
            .filter(|lang| !lang.is_empty());
            Node::CodeBlock(CodeBlock { language, content })
        }
        "blockquote" => Node::Blockquote(Blockquote { content }),
        "horizontalRule" => {
            leaf(type_name, &content, path)?;
            Node::HorizontalRule(HorizontalRule {
                markup: attr_ctx.string("markup")?,
            })
        }
        "hardBreak" => {
            leaf(type_name, &content, path)?;
            Node::HardBreak
        }
        "image" => {
            leaf(type_name, &content, path)?;
            let src = attr_ctx.string("src")?.ok_or_else(|| DocError::MissingAttr {
                path: display_path(path),
                node: type_name.to_string(),
                attr: "src",
            })?;
            Node::Image(Image {
                src,
                alt: attr_ctx.string("alt")?.unwrap_or_default(),
                title: attr_ctx.string("title")?.filter(|t| !t.is_empty()),
            })
        }
        "table" => Node::Table(Table { content }),
        "tableRow" => Node::TableRow(TableRow { content }),
        "tableCell" => Node::TableCell(TableCell {
            header: false,
            content,
        }),
        "tableHeaderCell" => Node::TableCell(TableCell {
            header: true,
            content,
        }),
        other => {
            log::debug!("keeping unknown node type `{}` at {}", other, display_path(path));
            Node::Unknown(Unknown {
                type_name: other.to_string(),
                attrs: attrs.cloned().unwrap_or_default(),
                content,
            })
        }
    };
    Ok(node)
}

fn parse_text(obj: &Map<String, Value>, path: &str) -> DocResult<Node> {
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| DocError::TextNotString {
            path: display_path(path),
        })?;
    if obj.get("content").is_some_and(|c| !c.is_null()) {
        return Err(DocError::TextWithContent {
            path: display_path(path),
        });
    }
    let marks = parse_marks(obj, path)?;
    Ok(Node::Text(Text {
        text: text.to_string(),
        marks,
    }))
}

fn parse_marks(obj: &Map<String, Value>, path: &str) -> DocResult<Vec<Mark>> {
    let marks = match obj.get("marks") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(marks)) => marks,
        Some(_) => {
            return Err(DocError::MarksNotArray {
                path: display_path(path),
            });
        }
    };

    let mut result = Vec::with_capacity(marks.len());
    for (i, mark) in marks.iter().enumerate() {
        let mark_path = format!("{}/marks/{}", path, i);
        let mark_obj = mark.as_object().ok_or_else(|| DocError::NotAnObject {
            path: mark_path.clone(),
        })?;
        let name = mark_obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DocError::MarkMissingType {
                path: mark_path.clone(),
            })?;
        let attrs = attrs_of(mark_obj, &mark_path)?;
        let ctx = AttrCtx {
            attrs,
            node: name,
            path: &mark_path,
        };
        let parsed = match name {
            "bold" | "strong" => Mark::Bold,
            "italic" | "em" => Mark::Italic,
            "strike" | "strikethrough" => Mark::Strike,
            "underline" => Mark::Underline,
            "code" => Mark::Code,
            "link" => {
                let href = ctx.string("href")?.ok_or_else(|| DocError::MissingAttr {
                    path: mark_path.clone(),
                    node: name.to_string(),
                    attr: "href",
                })?;
                Mark::Link(Link {
                    href,
                    title: ctx.string("title")?.filter(|t| !t.is_empty()),
                })
            }
            other => Mark::Unknown {
                name: other.to_string(),
                attrs: attrs.cloned().unwrap_or_default(),
            },
        };
        result.push(parsed);
    }
    Ok(result)
}

fn parse_content(
    obj: &Map<String, Value>,
    path: &str,
    max_depth: usize,
    depth: usize,
) -> DocResult<Vec<Node>> {
    match obj.get("content") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_node(item, &content_path(path, i), max_depth, depth))
            .collect(),
        Some(_) => Err(DocError::ContentNotArray {
            path: display_path(path),
        }),
    }
}

fn node_type<'v>(obj: &'v Map<String, Value>, path: &str) -> DocResult<&'v str> {
    match obj.get("type") {
        None | Some(Value::Null) => Err(DocError::MissingType {
            path: display_path(path),
        }),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(DocError::TypeNotString {
            path: display_path(path),
        }),
    }
}

fn attrs_of<'v>(obj: &'v Map<String, Value>, path: &str) -> DocResult<Option<&'v Map<String, Value>>> {
    match obj.get("attrs") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(attrs)) => Ok(Some(attrs)),
        Some(_) => Err(DocError::AttrsNotObject {
            path: display_path(path),
        }),
    }
}

fn leaf(type_name: &str, content: &[Node], path: &str) -> DocResult<()> {
    if content.is_empty() {
        Ok(())
    } else {
        Err(DocError::UnexpectedContent {
            path: display_path(path),
            node: type_name.to_string(),
        })
    }
}

/// Typed access to the attributes of one node or mark
struct AttrCtx<'a> {
    attrs: Option<&'a Map<String, Value>>,
    node: &'a str,
    path: &'a str,
}

impl AttrCtx<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.attrs
            .and_then(|attrs| attrs.get(key))
            .filter(|v| !v.is_null())
    }

    fn string(&self, key: &'static str) -> DocResult<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    fn uint(&self, key: &'static str) -> DocResult<Option<u64>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value
            .as_u64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| self.invalid(key, "a non-negative integer"))
    }

    /// `start` (prosemirror) or `order` (ProseKit flat lists)
    fn list_start(&self) -> DocResult<Option<u32>> {
        let start = match self.uint("start")? {
            Some(start) => Some(start),
            None => self.uint("order")?,
        };
        Ok(start.map(|s| s.min(u64::from(u32::MAX)) as u32))
    }

    fn invalid(&self, attr: &'static str, expected: &'static str) -> DocError {
        DocError::InvalidAttr {
            path: display_path(self.path),
            node: self.node.to_string(),
            attr,
            expected,
        }
    }
}

fn content_path(path: &str, index: usize) -> String {
    format!("{}/content/{}", path, index)
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
