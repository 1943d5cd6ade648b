//! JSON output in the ProseMirror shape
//!
//! `{type, attrs?, marks?, text?, content?}`, with empty `attrs`, `marks` and
//! `content` omitted the way ProseMirror's `toJSON` omits them.

use crate::ast::{Document, List, Mark, Node};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

impl Document {
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!("doc"));
        obj.insert("content".to_string(), nodes_to_value(&self.content));
        Value::Object(obj)
    }
}

impl Node {
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!(self.type_name()));

        let mut attrs = Map::new();
        match self {
            Node::Text(t) => {
                obj.insert("text".to_string(), json!(t.text));
                if !t.marks.is_empty() {
                    let marks = t.marks.iter().map(Mark::to_value).collect();
                    obj.insert("marks".to_string(), Value::Array(marks));
                }
            }
            Node::Heading(h) => {
                attrs.insert("level".to_string(), json!(h.level));
            }
            Node::List(l) => {
                attrs.insert("kind".to_string(), json!(l.kind.as_str()));
                attrs.insert("order".to_string(), json!(l.start));
            }
            Node::OrderedList(List {
                start: Some(start),
                ..
            }) => {
                attrs.insert("start".to_string(), json!(start));
            }
            Node::CodeBlock(c) => {
                if let Some(lang) = &c.language {
                    attrs.insert("language".to_string(), json!(lang));
                }
            }
            Node::HorizontalRule(hr) => {
                if let Some(markup) = &hr.markup {
                    attrs.insert("markup".to_string(), json!(markup));
                }
            }
            Node::Image(img) => {
                attrs.insert("src".to_string(), json!(img.src));
                attrs.insert("alt".to_string(), json!(img.alt));
                if let Some(title) = &img.title {
                    attrs.insert("title".to_string(), json!(title));
                }
            }
            Node::Unknown(u) => attrs.clone_from(&u.attrs),
            _ => {}
        }
        if !attrs.is_empty() {
            obj.insert("attrs".to_string(), Value::Object(attrs));
        }

        let children = self.children();
        if !children.is_empty() {
            obj.insert("content".to_string(), nodes_to_value(children));
        }
        Value::Object(obj)
    }
}

impl Mark {
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!(self.name()));
        let attrs = match self {
            Mark::Link(link) => {
                let mut attrs = Map::new();
                attrs.insert("href".to_string(), json!(link.href));
                if let Some(title) = &link.title {
                    attrs.insert("title".to_string(), json!(title));
                }
                attrs
            }
            Mark::Unknown { attrs, .. } => attrs.clone(),
            _ => Map::new(),
        };
        if !attrs.is_empty() {
            obj.insert("attrs".to_string(), Value::Object(attrs));
        }
        Value::Object(obj)
    }
}

pub(crate) fn nodes_to_value<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Value {
    Value::Array(nodes.into_iter().map(Node::to_value).collect())
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ListKind, Mark};

    #[test]
    fn test_text_with_marks() {
        let node = Node::marked_text(
            "UN",
            vec![Mark::Bold, Mark::link_with_title("https://un.org", "United Nations")],
        );
        assert_eq!(
            node.to_value(),
            json!({
                "type": "text",
                "text": "UN",
                "marks": [
                    {"type": "bold"},
                    {"type": "link", "attrs": {"href": "https://un.org", "title": "United Nations"}}
                ]
            })
        );
    }

    #[test]
    fn test_empty_content_omitted() {
        assert_eq!(
            Node::paragraph(vec![]).to_value(),
            json!({"type": "paragraph"})
        );
        assert_eq!(Node::hard_break().to_value(), json!({"type": "hardBreak"}));
    }

    #[test]
    fn test_list_attrs() {
        let list = Node::list(ListKind::Ordered, vec![Node::paragraph(vec![])]);
        assert_eq!(
            list.to_value(),
            json!({
                "type": "list",
                "attrs": {"kind": "ordered", "order": null},
                "content": [{"type": "paragraph"}]
            })
        );
        assert_eq!(
            Node::ordered_list(Some(4), vec![]).to_value(),
            json!({"type": "orderedList", "attrs": {"start": 4}})
        );
    }

    #[test]
    fn test_out_of_range_heading_level_is_kept() {
        let value = json!({
            "type": "doc",
            "content": [{"type": "heading", "attrs": {"level": 900}}]
        });
        let doc = Document::from_value(&value).unwrap();
        assert_eq!(doc.to_value(), value);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = r#"{
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Opening speech"}]},
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Honourable "},
                    {"type": "text", "text": "chair", "marks": [{"type": "italic"}]}
                ]},
                {"type": "callout", "attrs": {"tone": "warn"}, "content": [{"type": "paragraph"}]},
                {"type": "image", "attrs": {"src": "flag.png", "alt": "Flag"}}
            ]
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        let out = serde_json::to_string(&doc).unwrap();
        let reparsed = Document::from_json(&out).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_deserialize_reports_validation_error() {
        let err = serde_json::from_str::<Document>(r#"{"type": "paragraph"}"#).unwrap_err();
        assert!(err.to_string().contains("\"doc\" root"));
    }
}
