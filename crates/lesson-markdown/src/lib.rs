//! lesson-markdown: Markdown export and import for lesson documents
//!
//! This crate provides:
//! - Lesson document to Markdown (CommonMark plus GFM strikethrough and tables)
//! - Markdown to lesson document, via pulldown-cmark
//!
//! Markdown written by this crate is a fixed point: reading it back and
//! writing again yields the same text.
//!
//! # Example
//!
//! ```
//! use lesson_doc::{Document, Mark, Node};
//! use lesson_markdown::{WriterOptions, doc_to_markdown, markdown_to_doc};
//!
//! let doc = Document::try_new(vec![
//!     Node::heading(2, vec![Node::text("Agenda")]),
//!     Node::paragraph(vec![
//!         Node::text("Motion "),
//!         Node::marked_text("passed", vec![Mark::Bold]),
//!     ]),
//! ])
//! .unwrap();
//!
//! let markdown = doc_to_markdown(&doc, &WriterOptions::default());
//! assert_eq!(markdown, "## Agenda\n\nMotion **passed**\n");
//!
//! let back = markdown_to_doc(&markdown).unwrap();
//! assert_eq!(back, doc);
//! ```

pub mod reader;
pub mod writer;

pub use reader::{markdown_to_doc, markdown_to_doc_with};
pub use writer::{
    Serialized, WriterOptions, doc_to_markdown, json_to_markdown, serialize, slide_to_markdown,
};
