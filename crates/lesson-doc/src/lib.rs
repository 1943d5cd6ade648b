//! lesson-doc: rich-text lesson documents
//!
//! This crate provides:
//! - The lesson document tree (nodes, marks, typed attributes)
//! - Validating construction from stored ProseMirror-style JSON
//! - Slide pagination on `<!-- Slide -->` marker paragraphs
//!
//! # Example
//!
//! ```
//! use lesson_doc::Document;
//!
//! let json = r#"{
//!   "type": "doc",
//!   "content": [
//!     {"type": "paragraph", "content": [{"type": "text", "text": "Welcome"}]},
//!     {"type": "paragraph", "content": [{"type": "text", "text": "<!-- Slide -->"}]},
//!     {"type": "paragraph", "content": [{"type": "text", "text": "Rules of procedure"}]}
//!   ]
//! }"#;
//!
//! let doc = Document::from_json(json).unwrap();
//! assert_eq!(doc.slides().len(), 2);
//! ```

pub mod ast;
pub mod json;
pub mod parser;
pub mod slides;

// Re-export main types for convenient access
pub use ast::{
    Blockquote, CodeBlock, Document, Heading, HorizontalRule, Image, Link, List, ListItem,
    ListKind, Mark, Node, Paragraph, Table, TableCell, TableRow, Text, Unknown, plain_text,
};
pub use parser::{DEFAULT_MAX_DEPTH, DocError, DocResult, ParseOptions, validate};
pub use slides::{SLIDE_MARKER, Slide, is_slide_marker, split_slides};
