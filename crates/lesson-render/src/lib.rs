//! lesson-render: lesson documents as presentational elements
//!
//! Converts a validated [`lesson_doc::Document`] (or one of its slides) into
//! an [`Element`] tree, and that tree into an HTML fragment.
//!
//! # Example
//!
//! ```
//! use lesson_doc::{Document, Mark, Node};
//! use lesson_render::render_document;
//!
//! let doc = Document::try_new(vec![Node::paragraph(vec![
//!     Node::text("Motion "),
//!     Node::marked_text("passed", vec![Mark::Bold, Mark::Italic]),
//! ])])
//! .unwrap();
//!
//! assert_eq!(
//!     render_document(&doc).to_html(),
//!     "<p>Motion <strong><em>passed</em></strong></p>"
//! );
//! ```

pub mod element;
pub mod html;
pub mod render;

pub use element::{Element, Tag};
pub use html::write_html;
pub use render::{render_document, render_slide};
