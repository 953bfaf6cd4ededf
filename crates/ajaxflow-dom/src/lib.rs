//! Document model for ajaxflow.
//!
//! A small, structured stand-in for a browser DOM: enough to replace
//! components, merge head contributions and serialize the result.
//!
//! # Flow
//!
//! ```text
//!   markup string
//!        │  Fragment::parse_html / parse_xml
//!        ▼
//!   Fragment (owned MarkupNode tree, no document)
//!        │  DomPatch::{Replace, Append, InsertBefore, ...}
//!        ▼
//!   Document::apply ──► arena mutation ──► Vec<NodeId> inserted
//! ```
//!
//! Markup never reaches the arena except through [`DomPatch`]. That
//! keeps the one place where untrusted server markup is injected small
//! and auditable.
//!
//! # Example
//!
//! ```
//! use ajaxflow_dom::{Document, DomPatch, Fragment};
//!
//! let mut doc = Document::parse("<div id=\"count\">1</div>").unwrap();
//! let target = doc.element_by_id("count").unwrap();
//!
//! doc.apply(DomPatch::Replace {
//!     target,
//!     fragment: Fragment::parse_html("<div id=\"count\">2</div>").unwrap(),
//! })
//! .unwrap();
//!
//! let now = doc.element_by_id("count").unwrap();
//! assert_eq!(doc.text_content(now), "2");
//! ```

mod document;
mod error;
mod markup;
mod node;
mod patch;
mod serialize;

pub use document::{Document, SharedDocument};
pub use error::{DomError, MarkupError};
pub use markup::{
    decode_entities, is_raw_text_element, is_void_element, Fragment, MarkupElement, MarkupNode,
    ParseMode, MAX_NESTING_DEPTH,
};
pub use node::{ElementData, NodeData, NodeId};
pub use patch::DomPatch;
pub use serialize::{escape_attr, escape_text};
