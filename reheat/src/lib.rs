//! Virtual DOM reconciliation based on facet, html5ever, and indextree.
//!
//! reheat provides:
//! - **Parsing**: an html5ever-tokenized markup parser that records each
//!   element's source span and positional selector
//! - **Diffing**: a positional tree diff producing an ordered, replayable [`PatchSet`]
//! - **Applying**: a [`Backend`] trait for live documents, with [`LiveDocument`]
//!   as an in-memory implementation
//! - **Rendering**: a [`Renderer`] that diffs each render against the last one
//!
//! # Example
//!
//! ```rust
//! use reheat::{LiveDocument, diff, parse_str};
//!
//! let old = parse_str(r#"<div class="foo" id="bar"><p>hi</p></div>"#).unwrap();
//! let new = parse_str(r#"<div class="foo" data-x="1"><p>hi</p><p>there</p></div>"#).unwrap();
//!
//! let patches = diff(&old, &new).unwrap();
//!
//! let mut doc = LiveDocument::from_tree(&old);
//! patches.apply(&mut doc).unwrap();
//! assert_eq!(doc.to_html(), LiveDocument::from_tree(&new).to_html());
//! ```

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace};

pub mod diff;
pub mod live;
mod parser;
pub mod patch;
mod render;
pub mod serialize;
mod source;
pub mod tree;

pub use diff::{DiffError, DiffOptions, diff, diff_children, diff_with};
pub use live::{LiveDocument, LiveError, LiveNode};
pub use parser::{ParseError, parse, parse_str};
pub use patch::{ApplyError, Backend, Content, NodePath, Patch, PatchSet, Target};
pub use render::{RenderError, Renderer};
pub use source::SourceReader;
pub use tree::{Attr, ElementData, Kind, Mismatch, Node, NodeKind, Tree, TreeDump};
