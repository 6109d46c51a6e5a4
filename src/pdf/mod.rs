//! Tolerant PDF object graph access.
//!
//! This is not a conforming PDF parser. Objects are found by scanning for
//! `obj`/`endobj` spans and read with a small recursive-descent reader.
//! Classic cross-reference tables are only written, never trusted for
//! reading; cross-reference streams contribute a trailer and are consulted
//! for objects packed into object streams.

pub mod content;
pub mod filters;
pub mod lexer;
pub mod object;
pub mod object_map;
pub mod page_tree;
pub mod parser;
pub mod rebuild;

pub use content::{tokenize, Operand, Operation, PageContent};
pub use object::{Dictionary, Object, ObjectId, PdfString, StringFormat};
pub use object_map::{ObjectMap, Trailer};
pub use page_tree::{PageDetail, PageInfo, PageTree, DEFAULT_MEDIA_BOX};
