//! Template markup parsing and registration.
//!
//! This crate parses the fern template dialect into an element tree,
//! validates conditional branch adjacency, and stores templates by name for
//! the compiler to pick up lazily.

pub mod ast;
pub mod error;
pub mod parser;
pub mod registry;
pub mod span;
pub mod validate;

pub use ast::{Attr, Element, Node, TextNode};
pub use error::{TemplateError, TemplateErrorCode, TemplateResult};
pub use parser::parse_document;
pub use registry::{Template, TemplateRegistry};
pub use span::Span;
