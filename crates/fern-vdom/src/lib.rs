//! View-node descriptors and the render-context value model.
//!
//! The compiler's output trees are built from these types; the component
//! runtime hands them to an external patcher. Nothing in this crate touches
//! a real document.

pub mod escape;
pub mod value;
pub mod vnode;

pub use escape::escape_html;
pub use value::{display, is_content, is_nullish, is_truthy, json, KeyValue, Map, Value};
pub use vnode::{BoundHandler, Hook, VElement, VNode};
