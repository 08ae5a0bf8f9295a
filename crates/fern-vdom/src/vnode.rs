//! View-node descriptors.
//!
//! The compiled render function outputs a tree of these descriptors; an
//! external patch function reconciles them against the live document. This
//! crate only constructs and nests them.

use crate::value::{KeyValue, Value};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::rc::Rc;

/// A node in the view tree.
#[derive(Debug, Clone)]
pub enum VNode {
    /// An element with attributes, handlers, hooks and children.
    Element(VElement),
    /// A text node.
    Text(String),
    /// A raw-HTML fragment; the external patcher parses and swaps it in on
    /// insert.
    Fragment(String),
    /// A reserved slot for a nested component, spliced once the child's own
    /// render resolves.
    Slot(u32),
}

impl VNode {
    /// Create an element node.
    pub fn element(tag: impl Into<SmolStr>) -> VNode {
        VNode::Element(VElement::new(tag))
    }

    /// Get the element, if this node is one.
    pub fn as_element(&self) -> Option<&VElement> {
        match self {
            VNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Concatenated text content of this subtree (tests and debugging).
    pub fn text_content(&self) -> String {
        match self {
            VNode::Text(t) => t.clone(),
            VNode::Fragment(html) => html.clone(),
            VNode::Slot(_) => String::new(),
            VNode::Element(el) => el.children.iter().map(VNode::text_content).collect(),
        }
    }

    /// Walk the subtree, calling `f` on every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a VNode)) {
        f(self);
        if let VNode::Element(el) = self {
            for child in &el.children {
                child.walk(f);
            }
        }
    }
}

/// An element view node.
#[derive(Debug, Clone, Default)]
pub struct VElement {
    /// The tag name.
    pub tag: SmolStr,
    /// Reconciliation key, when the template supplies one.
    pub key: Option<KeyValue>,
    /// Attributes in emission order.
    pub attrs: IndexMap<SmolStr, String>,
    /// Event handlers bound on this node.
    pub handlers: Vec<Rc<BoundHandler>>,
    /// Lifecycle hooks for the external patcher.
    pub hooks: Vec<Hook>,
    /// Child nodes.
    pub children: Vec<VNode>,
}

impl VElement {
    /// Create an element with a tag and nothing else.
    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Set an attribute, space-joining when the name is already present.
    pub fn merge_attr(&mut self, name: &str, value: &str) {
        match self.attrs.get_mut(name) {
            Some(existing) if !existing.is_empty() && !value.is_empty() => {
                existing.push(' ');
                existing.push_str(value);
            }
            Some(existing) => {
                if existing.is_empty() {
                    *existing = value.to_string();
                }
            }
            None => {
                self.attrs.insert(SmolStr::from(name), value.to_string());
            }
        }
    }
}

/// An event handler bound to a view node.
///
/// Handlers are memoized per compiled node id, not per render, so the same
/// `Rc` is observed across re-renders of the same node; patchers may rely on
/// pointer identity to skip re-binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundHandler {
    /// The compiled node id that owns the binding.
    pub node: u32,
    /// The event name (after the `on-` prefix).
    pub event: SmolStr,
    /// The handler name looked up on the owning component.
    pub handler: SmolStr,
    /// Extra bound arguments, evaluated once when the handler is bound.
    pub args: Vec<Value>,
}

/// A lifecycle hook attached to a view node for the external patcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Hook {
    /// On insert, record the live element into the owner's refs map under
    /// this name.
    Ref(String),
    /// On insert, mount the child component; on remove, detach (keep-alive)
    /// or destroy it.
    ChildLifecycle {
        /// The child component instance id.
        component: u64,
        /// Detach instead of destroy on removal.
        keep_alive: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_merge_attr_space_joins() {
        let mut el = VElement::new("div");
        el.merge_attr("class", "a");
        el.merge_attr("class", "b");
        assert_eq!(el.attrs.get("class").map(String::as_str), Some("a b"));
    }

    #[test]
    fn test_merge_attr_empty_static() {
        let mut el = VElement::new("div");
        el.merge_attr("disabled", "");
        el.merge_attr("disabled", "disabled");
        assert_eq!(
            el.attrs.get("disabled").map(String::as_str),
            Some("disabled")
        );
    }

    #[test]
    fn test_text_content() {
        let mut el = VElement::new("p");
        el.children.push(VNode::Text("a".into()));
        let mut inner = VElement::new("b");
        inner.children.push(VNode::Text("c".into()));
        el.children.push(VNode::Element(inner));
        assert_eq!(VNode::Element(el).text_content(), "ac");
    }

    #[test]
    fn test_handler_identity() {
        let h = Rc::new(BoundHandler {
            node: 3,
            event: "click".into(),
            handler: "pick".into(),
            args: vec![json!(1)],
        });
        let h2 = Rc::clone(&h);
        assert!(Rc::ptr_eq(&h, &h2));
    }
}
