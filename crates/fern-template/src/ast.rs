//! Element tree types for parsed templates.

use crate::span::Span;
use indexmap::IndexMap;
use smol_str::SmolStr;

/// A node in the parsed element tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    /// An element with attributes and children.
    Element(Element),
    /// A text node.
    Text(TextNode),
}

impl Node {
    /// Get the span of this node.
    pub fn span(&self) -> Span {
        match self {
            Self::Element(el) => el.span,
            Self::Text(t) => t.span,
        }
    }

    /// Check whether this is a text node containing only whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(t) if t.content.trim().is_empty())
    }

    /// Get the element, if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }
}

/// An element node.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Element {
    /// The tag name.
    pub tag: SmolStr,
    /// Attributes in source order. Order is observable in emitted view nodes.
    pub attrs: IndexMap<SmolStr, Attr>,
    /// Child nodes.
    pub children: Vec<Node>,
    /// Source span of the whole element.
    pub span: Span,
    /// Span of the tag name.
    pub tag_span: Span,
}

impl Element {
    /// Get an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|a| a.value.as_str())
    }

    /// Check whether the element carries an attribute.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Return a copy of this element with one attribute removed.
    pub fn without_attr(&self, name: &str) -> Element {
        let mut clone = self.clone();
        clone.attrs.shift_remove(name);
        clone
    }
}

/// An attribute value with its source span.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attr {
    /// The raw attribute value. Empty for bare attributes.
    pub value: String,
    /// Source span of the attribute.
    pub span: Span,
}

/// A text node.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextNode {
    /// The text content.
    pub content: String,
    /// Source span.
    pub span: Span,
}
