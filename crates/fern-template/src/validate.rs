//! Structural validation of parsed templates.
//!
//! The only semantic rule enforced at registration time is conditional
//! branch adjacency: every `elif`/`else` must immediately follow a sibling
//! carrying `if` or `elif`, with nothing but blank text in between, and an
//! element may carry at most one branch directive.

use crate::ast::{Element, Node};
use crate::error::{TemplateError, TemplateResult};

const BRANCH_ATTRS: [&str; 3] = ["if", "elif", "else"];

/// Validate branch adjacency over a node list and all nested children.
pub fn validate_branches(nodes: &[Node]) -> TemplateResult<()> {
    check_siblings(nodes)?;
    for node in nodes {
        if let Node::Element(el) = node {
            validate_branches(&el.children)?;
        }
    }
    Ok(())
}

/// Check one sibling list.
fn check_siblings(nodes: &[Node]) -> TemplateResult<()> {
    // Whether the previous non-blank sibling can be continued by elif/else.
    let mut prev_opens_branch = false;

    for node in nodes {
        match node {
            Node::Text(_) if node.is_blank_text() => {
                // Blank text does not break adjacency.
            }
            Node::Text(_) => {
                prev_opens_branch = false;
            }
            Node::Element(el) => {
                let carried = branch_attrs_of(el);
                if carried.len() > 1 {
                    return Err(TemplateError::ambiguous_branch(&el.tag, el.span));
                }
                match carried.first().copied() {
                    Some("if") => {
                        prev_opens_branch = true;
                    }
                    Some(dir @ ("elif" | "else")) => {
                        if !prev_opens_branch {
                            return Err(TemplateError::dangling_branch(dir, el.span));
                        }
                        // else ends the chain, elif continues it
                        prev_opens_branch = dir == "elif";
                    }
                    _ => {
                        prev_opens_branch = false;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Collect the branch directives an element carries, in canonical order.
fn branch_attrs_of(el: &Element) -> Vec<&'static str> {
    BRANCH_ATTRS
        .iter()
        .copied()
        .filter(|name| el.has_attr(name))
        .collect()
}
