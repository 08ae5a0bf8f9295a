//! Template registry.

use crate::ast::Node;
use crate::error::{TemplateError, TemplateResult};
use crate::parser::parse_document;
use crate::span::Span;
use crate::validate::validate_branches;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// A registered template: its name and parsed top-level nodes.
///
/// The single-root invariant is enforced at compile time, not here, so that
/// the compiler can report it through its own error channel.
#[derive(Debug, Clone)]
pub struct Template {
    /// The template name.
    pub name: SmolStr,
    /// Parsed top-level nodes.
    pub roots: Vec<Node>,
}

/// Holds parsed templates keyed by name. Registration is append-only.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: FxHashMap<SmolStr, Template>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a template.
    ///
    /// Fails with a duplicate-template error if `name` is taken, unless
    /// `allow_duplicate` is set, in which case the call is a no-op.
    pub fn add_template(
        &mut self,
        name: &str,
        markup: &str,
        allow_duplicate: bool,
    ) -> TemplateResult<()> {
        if self.templates.contains_key(name) {
            if allow_duplicate {
                return Ok(());
            }
            return Err(TemplateError::duplicate(name));
        }

        let roots = parse_document(markup)?;
        if roots.iter().all(|n| n.is_blank_text()) {
            return Err(TemplateError::parse(
                format!("Template \"{}\" is empty", name),
                Span::empty(0),
            ));
        }
        validate_branches(&roots)?;

        self.templates.insert(
            SmolStr::from(name),
            Template {
                name: SmolStr::from(name),
                roots,
            },
        );
        Ok(())
    }

    /// Parse a bundle document and register each immediate child element as
    /// a named template. Children must carry a `name` attribute; the
    /// attribute is stripped from the stored root.
    pub fn load_bundle(&mut self, markup: &str) -> TemplateResult<()> {
        let nodes = parse_document(markup)?;
        let root = match nodes.iter().find(|n| !n.is_blank_text()) {
            Some(Node::Element(el)) => el,
            _ => {
                return Err(TemplateError::parse(
                    "Template bundle is empty",
                    Span::empty(0),
                ));
            }
        };

        for child in &root.children {
            let el = match child {
                Node::Element(el) => el,
                Node::Text(_) if child.is_blank_text() => continue,
                Node::Text(t) => {
                    return Err(TemplateError::parse(
                        "Unexpected text in template bundle",
                        t.span,
                    ));
                }
            };
            let name = el.attr("name").map(str::to_owned).ok_or_else(|| {
                TemplateError::parse(
                    format!("Bundle template <{}> is missing a name attribute", el.tag),
                    el.span,
                )
            })?;
            if self.templates.contains_key(name.as_str()) {
                return Err(TemplateError::duplicate(&name));
            }

            let roots = vec![Node::Element(el.without_attr("name"))];
            validate_branches(&roots)?;
            self.templates.insert(
                SmolStr::from(name.as_str()),
                Template {
                    name: SmolStr::from(name.as_str()),
                    roots,
                },
            );
        }

        Ok(())
    }

    /// Look up a template.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Check whether a template is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Iterate over registered template names.
    pub fn templates(&self) -> impl Iterator<Item = &SmolStr> {
        self.templates.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorCode;

    #[test]
    fn test_add_and_get() {
        let mut reg = TemplateRegistry::new();
        reg.add_template("card", "<div>hi</div>", false).unwrap();
        assert!(reg.has_template("card"));
        assert_eq!(reg.get("card").unwrap().roots.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = TemplateRegistry::new();
        reg.add_template("card", "<div/>", false).unwrap();
        let err = reg.add_template("card", "<span/>", false).unwrap_err();
        assert_eq!(err.code, TemplateErrorCode::DuplicateTemplate);
    }

    #[test]
    fn test_duplicate_tolerated() {
        let mut reg = TemplateRegistry::new();
        reg.add_template("card", "<div>a</div>", false).unwrap();
        reg.add_template("card", "<span>b</span>", true).unwrap();
        // The original registration wins.
        let el = reg.get("card").unwrap().roots[0].as_element().unwrap().clone();
        assert_eq!(el.tag.as_str(), "div");
    }

    #[test]
    fn test_empty_document_rejected() {
        let mut reg = TemplateRegistry::new();
        let err = reg.add_template("blank", "   \n ", false).unwrap_err();
        assert_eq!(err.code, TemplateErrorCode::Parse);
    }

    #[test]
    fn test_branch_validation_runs() {
        let mut reg = TemplateRegistry::new();
        let err = reg
            .add_template("bad", r#"<div><p elif="x">a</p></div>"#, false)
            .unwrap_err();
        assert_eq!(err.code, TemplateErrorCode::DanglingBranch);
    }

    #[test]
    fn test_load_bundle() {
        let mut reg = TemplateRegistry::new();
        reg.load_bundle(
            r#"<templates>
                <div name="one">1</div>
                <span name="two" if="x">2</span>
            </templates>"#,
        )
        .unwrap();
        assert!(reg.has_template("one"));
        assert!(reg.has_template("two"));
        // name attribute is stripped from the stored root
        let two = reg.get("two").unwrap().roots[0].as_element().unwrap().clone();
        assert!(!two.has_attr("name"));
        assert!(two.has_attr("if"));
    }

    #[test]
    fn test_bundle_child_without_name() {
        let mut reg = TemplateRegistry::new();
        let err = reg
            .load_bundle("<templates><div>anon</div></templates>")
            .unwrap_err();
        assert_eq!(err.code, TemplateErrorCode::Parse);
    }
}
