//! Directive dispatch.
//!
//! Each directive declares the attribute names it handles and a unique
//! priority. During compilation of an element, matching directives fire
//! their hooks in ascending priority order: `on_encounter` before the
//! view node exists (a truthy return means the directive compiled the
//! whole element itself), `on_create` right after the node line is
//! emitted, and `on_finalize` after the element is placed.

mod call;
mod conditional;
mod foreach;
mod on;
mod refs;
mod set;
mod text;
mod widget;

use std::rc::Rc;

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use crate::TemplateCompiler;

pub use call::CallDirective;
pub use conditional::{ElifDirective, ElseDirective, IfDirective};
pub use foreach::ForEachDirective;
pub use on::OnDirective;
pub use refs::RefDirective;
pub use set::SetDirective;
pub use text::{EscDirective, RawDirective};
pub use widget::WidgetDirective;

/// Outcome of the encounter hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The directive owns the element; compilation of it stops here.
    Stop,
    /// Continue with node creation and the remaining hooks.
    Continue,
}

/// Mutable flags the creation hooks can set on the element being built.
#[derive(Debug, Default)]
pub struct CreateOutcome {
    /// The directive emitted the element's content itself.
    pub skip_children: bool,
}

pub trait Directive {
    fn name(&self) -> &'static str;

    /// Dispatch priority. Unique across the registry; lower fires first.
    fn priority(&self) -> u32;

    /// Matches an attribute name. Returns the directive argument, e.g. the
    /// event name for `on-*` attributes; plain directives return their own
    /// name.
    fn matches(&self, attr: &str) -> Option<SmolStr>;

    fn on_encounter(
        &self,
        _cp: &TemplateCompiler,
        _ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<Handled> {
        Ok(Handled::Continue)
    }

    /// Runs after the element's node line was emitted. `ctx` is already
    /// parented to the new node; `var` is its id.
    fn on_create(
        &self,
        _cp: &TemplateCompiler,
        _ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
        _var: u32,
        _outcome: &mut CreateOutcome,
    ) -> CompileResult<()> {
        Ok(())
    }

    /// Runs after the element was placed; closes any blocks opened at
    /// encounter.
    fn on_finalize(
        &self,
        _cp: &TemplateCompiler,
        _ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<()> {
        Ok(())
    }
}

/// One directive match on an element: the directive, the argument its
/// pattern extracted, and the raw attribute value.
pub struct DirectiveMatch {
    pub directive: Rc<dyn Directive>,
    pub attr: SmolStr,
    pub arg: SmolStr,
    pub value: String,
}

/// All registered directives, kept sorted by ascending priority.
pub struct DirectiveRegistry {
    directives: Vec<Rc<dyn Directive>>,
}

impl DirectiveRegistry {
    /// A registry with the built-in directive set.
    pub fn builtin() -> Self {
        let directives: Vec<Rc<dyn Directive>> = vec![
            Rc::new(ForEachDirective),
            Rc::new(IfDirective),
            Rc::new(ElifDirective),
            Rc::new(ElseDirective),
            Rc::new(CallDirective),
            Rc::new(SetDirective),
            Rc::new(EscDirective),
            Rc::new(RawDirective),
            Rc::new(OnDirective),
            Rc::new(RefDirective),
            Rc::new(WidgetDirective),
        ];
        DirectiveRegistry { directives }
    }

    /// Adds a custom directive. Priorities must stay unique so dispatch
    /// order is deterministic.
    pub fn register(&mut self, directive: Rc<dyn Directive>) -> CompileResult<()> {
        if self
            .directives
            .iter()
            .any(|d| d.priority() == directive.priority())
        {
            return Err(CompileError::bad_program(format!(
                "directive priority {} is already taken",
                directive.priority()
            )));
        }
        self.directives.push(directive);
        self.directives.sort_by_key(|d| d.priority());
        Ok(())
    }

    /// Matches every directive against the element's attributes, in
    /// priority order.
    pub fn matches_for(&self, el: &Element) -> Vec<DirectiveMatch> {
        let mut matches = Vec::new();
        for directive in &self.directives {
            for (name, attr) in &el.attrs {
                if let Some(arg) = directive.matches(name) {
                    matches.push(DirectiveMatch {
                        directive: Rc::clone(directive),
                        attr: name.clone(),
                        arg,
                        value: attr.value.clone(),
                    });
                }
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorCode;
    use fern_template::parse_document;

    fn element(markup: &str) -> Element {
        let nodes = parse_document(markup).unwrap();
        nodes[0].as_element().unwrap().clone()
    }

    #[test]
    fn builtin_priorities_are_unique_and_sorted() {
        let registry = DirectiveRegistry::builtin();
        let priorities: Vec<u32> = registry.directives.iter().map(|d| d.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn matches_fire_in_priority_order() {
        let el = element(r#"<div on-click="go" if="visible" foreach="items"/>"#);
        let registry = DirectiveRegistry::builtin();
        let matches = registry.matches_for(&el);
        let names: Vec<&str> = matches.iter().map(|m| m.directive.name()).collect();
        assert_eq!(names, vec!["foreach", "if", "on"]);
        assert_eq!(matches[2].arg, "click");
    }

    #[test]
    fn duplicate_priority_is_rejected() {
        struct Clashing;
        impl Directive for Clashing {
            fn name(&self) -> &'static str {
                "clashing"
            }
            fn priority(&self) -> u32 {
                20
            }
            fn matches(&self, attr: &str) -> Option<SmolStr> {
                (attr == "clashing").then(|| SmolStr::new("clashing"))
            }
        }
        let mut registry = DirectiveRegistry::builtin();
        let err = registry.register(Rc::new(Clashing)).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::BadProgram);
    }
}
