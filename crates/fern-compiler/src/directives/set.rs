//! The `set` variable directive.

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::{Binding, CompilationContext};
use crate::directives::{Directive, Handled};
use crate::error::{CompileError, CompileResult};
use crate::TemplateCompiler;

/// Binds a compile-time variable visible to the rest of the sibling list
/// and everything nested under it. With a `value` attribute the binding
/// holds that raw expression; without one it captures the element's
/// children as markup, replayed where the caller's content is projected.
pub struct SetDirective;

impl Directive for SetDirective {
    fn name(&self) -> &'static str {
        "set"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "set").then(|| SmolStr::new("set"))
    }

    fn on_encounter(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let name = value.trim();
        if name.is_empty() {
            return Err(
                CompileError::bad_expression(value, "set requires a variable name")
                    .with_span(el.span),
            );
        }
        let binding = match el.attr("value") {
            Some(expr) => Binding::Expr(expr.to_string()),
            None => Binding::Nodes(el.children.clone()),
        };
        ctx.bind(name, binding);
        Ok(Handled::Stop)
    }
}
