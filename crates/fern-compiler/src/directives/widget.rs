//! The `widget` child-component directive.

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{Directive, Handled};
use crate::error::{CompileError, CompileResult};
use crate::program::{Line, WidgetSpec};
use crate::TemplateCompiler;

/// Replaces its element with a placeholder slot and asks the runtime to
/// instantiate a component there. Companion attributes: `key` matches the
/// instance across renders, `props` evaluates to the instance's input,
/// and bare `keep-alive` detaches instead of destroying on removal.
pub struct WidgetDirective;

impl Directive for WidgetDirective {
    fn name(&self) -> &'static str {
        "widget"
    }

    fn priority(&self) -> u32 {
        110
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "widget").then(|| SmolStr::new("widget"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let name = value.trim();
        if name.is_empty() {
            return Err(
                CompileError::bad_expression(value, "widget requires a component name")
                    .with_span(el.span),
            );
        }
        let key = el.attr("key").map(|raw| cp.expr(ctx, raw)).transpose()?;
        let props = el.attr("props").map(|raw| cp.expr(ctx, raw)).transpose()?;
        let slot = ctx.generate_id();
        ctx.session().mark_needs_owner();
        ctx.add_line(Line::Widget(WidgetSpec {
            slot,
            name: SmolStr::new(name),
            key,
            props,
            keep_alive: el.has_attr("keep-alive"),
            in_loop: ctx.in_loop(),
        }));
        ctx.place_leaf(slot)?;
        Ok(Handled::Stop)
    }
}
