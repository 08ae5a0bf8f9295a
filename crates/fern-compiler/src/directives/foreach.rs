//! The `foreach` loop directive.

use fern_template::{Element, Node};
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{Directive, Handled};
use crate::error::CompileResult;
use crate::program::Line;
use crate::TemplateCompiler;

/// Repeats its element once per item of the evaluated source. The loop
/// variable name comes from the `as` attribute and defaults to `item`;
/// derived bindings (`<name>_index` and friends) live in a scope frame
/// pushed per iteration.
pub struct ForEachDirective;

impl Directive for ForEachDirective {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "foreach").then(|| SmolStr::new("foreach"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let source = cp.expr(ctx, value)?;
        let var_name = SmolStr::new(el.attr("as").unwrap_or("item"));
        ctx.session().mark_protect_scope();
        ctx.add_line(Line::ForEach { source, var_name });
        let body = el.without_attr("foreach").without_attr("as");
        cp.compile_node(&ctx.with_in_loop(), &Node::Element(body))?;
        ctx.add_line(Line::EndFor);
        Ok(Handled::Stop)
    }
}
