//! The `call` sub-template directive.

use std::rc::Rc;

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::{CompilationContext, CompileSession};
use crate::directives::{Directive, Handled};
use crate::error::{CompileError, CompileResult};
use crate::TemplateCompiler;

/// Inlines another registered template at the call site. The caller's own
/// body becomes projectable content: a `<content/>` tag inside the target
/// replays it, and any variables the body declares are harvested and made
/// visible while compiling the target.
pub struct CallDirective;

impl Directive for CallDirective {
    fn name(&self) -> &'static str {
        "call"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "call").then(|| SmolStr::new("call"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let target = cp
            .template(value)
            .ok_or_else(|| CompileError::unknown_template(value).with_span(el.span))?;
        let body = Rc::new(el.without_attr("call"));

        // Pre-compile the caller body against a scratch session purely to
        // harvest its variable declarations; the emitted code is dropped.
        let scratch = CompilationContext::new(CompileSession::new(ctx.session().template()));
        let scratch = scratch.with_parent(scratch.generate_id())?;
        for child in &body.children {
            cp.compile_node(&scratch, child)?;
        }
        let harvested = scratch.flatten_variables();

        let sub = ctx
            .with_caller(Some(Rc::clone(&body)))
            .with_variables(harvested);
        for root in &target.roots {
            if root.is_blank_text() {
                continue;
            }
            cp.compile_node(&sub, root)?;
        }
        Ok(Handled::Stop)
    }
}
