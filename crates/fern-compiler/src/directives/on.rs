//! The `on-<event>` handler directive.

use std::rc::Rc;

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{CreateOutcome, Directive};
use crate::error::{CompileError, CompileResult};
use crate::expr::parse_handler;
use crate::program::{HandlerSpec, Line};
use crate::TemplateCompiler;

/// Binds a named handler to an event on the host node. The attribute
/// value is `name` or `name(args…)`; arguments are expressions evaluated
/// once, when the binding is first materialized for the node.
pub struct OnDirective;

impl Directive for OnDirective {
    fn name(&self) -> &'static str {
        "on"
    }

    fn priority(&self) -> u32 {
        90
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        attr.strip_prefix("on-")
            .filter(|event| !event.is_empty())
            .map(SmolStr::new)
    }

    fn on_create(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        arg: &str,
        value: &str,
        var: u32,
        _outcome: &mut CreateOutcome,
    ) -> CompileResult<()> {
        let (handler, args) =
            parse_handler(value).map_err(|detail| {
                CompileError::bad_expression(value, detail).with_span(el.span)
            })?;
        ctx.add_line(Line::On(HandlerSpec {
            node: var,
            event: SmolStr::new(arg),
            handler,
            args: args.into_iter().map(Rc::new).collect(),
        }));
        Ok(())
    }
}
