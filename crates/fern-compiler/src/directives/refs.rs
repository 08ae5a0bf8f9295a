//! The `ref` capture directive.

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{CreateOutcome, Directive};
use crate::error::CompileResult;
use crate::program::Line;
use crate::TemplateCompiler;

/// Records the live node into the owner's refs map. The name may contain
/// `{{ }}` pieces, so refs inside loops can key per item.
pub struct RefDirective;

impl Directive for RefDirective {
    fn name(&self) -> &'static str {
        "ref"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "ref").then(|| SmolStr::new("ref"))
    }

    fn on_create(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        value: &str,
        var: u32,
        _outcome: &mut CreateOutcome,
    ) -> CompileResult<()> {
        let pieces = cp.parse_pieces(ctx, value)?;
        ctx.add_line(Line::RefCapture { var, pieces });
        Ok(())
    }
}
