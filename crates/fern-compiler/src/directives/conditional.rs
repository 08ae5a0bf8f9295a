//! `if`, `elif` and `else` directives.
//!
//! Each branch wraps its element in its own block: the marker opens at
//! encounter, and finalize closes exactly that block. Lowering stitches
//! adjacent branches back onto the conditional they extend; adjacency
//! itself was already validated at registration.

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{Directive, Handled};
use crate::error::CompileResult;
use crate::program::{Cond, Line};
use crate::TemplateCompiler;

pub struct IfDirective;

impl Directive for IfDirective {
    fn name(&self) -> &'static str {
        "if"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "if").then(|| SmolStr::new("if"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let cond = cp.expr(ctx, value)?;
        ctx.add_line(Line::If {
            cond: Cond::Expr(cond),
        });
        Ok(Handled::Continue)
    }

    fn on_finalize(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<()> {
        ctx.add_line(Line::EndIf);
        Ok(())
    }
}

pub struct ElifDirective;

impl Directive for ElifDirective {
    fn name(&self) -> &'static str {
        "elif"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "elif").then(|| SmolStr::new("elif"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        let cond = cp.expr(ctx, value)?;
        ctx.add_line(Line::ElseIf {
            cond: Cond::Expr(cond),
        });
        Ok(Handled::Continue)
    }

    fn on_finalize(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<()> {
        ctx.add_line(Line::EndIf);
        Ok(())
    }
}

pub struct ElseDirective;

impl Directive for ElseDirective {
    fn name(&self) -> &'static str {
        "else"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "else").then(|| SmolStr::new("else"))
    }

    fn on_encounter(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<Handled> {
        ctx.add_line(Line::Else);
        Ok(Handled::Continue)
    }

    fn on_finalize(
        &self,
        _cp: &TemplateCompiler,
        ctx: &CompilationContext,
        _el: &Element,
        _arg: &str,
        _value: &str,
    ) -> CompileResult<()> {
        ctx.add_line(Line::EndIf);
        Ok(())
    }
}
