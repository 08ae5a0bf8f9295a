//! The `esc` and `raw` expression-text directives.
//!
//! Both evaluate an expression into text content. `esc` HTML-escapes the
//! rendered value; `raw` emits it as a markup fragment. When the host
//! element has children they serve as fallback: the expression wins
//! whenever its value has content, where numeric zero counts as content
//! even though it is falsy.

use std::rc::Rc;

use fern_template::Element;
use smol_str::SmolStr;

use crate::context::CompilationContext;
use crate::directives::{CreateOutcome, Directive, Handled};
use crate::error::CompileResult;
use crate::program::{Cond, Line};
use crate::TemplateCompiler;

fn emit_expr_text(
    cp: &TemplateCompiler,
    ctx: &CompilationContext,
    el: &Element,
    value: &str,
    escaped: bool,
) -> CompileResult<()> {
    // A raw emission under a forced-escaping context degrades to escaped
    // text.
    let escaped = escaped || ctx.escaping();
    let expr = cp.expr(ctx, value)?;
    let var = ctx.generate_id();
    let has_fallback = el.children.iter().any(|c| !c.is_blank_text());
    if has_fallback {
        // Branches close their own blocks, the same shape the conditional
        // directives emit.
        ctx.add_line(Line::If {
            cond: Cond::Content(Rc::clone(&expr)),
        });
        ctx.add_line(Line::EscText { var, expr, escaped });
        ctx.place_leaf(var)?;
        ctx.add_line(Line::EndIf);
        ctx.add_line(Line::Else);
        // Fallback children of an escaped emission inherit the escaping
        // requirement, so a nested raw cannot reopen markup.
        if escaped && !ctx.escaping() {
            let nested = ctx.with_escaping();
            for child in &el.children {
                cp.compile_node(&nested, child)?;
            }
        } else {
            for child in &el.children {
                cp.compile_node(ctx, child)?;
            }
        }
        ctx.add_line(Line::EndIf);
    } else {
        ctx.add_line(Line::EscText { var, expr, escaped });
        ctx.place_leaf(var)?;
    }
    Ok(())
}

fn handle(
    cp: &TemplateCompiler,
    ctx: &CompilationContext,
    el: &Element,
    value: &str,
    escaped: bool,
    directive: &str,
) -> CompileResult<Handled> {
    // On the inert wrapper tag there is no host node; the text lands in
    // the current parent.
    if el.tag == "template" {
        let stripped = el.without_attr(directive);
        emit_expr_text(cp, ctx, &stripped, value, escaped)?;
        return Ok(Handled::Stop);
    }
    Ok(Handled::Continue)
}

pub struct EscDirective;

impl Directive for EscDirective {
    fn name(&self) -> &'static str {
        "esc"
    }

    fn priority(&self) -> u32 {
        70
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "esc").then(|| SmolStr::new("esc"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        handle(cp, ctx, el, value, true, "esc")
    }

    fn on_create(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
        _var: u32,
        outcome: &mut CreateOutcome,
    ) -> CompileResult<()> {
        outcome.skip_children = true;
        emit_expr_text(cp, ctx, el, value, true)
    }
}

pub struct RawDirective;

impl Directive for RawDirective {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn matches(&self, attr: &str) -> Option<SmolStr> {
        (attr == "raw").then(|| SmolStr::new("raw"))
    }

    fn on_encounter(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
    ) -> CompileResult<Handled> {
        handle(cp, ctx, el, value, false, "raw")
    }

    fn on_create(
        &self,
        cp: &TemplateCompiler,
        ctx: &CompilationContext,
        el: &Element,
        _arg: &str,
        value: &str,
        _var: u32,
        outcome: &mut CreateOutcome,
    ) -> CompileResult<()> {
        outcome.skip_children = true;
        emit_expr_text(cp, ctx, el, value, false)
    }
}
