//! The node compiler: directive dispatch plus generic element emission.

use fern_template::{Element, Node, TextNode};
use rustc_hash::FxHashSet;

use crate::context::CompilationContext;
use crate::directives::{CreateOutcome, Handled};
use crate::error::CompileResult;
use crate::program::{AttrEmit, Line};
use crate::TemplateCompiler;

pub(crate) fn compile_node(
    cp: &TemplateCompiler,
    ctx: &CompilationContext,
    node: &Node,
) -> CompileResult<()> {
    match node {
        Node::Text(text) => compile_text(cp, ctx, text),
        Node::Element(el) => compile_element(cp, ctx, el),
    }
}

/// Blank-only text between elements is dropped; anything else keeps its
/// whitespace.
fn compile_text(
    cp: &TemplateCompiler,
    ctx: &CompilationContext,
    text: &TextNode,
) -> CompileResult<()> {
    if text.content.trim().is_empty() {
        return Ok(());
    }
    let pieces = cp.parse_pieces(ctx, &text.content)?;
    let var = ctx.generate_id();
    ctx.add_line(Line::Text { var, pieces });
    ctx.place_leaf(var)
}

fn compile_element(
    cp: &TemplateCompiler,
    ctx: &CompilationContext,
    el: &Element,
) -> CompileResult<()> {
    // Projection point: replay the caller's body. The caller frame is
    // cleared while compiling it so nested projection cannot recurse.
    if el.tag == "content" {
        if let Some(caller) = ctx.caller() {
            let sub = ctx.with_caller(None);
            for child in &caller.children {
                compile_node(cp, &sub, child)?;
            }
        }
        return Ok(());
    }

    let matches = cp.directives().matches_for(el);
    for (i, m) in matches.iter().enumerate() {
        let handled = m
            .directive
            .on_encounter(cp, ctx, el, &m.arg, &m.value)?;
        if handled == Handled::Stop {
            // Directives that already fired still close their blocks.
            for m in &matches[..=i] {
                m.directive.on_finalize(cp, ctx, el, &m.arg, &m.value)?;
            }
            return Ok(());
        }
    }

    // The inert wrapper tag groups children without emitting a node of its
    // own.
    if el.tag == "template" {
        for child in &el.children {
            compile_node(cp, ctx, child)?;
        }
        for m in &matches {
            m.directive.on_finalize(cp, ctx, el, &m.arg, &m.value)?;
        }
        return Ok(());
    }

    let claimed: FxHashSet<&str> = matches.iter().map(|m| m.attr.as_str()).collect();
    let var = ctx.generate_id();
    let mut attrs = Vec::new();
    let mut key = None;
    for (name, attr) in &el.attrs {
        if claimed.contains(name.as_str()) {
            continue;
        }
        if name == "key" {
            key = Some(cp.expr(ctx, &attr.value)?);
            continue;
        }
        if name == "attrs" {
            attrs.push(AttrEmit::Spread {
                expr: cp.expr(ctx, &attr.value)?,
            });
            continue;
        }
        if let Some(target) = name.strip_prefix("bind-") {
            attrs.push(AttrEmit::Dynamic {
                name: target.into(),
                expr: cp.expr(ctx, &attr.value)?,
            });
            continue;
        }
        if attr.value.contains("{{") {
            attrs.push(AttrEmit::Pieces {
                name: name.clone(),
                pieces: cp.parse_pieces(ctx, &attr.value)?,
            });
        } else {
            attrs.push(AttrEmit::Static {
                name: name.clone(),
                value: attr.value.clone(),
            });
        }
    }
    ctx.add_line(Line::Node {
        var,
        tag: el.tag.clone(),
        attrs,
        key,
    });

    let inner = ctx.with_parent(var)?;
    let mut outcome = CreateOutcome::default();
    for m in &matches {
        m.directive
            .on_create(cp, &inner, el, &m.arg, &m.value, var, &mut outcome)?;
    }
    if !outcome.skip_children {
        for child in &el.children {
            compile_node(cp, &inner, child)?;
        }
    }
    ctx.place(var);
    for m in &matches {
        m.directive.on_finalize(cp, ctx, el, &m.arg, &m.value)?;
    }
    Ok(())
}
