//! Template compilation and evaluation.
//!
//! The compiler turns registered templates into render programs on first
//! use and caches them. Compilation walks the element tree, dispatching
//! attribute directives in priority order; directives emit a flat
//! instruction stream through a shared compilation context, which is then
//! lowered into a structured program. Evaluation walks that program with
//! a scope chain over the rendering context and produces a view-node
//! tree, plus the widget requests and handler bindings the component
//! runtime consumes.

pub mod compile;
pub mod context;
pub mod directives;
pub mod error;
pub mod eval;
pub mod expr;
pub mod program;
pub mod scope;

use std::cell::RefCell;
use std::rc::Rc;

use fern_template::{Node, Template, TemplateRegistry, TemplateResult};
use fern_vdom::{Value, VNode};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::context::{Binding, CompilationContext, CompileSession};
use crate::directives::DirectiveRegistry;
use crate::expr::{parse_expression, Expr};
use crate::program::{lower, Piece, RenderProgram};

pub use crate::error::{
    CompileError, CompileErrorCode, CompileResult, RenderError, RenderErrorCode, RenderResult,
};
pub use crate::eval::{evaluate, RenderExtra, SlotKey, WidgetRequest};

static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

/// Compiler behavior switches.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Re-registering an existing template name becomes a no-op instead of
    /// an error.
    pub allow_duplicate_templates: bool,
}

/// The compiler driver: owns the template registry, the directive set, and
/// the per-template program cache.
pub struct TemplateCompiler {
    registry: TemplateRegistry,
    directives: DirectiveRegistry,
    options: CompilerOptions,
    programs: RefCell<FxHashMap<SmolStr, Rc<RenderProgram>>>,
    exprs: RefCell<FxHashMap<String, Rc<Expr>>>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        TemplateCompiler {
            registry: TemplateRegistry::new(),
            directives: DirectiveRegistry::builtin(),
            options,
            programs: RefCell::new(FxHashMap::default()),
            exprs: RefCell::new(FxHashMap::default()),
        }
    }

    /// Parse and register one template under a name.
    pub fn add_template(&mut self, name: &str, markup: &str) -> TemplateResult<()> {
        self.registry
            .add_template(name, markup, self.options.allow_duplicate_templates)
    }

    /// Register every child of a bundle document as a named template.
    pub fn load_bundle(&mut self, markup: &str) -> TemplateResult<()> {
        self.registry.load_bundle(markup)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    pub fn template_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.registry.templates()
    }

    pub fn directives_mut(&mut self) -> &mut DirectiveRegistry {
        &mut self.directives
    }

    pub(crate) fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    pub(crate) fn template(&self, name: &str) -> Option<&Template> {
        self.registry.get(name)
    }

    pub(crate) fn compile_node(&self, ctx: &CompilationContext, node: &Node) -> CompileResult<()> {
        compile::compile_node(self, ctx, node)
    }

    /// Compiles a template into its render program, reusing the cached
    /// program on later calls.
    pub fn compile(&self, name: &str) -> CompileResult<Rc<RenderProgram>> {
        if let Some(program) = self.programs.borrow().get(name) {
            return Ok(Rc::clone(program));
        }
        let template = self
            .registry
            .get(name)
            .ok_or_else(|| CompileError::unknown_template(name))?;
        let session = CompileSession::new(name);
        let ctx = CompilationContext::new(Rc::clone(&session));
        for root in &template.roots {
            self.compile_node(&ctx, root)?;
        }
        if session.root().is_none() {
            return Err(CompileError::missing_root(name));
        }
        let steps = lower(session.take_lines())?;
        let program = Rc::new(RenderProgram {
            template: SmolStr::new(name),
            steps,
            protect_scope: session.protect_scope(),
            needs_owner: session.needs_owner(),
        });
        self.programs
            .borrow_mut()
            .insert(SmolStr::new(name), Rc::clone(&program));
        Ok(program)
    }

    /// Compiles (if needed) and evaluates a template against a context
    /// value.
    pub fn render(
        &self,
        name: &str,
        context: &Value,
        extra: &mut RenderExtra,
    ) -> RenderResult<VNode> {
        let program = self.compile(name)?;
        evaluate(&program, context, extra)
    }

    /// Resolves a raw attribute expression: whole-identifier references to
    /// compile-time variables substitute their bound expression first, then
    /// the result is parsed, with parses cached by source text.
    pub(crate) fn expr(&self, ctx: &CompilationContext, raw: &str) -> CompileResult<Rc<Expr>> {
        let mut source = raw.trim().to_string();
        let mut hops = 0u32;
        while is_identifier(&source) {
            match ctx.get_value(&source) {
                Some(Binding::Expr(expanded)) => {
                    hops += 1;
                    let expanded = expanded.trim().to_string();
                    if hops > 32 || expanded == source {
                        return Err(CompileError::bad_expression(raw, "cyclic variable binding"));
                    }
                    source = expanded;
                }
                Some(Binding::Nodes(_)) => {
                    return Err(CompileError::bad_expression(
                        raw,
                        "variable holds captured markup, not an expression",
                    ))
                }
                None => break,
            }
        }
        if let Some(cached) = self.exprs.borrow().get(&source) {
            return Ok(Rc::clone(cached));
        }
        let parsed = parse_expression(&source)
            .map_err(|detail| CompileError::bad_expression(raw, detail))?;
        let parsed = Rc::new(parsed);
        self.exprs
            .borrow_mut()
            .insert(source, Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Splits text containing `{{ }}` holes into static and expression
    /// pieces.
    pub(crate) fn parse_pieces(
        &self,
        ctx: &CompilationContext,
        raw: &str,
    ) -> CompileResult<Vec<Piece>> {
        let mut pieces = Vec::new();
        let mut cursor = 0;
        for captures in INTERPOLATION.captures_iter(raw) {
            let whole = captures.get(0).map(|m| (m.start(), m.end()));
            let inner = captures.get(1).map(|m| m.as_str());
            if let (Some((start, end)), Some(inner)) = (whole, inner) {
                if start > cursor {
                    pieces.push(Piece::Static(raw[cursor..start].to_string()));
                }
                pieces.push(Piece::Expr(self.expr(ctx, inner)?));
                cursor = end;
            }
        }
        if cursor < raw.len() {
            pieces.push(Piece::Static(raw[cursor..].to_string()));
        }
        Ok(pieces)
    }
}

fn is_identifier(source: &str) -> bool {
    let mut chars = source.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use fern_vdom::json;
    use pretty_assertions::assert_eq;

    fn compiler(templates: &[(&str, &str)]) -> TemplateCompiler {
        let mut cp = TemplateCompiler::new();
        for (name, markup) in templates {
            cp.add_template(name, markup).unwrap();
        }
        cp
    }

    fn render(cp: &TemplateCompiler, name: &str, context: Value) -> VNode {
        cp.render(name, &context, &mut RenderExtra::new()).unwrap()
    }

    #[test]
    fn interpolated_text_with_missing_lookup() {
        let cp = compiler(&[("greet", "<span>Hello {{ name }}</span>")]);
        let node = render(&cp, "greet", json!({ "name": "Ann" }));
        assert_eq!(node.text_content(), "Hello Ann");
        // Unbound names render as empty text.
        let node = render(&cp, "greet", json!({}));
        assert_eq!(node.text_content(), "Hello ");
    }

    #[test]
    fn rendering_twice_is_identical() {
        let cp = compiler(&[(
            "list",
            r#"<ul><li foreach="items" as="it">{{ it }}:{{ it_index }}</li></ul>"#,
        )]);
        let context = json!({ "items": ["a", "b"] });
        let first = render(&cp, "list", context.clone());
        let second = render(&cp, "list", context);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
        assert_eq!(first.text_content(), "a:0b:1");
    }

    #[test]
    fn loop_exposes_derived_bindings() {
        let cp = compiler(&[(
            "flags",
            r#"<p foreach="items" as="x">{{ x_first }} {{ x_last }} {{ x_parity }}</p>"#,
        )]);
        let node = render(
            &cp,
            "flags",
            json!({ "items": [10] }),
        );
        assert_eq!(node.text_content(), "true true even");
    }

    #[test]
    fn loop_over_number_and_object() {
        let cp = compiler(&[
            ("count", r#"<p><span foreach="3" as="n">{{ n }}</span></p>"#),
            (
                "entries",
                r#"<p><span foreach="obj" as="k">{{ k }}={{ k_value }}</span></p>"#,
            ),
        ]);
        assert_eq!(render(&cp, "count", json!({})).text_content(), "012");
        let node = render(&cp, "entries", json!({ "obj": { "a": 1, "b": 2 } }));
        assert_eq!(node.text_content(), "a=1b=2");
    }

    #[test]
    fn loop_over_null_fails_at_render_time() {
        let cp = compiler(&[("bad", r#"<p><span foreach="missing"/></p>"#)]);
        let err = cp
            .render("bad", &json!({}), &mut RenderExtra::new())
            .unwrap_err();
        assert_eq!(err.code, RenderErrorCode::InvalidLoopExpression);
    }

    #[test]
    fn conditional_chain_picks_one_branch() {
        let cp = compiler(&[(
            "grade",
            r#"<div><span if="n > 10">big</span><span elif="n > 5">mid</span><span else="">small</span></div>"#,
        )]);
        assert_eq!(render(&cp, "grade", json!({ "n": 20 })).text_content(), "big");
        assert_eq!(render(&cp, "grade", json!({ "n": 7 })).text_content(), "mid");
        assert_eq!(render(&cp, "grade", json!({ "n": 1 })).text_content(), "small");
    }

    #[test]
    fn two_root_elements_fail_to_compile() {
        let cp = compiler(&[("twin", "<div/><div/>")]);
        let err = cp.compile("twin").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::MoreThanOneRoot);
    }

    #[test]
    fn unknown_template_fails() {
        let cp = compiler(&[]);
        let err = cp.compile("ghost").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::UnknownTemplate);
    }

    #[test]
    fn bad_expression_fails_at_compile_time() {
        let cp = compiler(&[("broken", r#"<p esc="'oops"/>"#)]);
        let err = cp.compile("broken").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::BadExpression);
    }

    #[test]
    fn esc_escapes_and_raw_does_not() {
        let cp = compiler(&[
            ("safe", r#"<p esc="html"/>"#),
            ("unsafe", r#"<p raw="html"/>"#),
        ]);
        let context = json!({ "html": "<b>x</b>" });
        let safe = render(&cp, "safe", context.clone());
        assert_eq!(safe.text_content(), "&lt;b&gt;x&lt;/b&gt;");
        let raw = render(&cp, "unsafe", context);
        assert_eq!(raw.text_content(), "<b>x</b>");
    }

    #[test]
    fn esc_fallback_children_and_zero() {
        let cp = compiler(&[("maybe", r#"<p esc="v">fallback</p>"#)]);
        assert_eq!(
            render(&cp, "maybe", json!({ "v": 0 })).text_content(),
            "0"
        );
        assert_eq!(
            render(&cp, "maybe", json!({})).text_content(),
            "fallback"
        );
    }

    #[test]
    fn raw_inside_esc_fallback_is_escaped() {
        let cp = compiler(&[(
            "guarded",
            r#"<p esc="v"><span raw="html">x</span></p>"#,
        )]);
        let node = render(&cp, "guarded", json!({ "html": "<b>x</b>" }));
        assert_eq!(node.text_content(), "&lt;b&gt;x&lt;/b&gt;");
    }

    #[test]
    fn esc_on_inert_template_tag() {
        let cp = compiler(&[("inline", r#"<p>a <template esc="x"/> b</p>"#)]);
        let node = render(&cp, "inline", json!({ "x": "mid" }));
        assert_eq!(node.text_content(), "a mid b");
    }

    #[test]
    fn set_binds_for_later_siblings() {
        let cp = compiler(&[(
            "vars",
            r#"<div><template set="greeting" value="'hi ' + name"/><p esc="greeting"/></div>"#,
        )]);
        let node = render(&cp, "vars", json!({ "name": "Bo" }));
        assert_eq!(node.text_content(), "hi Bo");
    }

    #[test]
    fn call_inlines_and_projects_content() {
        let cp = compiler(&[
            ("frame", r#"<section class="frame"><content/></section>"#),
            ("page", r#"<div call="frame"><p>inside</p></div>"#),
        ]);
        let node = render(&cp, "page", json!({}));
        let el = node.as_element().unwrap();
        assert_eq!(el.tag, "section");
        assert_eq!(node.text_content(), "inside");
    }

    #[test]
    fn call_to_unknown_template_fails() {
        let cp = compiler(&[("page", r#"<div call="nowhere"/>"#)]);
        let err = cp.compile("page").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::UnknownTemplate);
    }

    #[test]
    fn dynamic_and_spread_attributes() {
        let cp = compiler(&[(
            "attrs",
            r#"<div class="static" bind-class="extra" bind-hidden="off" attrs="rest"/>"#,
        )]);
        let node = render(
            &cp,
            "attrs",
            json!({ "extra": "live", "off": false, "rest": { "title": "t" } }),
        );
        let el = node.as_element().unwrap();
        assert_eq!(el.attrs.get("class").map(String::as_str), Some("static live"));
        assert!(!el.attrs.contains_key("hidden"));
        assert_eq!(el.attrs.get("title").map(String::as_str), Some("t"));
    }

    #[test]
    fn spread_accepts_name_value_pairs() {
        let cp = compiler(&[("attrs", r#"<div attrs="rest"/>"#)]);
        let node = render(
            &cp,
            "attrs",
            json!({ "rest": [["title", "t"], ["role", "note"]] }),
        );
        let el = node.as_element().unwrap();
        assert_eq!(el.attrs.get("title").map(String::as_str), Some("t"));
        assert_eq!(el.attrs.get("role").map(String::as_str), Some("note"));
    }

    #[test]
    fn element_key_becomes_reconciliation_key() {
        let cp = compiler(&[("keyed", r#"<li key="id">x</li>"#)]);
        let node = render(&cp, "keyed", json!({ "id": 7 }));
        assert_eq!(
            node.as_element().unwrap().key,
            Some(fern_vdom::KeyValue::Int(7))
        );
    }

    #[test]
    fn handlers_are_memoized_across_renders() {
        let cp = compiler(&[(
            "btn",
            r#"<button on-click="bump(step)">+</button>"#,
        )]);
        let mut extra = RenderExtra::new();
        let first = cp.render("btn", &json!({ "step": 2 }), &mut extra).unwrap();
        let second = cp.render("btn", &json!({ "step": 5 }), &mut extra).unwrap();
        let h1 = &first.as_element().unwrap().handlers[0];
        let h2 = &second.as_element().unwrap().handlers[0];
        assert!(Rc::ptr_eq(h1, h2));
        // Arguments froze at first materialization.
        assert_eq!(h2.args, vec![json!(2)]);
        assert_eq!(h2.handler, "bump");
        assert_eq!(h2.event, "click");
    }

    #[test]
    fn widget_requests_with_auto_and_explicit_keys() {
        let cp = compiler(&[(
            "board",
            r#"<div><template foreach="cards" as="c"><template widget="Card" props="{ card: c }"/></template><template widget="Footer" key="'footer'"/><template widget="Side"/></div>"#,
        )]);
        let mut extra = RenderExtra::new();
        let node = cp
            .render("board", &json!({ "cards": [1, 2] }), &mut extra)
            .unwrap();
        assert_eq!(extra.widgets.len(), 4);
        match &extra.widgets[0].key {
            SlotKey::Auto { path, .. } => assert_eq!(path, &vec![0]),
            other => panic!("unexpected key: {other:?}"),
        }
        match &extra.widgets[1].key {
            SlotKey::Auto { path, .. } => assert_eq!(path, &vec![1]),
            other => panic!("unexpected key: {other:?}"),
        }
        assert_eq!(extra.widgets[0].props, json!({ "card": 1 }));
        assert!(matches!(
            extra.widgets[2].key,
            SlotKey::Explicit(fern_vdom::KeyValue::Str(ref s)) if s == "footer"
        ));
        // An auto key outside any loop carries no path.
        match &extra.widgets[3].key {
            SlotKey::Auto { path, .. } => assert!(path.is_empty()),
            other => panic!("unexpected key: {other:?}"),
        }
        // Slots appear as placeholders in the tree.
        let el = node.as_element().unwrap();
        assert_eq!(el.children.len(), 4);
        assert!(matches!(el.children[2], VNode::Slot(_)));
        let program = cp.compile("board").unwrap();
        assert!(program.needs_owner);
    }

    #[test]
    fn ref_captures_use_interpolated_names() {
        let cp = compiler(&[(
            "grid",
            r#"<div><span foreach="items" as="it" ref="cell-{{ it_index }}"/></div>"#,
        )]);
        let node = render(&cp, "grid", json!({ "items": ["a", "b"] }));
        let el = node.as_element().unwrap();
        let names: Vec<_> = el
            .children
            .iter()
            .filter_map(|c| c.as_element())
            .flat_map(|c| c.hooks.iter())
            .map(|hook| match hook {
                fern_vdom::Hook::Ref(name) => name.clone(),
                other => panic!("unexpected hook: {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["cell-0", "cell-1"]);
    }

    #[test]
    fn attribute_order_does_not_change_the_program() {
        // Dispatch runs in priority order, so the conditional closes after
        // the handler binding no matter how the markup orders the two.
        let cp = compiler(&[
            ("a", r#"<div><span if="ok" on-click="go()">x</span></div>"#),
            ("b", r#"<div><span on-click="go()" if="ok">x</span></div>"#),
        ]);
        let a = cp.compile("a").unwrap().dump();
        let b = cp.compile("b").unwrap().dump();
        assert_eq!(
            a.lines().skip(1).collect::<Vec<_>>(),
            b.lines().skip(1).collect::<Vec<_>>()
        );
    }

    #[test]
    fn dump_reflects_program_shape() {
        let cp = compiler(&[(
            "shape",
            r#"<div><p if="ok">y</p><p else="">n</p></div>"#,
        )]);
        let dump = cp.compile("shape").unwrap().dump();
        assert!(dump.contains("program shape"));
        assert!(dump.contains("if scope.ok:"));
        assert!(dump.contains("else:"));
    }
}
