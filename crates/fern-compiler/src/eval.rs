//! Render-program evaluation.
//!
//! Evaluation walks the structured step tree with a scope chain rooted at
//! the rendering context object, builds the view-node tree, and records
//! the side channel the component runtime needs: widget instantiation
//! requests and memoized event handler bindings.

use std::cell::RefCell;
use std::rc::Rc;

use fern_vdom::{
    display, escape_html, is_content, is_nullish, is_truthy, json, BoundHandler, Hook, KeyValue,
    VElement, VNode, Value,
};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::{RenderError, RenderResult};
use crate::program::{AttrEmit, Cond, Piece, RenderProgram, Step};
use crate::scope::{eval as eval_expr, Scope};

/// Identity of a widget slot within its parent, used to match child
/// component instances across renders. Auto keys anchor on the compiled
/// node id plus the stack of loop indices leading to the slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Explicit(KeyValue),
    Auto { node: u32, path: Vec<u32> },
}

/// A child component the evaluated program wants instantiated at a slot
/// placeholder.
#[derive(Debug, Clone)]
pub struct WidgetRequest {
    pub slot: u32,
    pub name: SmolStr,
    pub key: SlotKey,
    pub props: Value,
    pub keep_alive: bool,
}

/// Per-render side channel. The handler map outlives single renders: it is
/// owned by the component instance so bindings keep a stable identity for
/// the patcher to compare.
#[derive(Default)]
pub struct RenderExtra {
    pub handlers: Rc<RefCell<FxHashMap<u32, Rc<BoundHandler>>>>,
    pub widgets: Vec<WidgetRequest>,
}

impl RenderExtra {
    pub fn new() -> Self {
        RenderExtra::default()
    }

    pub fn with_handlers(handlers: Rc<RefCell<FxHashMap<u32, Rc<BoundHandler>>>>) -> Self {
        RenderExtra {
            handlers,
            widgets: Vec::new(),
        }
    }
}

pub fn evaluate(
    program: &RenderProgram,
    context: &Value,
    extra: &mut RenderExtra,
) -> RenderResult<VNode> {
    let mut evaluator = Evaluator {
        nodes: FxHashMap::default(),
        root: None,
        loop_path: Vec::new(),
        extra,
    };
    let scope = Scope::root(context);
    evaluator.run(&program.steps, &scope)?;
    // A root behind a false conditional renders as nothing.
    Ok(evaluator.root.take().unwrap_or(VNode::Text(String::new())))
}

struct Evaluator<'a> {
    nodes: FxHashMap<u32, VNode>,
    root: Option<VNode>,
    loop_path: Vec<u32>,
    extra: &'a mut RenderExtra,
}

impl Evaluator<'_> {
    fn run(&mut self, steps: &[Step], scope: &Scope) -> RenderResult<()> {
        for step in steps {
            match step {
                Step::Node {
                    var,
                    tag,
                    attrs,
                    key,
                } => {
                    let mut el = VElement::new(tag.clone());
                    for attr in attrs {
                        self.apply_attr(&mut el, attr, scope);
                    }
                    if let Some(key) = key {
                        el.key = Some(KeyValue::from_value(&eval_expr(key, scope)));
                    }
                    self.nodes.insert(*var, VNode::Element(el));
                }
                Step::Text { var, pieces } => {
                    let content = render_pieces(pieces, scope);
                    self.nodes.insert(*var, VNode::Text(content));
                }
                Step::EscText { var, expr, escaped } => {
                    let value = eval_expr(expr, scope);
                    let node = if *escaped {
                        VNode::Text(escape_html(&display(&value)))
                    } else {
                        VNode::Fragment(display(&value))
                    };
                    self.nodes.insert(*var, node);
                }
                Step::Append { parent, child } => {
                    if let Some(node) = self.nodes.remove(child) {
                        if let Some(VNode::Element(el)) = self.nodes.get_mut(parent) {
                            el.children.push(node);
                        }
                    }
                }
                Step::Root { var } => {
                    if let Some(node) = self.nodes.remove(var) {
                        self.root.get_or_insert(node);
                    }
                }
                Step::If { branches, fallback } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        let pass = match cond {
                            Cond::Expr(expr) => is_truthy(&eval_expr(expr, scope)),
                            Cond::Content(expr) => is_content(&eval_expr(expr, scope)),
                        };
                        if pass {
                            self.run(body, scope)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        if let Some(body) = fallback {
                            self.run(body, scope)?;
                        }
                    }
                }
                Step::ForEach {
                    source,
                    var_name,
                    body,
                } => {
                    self.run_loop(source, var_name, body, scope)?;
                }
                Step::On(spec) => {
                    let handler = {
                        let mut handlers = self.extra.handlers.borrow_mut();
                        match handlers.get(&spec.node) {
                            Some(existing) => Rc::clone(existing),
                            None => {
                                let bound = Rc::new(BoundHandler {
                                    node: spec.node,
                                    event: spec.event.clone(),
                                    handler: spec.handler.clone(),
                                    args: spec
                                        .args
                                        .iter()
                                        .map(|arg| eval_expr(arg, scope))
                                        .collect(),
                                });
                                handlers.insert(spec.node, Rc::clone(&bound));
                                bound
                            }
                        }
                    };
                    if let Some(VNode::Element(el)) = self.nodes.get_mut(&spec.node) {
                        el.handlers.push(handler);
                    }
                }
                Step::RefCapture { var, pieces } => {
                    let name = render_pieces(pieces, scope);
                    if let Some(VNode::Element(el)) = self.nodes.get_mut(var) {
                        el.hooks.push(Hook::Ref(name));
                    }
                }
                Step::Widget(spec) => {
                    let key = match &spec.key {
                        Some(expr) => {
                            SlotKey::Explicit(KeyValue::from_value(&eval_expr(expr, scope)))
                        }
                        None => SlotKey::Auto {
                            node: spec.slot,
                            path: if spec.in_loop {
                                self.loop_path.clone()
                            } else {
                                Vec::new()
                            },
                        },
                    };
                    let props = match &spec.props {
                        Some(expr) => eval_expr(expr, scope),
                        None => json!({}),
                    };
                    self.extra.widgets.push(WidgetRequest {
                        slot: spec.slot,
                        name: spec.name.clone(),
                        key,
                        props,
                        keep_alive: spec.keep_alive,
                    });
                    self.nodes.insert(spec.slot, VNode::Slot(spec.slot));
                }
            }
        }
        Ok(())
    }

    fn run_loop(
        &mut self,
        source: &crate::expr::Expr,
        var_name: &str,
        body: &[Step],
        scope: &Scope,
    ) -> RenderResult<()> {
        let value = eval_expr(source, scope);
        let (items, values): (Vec<Value>, Option<Vec<Value>>) = match &value {
            Value::Number(n) => {
                let count = n.as_f64().unwrap_or(0.0).max(0.0) as i64;
                ((0..count).map(Value::from).collect(), None)
            }
            Value::Array(items) => (items.clone(), None),
            Value::Object(map) => (
                map.keys().map(|k| Value::String(k.clone())).collect(),
                Some(map.values().cloned().collect()),
            ),
            other => {
                return Err(RenderError::invalid_loop(format!(
                    "cannot iterate over {}",
                    kind_name(other)
                )))
            }
        };
        let last = items.len().saturating_sub(1);
        for (index, item) in items.into_iter().enumerate() {
            let mut frame = scope.child();
            frame.bind(SmolStr::new(var_name), item);
            frame.bind(format!("{var_name}_index").as_str(), Value::from(index));
            frame.bind(
                format!("{var_name}_first").as_str(),
                Value::Bool(index == 0),
            );
            frame.bind(
                format!("{var_name}_last").as_str(),
                Value::Bool(index == last),
            );
            frame.bind(
                format!("{var_name}_parity").as_str(),
                Value::String(if index % 2 == 0 { "even" } else { "odd" }.to_string()),
            );
            if let Some(values) = &values {
                frame.bind(
                    format!("{var_name}_value").as_str(),
                    values[index].clone(),
                );
            }
            self.loop_path.push(index as u32);
            let result = self.run(body, &frame);
            self.loop_path.pop();
            result?;
        }
        Ok(())
    }

    fn apply_attr(&mut self, el: &mut VElement, attr: &AttrEmit, scope: &Scope) {
        match attr {
            AttrEmit::Static { name, value } => el.merge_attr(name, value),
            AttrEmit::Pieces { name, pieces } => {
                let value = render_pieces(pieces, scope);
                el.merge_attr(name, &value);
            }
            AttrEmit::Dynamic { name, expr } => {
                apply_dynamic_attr(el, name, &eval_expr(expr, scope));
            }
            AttrEmit::Spread { expr } => match eval_expr(expr, scope) {
                Value::Object(map) => {
                    for (name, value) in map {
                        apply_dynamic_attr(el, &name, &value);
                    }
                }
                // An array spreads as [name, value] pairs.
                Value::Array(pairs) => {
                    for pair in pairs {
                        if let Value::Array(kv) = pair {
                            if let [Value::String(name), value] = &kv[..] {
                                apply_dynamic_attr(el, name, value);
                            }
                        }
                    }
                }
                _ => {}
            },
        }
    }
}

/// Nullish and `false` omit the attribute, `true` emits it bare.
fn apply_dynamic_attr(el: &mut VElement, name: &str, value: &Value) {
    if is_nullish(value) {
        return;
    }
    match value {
        Value::Bool(false) => {}
        Value::Bool(true) => el.merge_attr(name, ""),
        other => el.merge_attr(name, &display(other)),
    }
}

fn render_pieces(pieces: &[Piece], scope: &Scope) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Static(text) => out.push_str(text),
            Piece::Expr(expr) => out.push_str(&display(&eval_expr(expr, scope))),
        }
    }
    out
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
