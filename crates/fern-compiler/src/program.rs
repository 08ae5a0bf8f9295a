//! Flat instruction stream and the structured render program it lowers
//! into.
//!
//! Directive dispatch emits `Line`s through the compilation context in the
//! order hooks fire. The driver then lowers the flat stream into a `Step`
//! tree, rejecting unbalanced block markers. The split keeps directive
//! implementations simple: opening a block is one line, closing it is
//! another, and structural mistakes surface as compile errors instead of
//! malformed programs.

use std::fmt::Write as _;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::{CompileError, CompileResult};
use crate::expr::Expr;

/// One segment of an interpolated string: raw text or a `{{ }}` hole.
#[derive(Debug, Clone)]
pub enum Piece {
    Static(String),
    Expr(Rc<Expr>),
}

/// How one attribute on an emitted element gets its value.
#[derive(Debug, Clone)]
pub enum AttrEmit {
    Static { name: SmolStr, value: String },
    Pieces { name: SmolStr, pieces: Vec<Piece> },
    Dynamic { name: SmolStr, expr: Rc<Expr> },
    Spread { expr: Rc<Expr> },
}

/// A conditional guard. `Content` is the guard used for expression text
/// with fallback children: it passes for truthy values and for numeric
/// zero, which still renders as "0".
#[derive(Debug, Clone)]
pub enum Cond {
    Expr(Rc<Expr>),
    Content(Rc<Expr>),
}

#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub node: u32,
    pub event: SmolStr,
    pub handler: SmolStr,
    pub args: Vec<Rc<Expr>>,
}

#[derive(Debug, Clone)]
pub struct WidgetSpec {
    /// Placeholder slot id, also the auto-key anchor.
    pub slot: u32,
    pub name: SmolStr,
    pub key: Option<Rc<Expr>>,
    pub props: Option<Rc<Expr>>,
    pub keep_alive: bool,
    /// Compiled under a foreach; the auto key must carry the loop path.
    pub in_loop: bool,
}

/// A flat program instruction as emitted during directive dispatch.
#[derive(Debug, Clone)]
pub enum Line {
    Node {
        var: u32,
        tag: SmolStr,
        attrs: Vec<AttrEmit>,
        key: Option<Rc<Expr>>,
    },
    Text {
        var: u32,
        pieces: Vec<Piece>,
    },
    EscText {
        var: u32,
        expr: Rc<Expr>,
        escaped: bool,
    },
    Append {
        parent: u32,
        child: u32,
    },
    Root {
        var: u32,
    },
    If {
        cond: Cond,
    },
    ElseIf {
        cond: Cond,
    },
    Else,
    EndIf,
    ForEach {
        source: Rc<Expr>,
        var_name: SmolStr,
    },
    EndFor,
    On(HandlerSpec),
    RefCapture {
        var: u32,
        pieces: Vec<Piece>,
    },
    Widget(WidgetSpec),
}

/// A structured program step after lowering.
#[derive(Debug, Clone)]
pub enum Step {
    Node {
        var: u32,
        tag: SmolStr,
        attrs: Vec<AttrEmit>,
        key: Option<Rc<Expr>>,
    },
    Text {
        var: u32,
        pieces: Vec<Piece>,
    },
    EscText {
        var: u32,
        expr: Rc<Expr>,
        escaped: bool,
    },
    Append {
        parent: u32,
        child: u32,
    },
    Root {
        var: u32,
    },
    If {
        branches: Vec<(Cond, Vec<Step>)>,
        fallback: Option<Vec<Step>>,
    },
    ForEach {
        source: Rc<Expr>,
        var_name: SmolStr,
        body: Vec<Step>,
    },
    On(HandlerSpec),
    RefCapture {
        var: u32,
        pieces: Vec<Piece>,
    },
    Widget(WidgetSpec),
}

/// A compiled template, ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct RenderProgram {
    pub template: SmolStr,
    pub steps: Vec<Step>,
    /// Loop bodies exist, so evaluation must shield the context object
    /// behind a child scope frame.
    pub protect_scope: bool,
    /// The program instantiates widgets and needs an owning component.
    pub needs_owner: bool,
}

enum FrameKind {
    Top,
    If(Cond),
    ElseIf(Cond),
    Else,
    For { source: Rc<Expr>, var_name: SmolStr },
}

struct LowerFrame {
    kind: FrameKind,
    steps: Vec<Step>,
}

/// Lowers the flat line stream into a step tree. Any block marker without
/// its counterpart is a structural error.
pub fn lower(lines: Vec<Line>) -> CompileResult<Vec<Step>> {
    let mut stack = vec![LowerFrame {
        kind: FrameKind::Top,
        steps: Vec::new(),
    }];
    for line in lines {
        match line {
            Line::If { cond } => stack.push(LowerFrame {
                kind: FrameKind::If(cond),
                steps: Vec::new(),
            }),
            Line::ElseIf { cond } => {
                require_open_chain(&stack, "elif")?;
                stack.push(LowerFrame {
                    kind: FrameKind::ElseIf(cond),
                    steps: Vec::new(),
                });
            }
            Line::Else => {
                require_open_chain(&stack, "else")?;
                stack.push(LowerFrame {
                    kind: FrameKind::Else,
                    steps: Vec::new(),
                });
            }
            Line::EndIf => {
                let frame = stack
                    .pop()
                    .filter(|_| stack.len() >= 1)
                    .ok_or_else(|| CompileError::bad_program("unmatched end of conditional"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| CompileError::bad_program("unmatched end of conditional"))?;
                match frame.kind {
                    FrameKind::If(cond) => parent.steps.push(Step::If {
                        branches: vec![(cond, frame.steps)],
                        fallback: None,
                    }),
                    FrameKind::ElseIf(cond) => match parent.steps.last_mut() {
                        Some(Step::If {
                            branches,
                            fallback: None,
                        }) => branches.push((cond, frame.steps)),
                        _ => {
                            return Err(CompileError::bad_program(
                                "elif branch does not follow a conditional",
                            ))
                        }
                    },
                    FrameKind::Else => match parent.steps.last_mut() {
                        Some(Step::If {
                            fallback: fallback @ None,
                            ..
                        }) => *fallback = Some(frame.steps),
                        _ => {
                            return Err(CompileError::bad_program(
                                "else branch does not follow a conditional",
                            ))
                        }
                    },
                    _ => {
                        return Err(CompileError::bad_program(
                            "end of conditional closes a non-conditional block",
                        ))
                    }
                }
            }
            Line::ForEach { source, var_name } => stack.push(LowerFrame {
                kind: FrameKind::For { source, var_name },
                steps: Vec::new(),
            }),
            Line::EndFor => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| CompileError::bad_program("unmatched end of loop"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| CompileError::bad_program("unmatched end of loop"))?;
                match frame.kind {
                    FrameKind::For { source, var_name } => parent.steps.push(Step::ForEach {
                        source,
                        var_name,
                        body: frame.steps,
                    }),
                    _ => {
                        return Err(CompileError::bad_program(
                            "end of loop closes a non-loop block",
                        ))
                    }
                }
            }
            Line::Node {
                var,
                tag,
                attrs,
                key,
            } => top(&mut stack).steps.push(Step::Node {
                var,
                tag,
                attrs,
                key,
            }),
            Line::Text { var, pieces } => top(&mut stack).steps.push(Step::Text { var, pieces }),
            Line::EscText { var, expr, escaped } => {
                top(&mut stack).steps.push(Step::EscText { var, expr, escaped })
            }
            Line::Append { parent, child } => {
                top(&mut stack).steps.push(Step::Append { parent, child })
            }
            Line::Root { var } => top(&mut stack).steps.push(Step::Root { var }),
            Line::On(spec) => top(&mut stack).steps.push(Step::On(spec)),
            Line::RefCapture { var, pieces } => {
                top(&mut stack).steps.push(Step::RefCapture { var, pieces })
            }
            Line::Widget(spec) => top(&mut stack).steps.push(Step::Widget(spec)),
        }
    }
    if stack.len() != 1 {
        return Err(CompileError::bad_program("unclosed block at end of program"));
    }
    let frame = stack.pop().ok_or_else(|| {
        CompileError::bad_program("unclosed block at end of program")
    })?;
    Ok(frame.steps)
}

fn top(stack: &mut [LowerFrame]) -> &mut LowerFrame {
    let last = stack.len() - 1;
    &mut stack[last]
}

/// An `elif`/`else` marker must extend the conditional that the sibling
/// list just closed at this nesting level.
fn require_open_chain(stack: &[LowerFrame], marker: &str) -> CompileResult<()> {
    let Some(frame) = stack.last() else {
        return Err(CompileError::bad_program(format!(
            "{marker} branch outside of any block"
        )));
    };
    match frame.steps.last() {
        Some(Step::If { fallback: None, .. }) => Ok(()),
        _ => Err(CompileError::bad_program(format!(
            "{marker} branch does not follow a conditional"
        ))),
    }
}

impl RenderProgram {
    /// Renders the program as indented text, mainly for snapshots and
    /// debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "program {}", self.template);
        dump_steps(&self.steps, 1, &mut out);
        out
    }
}

fn dump_steps(steps: &[Step], depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    for step in steps {
        match step {
            Step::Node { var, tag, key, .. } => {
                let _ = write!(out, "{pad}node v{var} <{tag}>");
                if let Some(key) = key {
                    let _ = write!(out, " key={key}");
                }
                out.push('\n');
            }
            Step::Text { var, .. } => {
                let _ = writeln!(out, "{pad}text v{var}");
            }
            Step::EscText { var, expr, escaped } => {
                let mode = if *escaped { "esc" } else { "raw" };
                let _ = writeln!(out, "{pad}{mode} v{var} {expr}");
            }
            Step::Append { parent, child } => {
                let _ = writeln!(out, "{pad}append v{child} -> v{parent}");
            }
            Step::Root { var } => {
                let _ = writeln!(out, "{pad}root v{var}");
            }
            Step::If { branches, fallback } => {
                for (i, (cond, body)) in branches.iter().enumerate() {
                    let label = if i == 0 { "if" } else { "elif" };
                    match cond {
                        Cond::Expr(expr) => {
                            let _ = writeln!(out, "{pad}{label} {expr}:");
                        }
                        Cond::Content(expr) => {
                            let _ = writeln!(out, "{pad}{label} has-content {expr}:");
                        }
                    }
                    dump_steps(body, depth + 1, out);
                }
                if let Some(body) = fallback {
                    let _ = writeln!(out, "{pad}else:");
                    dump_steps(body, depth + 1, out);
                }
            }
            Step::ForEach {
                source,
                var_name,
                body,
            } => {
                let _ = writeln!(out, "{pad}foreach {var_name} in {source}:");
                dump_steps(body, depth + 1, out);
            }
            Step::On(spec) => {
                let _ = writeln!(out, "{pad}on v{} {} -> {}", spec.node, spec.event, spec.handler);
            }
            Step::RefCapture { var, .. } => {
                let _ = writeln!(out, "{pad}ref v{var}");
            }
            Step::Widget(spec) => {
                let _ = writeln!(out, "{pad}widget v{} {}", spec.slot, spec.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorCode;
    use crate::expr::parse_expression;

    fn cond(source: &str) -> Cond {
        Cond::Expr(Rc::new(parse_expression(source).unwrap()))
    }

    #[test]
    fn lowers_chained_conditionals() {
        let lines = vec![
            Line::If { cond: cond("a") },
            Line::Root { var: 0 },
            Line::EndIf,
            Line::ElseIf { cond: cond("b") },
            Line::Root { var: 1 },
            Line::EndIf,
            Line::Else,
            Line::Root { var: 2 },
            Line::EndIf,
        ];
        let steps = lower(lines).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::If { branches, fallback } => {
                assert_eq!(branches.len(), 2);
                assert!(fallback.is_some());
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn unclosed_loop_is_a_bad_program() {
        let lines = vec![Line::ForEach {
            source: Rc::new(parse_expression("items").unwrap()),
            var_name: "item".into(),
        }];
        let err = lower(lines).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::BadProgram);
    }

    #[test]
    fn stray_else_is_a_bad_program() {
        let err = lower(vec![Line::Else, Line::EndIf]).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::BadProgram);
    }

    #[test]
    fn mismatched_closers_are_bad_programs() {
        let lines = vec![
            Line::If { cond: cond("a") },
            Line::EndFor,
        ];
        let err = lower(lines).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::BadProgram);
    }
}
