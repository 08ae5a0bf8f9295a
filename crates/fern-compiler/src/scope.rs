use fern_vdom::{is_truthy, Value};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::expr::{BinOp, Expr, UnaryOp};

/// A frame in the rendering scope chain. Lookups fall through local
/// bindings, then parent frames, then the rendering context object at the
/// base of the chain. Loop bodies evaluate in a child frame so bindings
/// never leak back into the context object.
pub struct Scope<'a> {
    base: Option<&'a Value>,
    locals: FxHashMap<SmolStr, Value>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root(context: &'a Value) -> Self {
        Scope {
            base: Some(context),
            locals: FxHashMap::default(),
            parent: None,
        }
    }

    pub fn child(&'a self) -> Scope<'a> {
        Scope {
            base: None,
            locals: FxHashMap::default(),
            parent: Some(self),
        }
    }

    pub fn bind(&mut self, name: impl Into<SmolStr>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.locals.get(name) {
            return value.clone();
        }
        if let Some(parent) = self.parent {
            return parent.lookup(name);
        }
        if let Some(Value::Object(map)) = self.base {
            if let Some(value) = map.get(name) {
                return value.clone();
            }
        }
        Value::Null
    }
}

pub fn eval(expr: &Expr, scope: &Scope) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Scope(name) => scope.lookup(name),
        Expr::Member(target, name) => member(&eval(target, scope), name),
        Expr::Index(target, index) => {
            let target = eval(target, scope);
            match eval(index, scope) {
                Value::Number(n) => n
                    .as_f64()
                    .and_then(|f| {
                        let i = f as usize;
                        target.as_array().and_then(|items| items.get(i)).cloned()
                    })
                    .unwrap_or(Value::Null),
                Value::String(key) => member(&target, &key),
                _ => Value::Null,
            }
        }
        Expr::Unary(op, inner) => {
            let value = eval(inner, scope);
            match op {
                UnaryOp::Not => Value::Bool(!is_truthy(&value)),
                UnaryOp::Neg => as_number(&value)
                    .and_then(|n| serde_json::Number::from_f64(-n))
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            // Boolean operators short-circuit and yield the operand value.
            match op {
                BinOp::And => {
                    let left = eval(lhs, scope);
                    if is_truthy(&left) {
                        return eval(rhs, scope);
                    }
                    return left;
                }
                BinOp::Or => {
                    let left = eval(lhs, scope);
                    if is_truthy(&left) {
                        return left;
                    }
                    return eval(rhs, scope);
                }
                _ => {}
            }
            binary(*op, &eval(lhs, scope), &eval(rhs, scope))
        }
        Expr::Ternary(cond, then, otherwise) => {
            if is_truthy(&eval(cond, scope)) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Array(items) => Value::Array(items.iter().map(|item| eval(item, scope)).collect()),
        Expr::Object(pairs) => {
            let mut map = fern_vdom::Map::new();
            for (key, value) in pairs {
                map.insert(key.to_string(), eval(value, scope));
            }
            Value::Object(map)
        }
    }
}

fn member(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::String(s) if name == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Value::Number(_), Value::Number(_)) => numeric(lhs, rhs, |a, b| a + b),
            // String concatenation when either side is not a number.
            _ => Value::String(format!(
                "{}{}",
                fern_vdom::display(lhs),
                fern_vdom::display(rhs)
            )),
        },
        BinOp::Sub => numeric(lhs, rhs, |a, b| a - b),
        BinOp::Mul => numeric(lhs, rhs, |a, b| a * b),
        BinOp::Div => numeric(lhs, rhs, |a, b| a / b),
        BinOp::Mod => numeric(lhs, rhs, |a, b| a % b),
        BinOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinOp::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        BinOp::Lt => compare(lhs, rhs, |ord| ord == std::cmp::Ordering::Less),
        BinOp::Le => compare(lhs, rhs, |ord| ord != std::cmp::Ordering::Greater),
        BinOp::Gt => compare(lhs, rhs, |ord| ord == std::cmp::Ordering::Greater),
        BinOp::Ge => compare(lhs, rhs, |ord| ord != std::cmp::Ordering::Less),
        BinOp::And | BinOp::Or => Value::Null,
    }
}

fn numeric(lhs: &Value, rhs: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (as_number(lhs), as_number(rhs)) {
        (Some(a), Some(b)) => serde_json::Number::from_f64(f(a, b))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ord = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (as_number(lhs), as_number(rhs)) {
            (Some(a), Some(b)) => match a.partial_cmp(&b) {
                Some(ord) => ord,
                None => return Value::Bool(false),
            },
            _ => return Value::Bool(false),
        },
    };
    Value::Bool(f(ord))
}
