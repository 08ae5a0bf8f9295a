use std::collections::HashSet;

use fern_vdom::Value;
use once_cell::sync::Lazy;
use smol_str::SmolStr;

/// Identifiers that keep their literal meaning instead of becoming scope
/// lookups.
static RESERVED: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["true", "false", "null", "undefined"]));

/// A parsed template expression. Expressions form a small closed dialect:
/// literals, scope lookups, member and index access, arithmetic,
/// comparisons, boolean logic, ternaries, and array/object literals.
/// Function calls are rejected here; event handlers split their argument
/// list before parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A free identifier, resolved against the rendering scope chain.
    Scope(SmolStr),
    Member(Box<Expr>, SmolStr),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(SmolStr, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Scope(name) => write!(f, "scope.{name}"),
            Expr::Member(target, name) => write!(f, "{target}.{name}"),
            Expr::Index(target, index) => write!(f, "{target}[{index}]"),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "!{inner}"),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-{inner}"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.as_str()),
            Expr::Ternary(cond, then, otherwise) => {
                write!(f, "({cond} ? {then} : {otherwise})")
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Object(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    /// Identifier in member or key position, or a reserved word.
    Ident(SmolStr),
    /// Identifier rewritten to a scope lookup.
    Scope(SmolStr),
    Punct(&'static str),
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_string(&mut self, quote: u8) -> Result<String, String> {
        self.pos += 1;
        let mut out = String::new();
        while let Some(b) = self.peek() {
            if b == quote {
                self.pos += 1;
                return Ok(out);
            }
            if b == b'\\' {
                self.pos += 1;
                // The escaped character may be multi-byte.
                match self.source[self.pos..].chars().next() {
                    Some('n') => {
                        out.push('\n');
                        self.pos += 1;
                    }
                    Some('t') => {
                        out.push('\t');
                        self.pos += 1;
                    }
                    Some(ch) => {
                        out.push(ch);
                        self.pos += ch.len_utf8();
                    }
                    None => break,
                }
            } else {
                let ch = self.source[self.pos..]
                    .chars()
                    .next()
                    .ok_or_else(|| "invalid character".to_string())?;
                out.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn read_number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        self.source[start..self.pos]
            .parse::<f64>()
            .map_err(|_| format!("invalid number `{}`", &self.source[start..self.pos]))
    }

    fn read_ident(&mut self) -> SmolStr {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
        {
            self.pos += 1;
        }
        SmolStr::new(&self.source[start..self.pos])
    }

    /// Next non-whitespace byte without consuming anything.
    fn peek_significant(&self) -> Option<u8> {
        let mut pos = self.pos;
        while matches!(self.bytes.get(pos), Some(b) if b.is_ascii_whitespace()) {
            pos += 1;
        }
        self.bytes.get(pos).copied()
    }
}

/// Tokenizes an expression, rewriting free identifiers into scope lookups.
/// An identifier stays literal when it is reserved, follows a `.`, or sits
/// in key position of an object literal.
fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut brace_depth = 0u32;
    loop {
        lexer.skip_whitespace();
        let Some(b) = lexer.peek() else { break };
        match b {
            b'\'' | b'"' => {
                let value = lexer.read_string(b)?;
                tokens.push(Token::Str(value));
            }
            b'0'..=b'9' => tokens.push(Token::Num(lexer.read_number()?)),
            b if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => {
                let name = lexer.read_ident();
                let after_dot = matches!(tokens.last(), Some(Token::Punct(".")));
                let key_position = brace_depth > 0
                    && matches!(tokens.last(), Some(Token::Punct("{" | ",")))
                    && lexer.peek_significant() == Some(b':');
                if after_dot || key_position || RESERVED.contains(name.as_str()) {
                    tokens.push(Token::Ident(name));
                } else {
                    tokens.push(Token::Scope(name));
                }
            }
            _ => {
                let rest = &lexer.source[lexer.pos..];
                let punct = ["===", "!==", "==", "!=", "<=", ">=", "&&", "||"]
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .copied()
                    .or_else(|| {
                        let single = [
                            "+", "-", "*", "/", "%", "!", "?", ":", ".", ",", "(", ")", "[", "]",
                            "{", "}", "<", ">",
                        ];
                        single.iter().find(|op| rest.starts_with(**op)).copied()
                    })
                    .ok_or_else(|| format!("unexpected character `{}`", b as char))?;
                match punct {
                    "{" => brace_depth += 1,
                    "}" => brace_depth = brace_depth.saturating_sub(1),
                    _ => {}
                }
                lexer.pos += punct.len();
                tokens.push(Token::Punct(punct));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &'static str) -> Result<(), String> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(format!("expected `{punct}`"))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let cond = self.parse_binary(0)?;
        if self.eat_punct("?") {
            let then = self.parse_expr()?;
            self.expect_punct(":")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn binding_power(punct: &str) -> Option<(u8, BinOp)> {
        let entry = match punct {
            "||" => (1, BinOp::Or),
            "&&" => (2, BinOp::And),
            "==" | "===" => (3, BinOp::Eq),
            "!=" | "!==" => (3, BinOp::Ne),
            "<" => (4, BinOp::Lt),
            "<=" => (4, BinOp::Le),
            ">" => (4, BinOp::Gt),
            ">=" => (4, BinOp::Ge),
            "+" => (5, BinOp::Add),
            "-" => (5, BinOp::Sub),
            "*" => (6, BinOp::Mul),
            "/" => (6, BinOp::Div),
            "%" => (6, BinOp::Mod),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_binary(&mut self, min_power: u8) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Punct(punct)) = self.peek() {
            let Some((power, op)) = Self::binding_power(punct) else {
                break;
            };
            if power < min_power {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(power + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat_punct("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        if self.eat_punct("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                match self.advance() {
                    Some(Token::Ident(name)) | Some(Token::Scope(name)) => {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    _ => return Err("expected member name after `.`".to_string()),
                }
            } else if self.eat_punct("[") {
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if matches!(self.peek(), Some(Token::Punct("("))) {
                return Err("function calls are not supported in expressions".to_string());
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Scope(name)) => Ok(Expr::Scope(name)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                other => Err(format!("unexpected identifier `{other}`")),
            },
            Some(Token::Punct("(")) => {
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some(Token::Punct("[")) => {
                let mut items = Vec::new();
                if !self.eat_punct("]") {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct("]")?;
                }
                Ok(Expr::Array(items))
            }
            Some(Token::Punct("{")) => {
                let mut pairs = Vec::new();
                if !self.eat_punct("}") {
                    loop {
                        let key = match self.advance() {
                            Some(Token::Ident(name)) | Some(Token::Scope(name)) => name,
                            Some(Token::Str(s)) => SmolStr::new(s),
                            _ => return Err("expected object key".to_string()),
                        };
                        self.expect_punct(":")?;
                        pairs.push((key, self.parse_expr()?));
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct("}")?;
                }
                Ok(Expr::Object(pairs))
            }
            Some(Token::Punct(punct)) => Err(format!("unexpected token `{punct}`")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Parses a full expression; the input must be consumed entirely.
pub fn parse_expression(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing tokens after expression".to_string());
    }
    Ok(expr)
}

/// Splits an event handler attribute of the form `name` or `name(a, b)`
/// into the handler name and its statically bound argument expressions.
pub fn parse_handler(source: &str) -> Result<(SmolStr, Vec<Expr>), String> {
    let trimmed = source.trim();
    let Some(open) = trimmed.find('(') else {
        if trimmed.is_empty() {
            return Err("empty handler".to_string());
        }
        return Ok((SmolStr::new(trimmed), Vec::new()));
    };
    let name = trimmed[..open].trim();
    if name.is_empty() {
        return Err("missing handler name".to_string());
    }
    let rest = trimmed[open + 1..].trim_end();
    let Some(inner) = rest.strip_suffix(')') else {
        return Err("unterminated handler argument list".to_string());
    };
    if inner.trim().is_empty() {
        return Ok((SmolStr::new(name), Vec::new()));
    }
    // Parse the argument list as a bracketed sequence so commas nested in
    // literals split correctly.
    let args = match parse_expression(&format!("[{inner}]"))? {
        Expr::Array(items) => items,
        _ => return Err("invalid handler arguments".to_string()),
    };
    Ok((SmolStr::new(name), args))
}
