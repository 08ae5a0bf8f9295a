use std::error::Error;
use std::fmt;

use fern_template::Span;

/// Error raised while compiling a template into a render program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
    pub code: CompileErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorCode {
    /// A template fixed a second root node after one was already bound.
    MoreThanOneRoot,
    /// A compile pass finished without ever binding a root node.
    MissingRootNode,
    /// The emitted instruction stream was structurally unbalanced.
    BadProgram,
    /// A template name was not present in the registry.
    UnknownTemplate,
    /// An embedded expression could not be tokenized or parsed.
    BadExpression,
}

impl CompileErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompileErrorCode::MoreThanOneRoot => "more-than-one-root",
            CompileErrorCode::MissingRootNode => "missing-root-node",
            CompileErrorCode::BadProgram => "bad-program",
            CompileErrorCode::UnknownTemplate => "unknown-template",
            CompileErrorCode::BadExpression => "bad-expression",
        }
    }
}

impl CompileError {
    pub fn new(message: impl Into<String>, code: CompileErrorCode) -> Self {
        CompileError {
            message: message.into(),
            span: None,
            code,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn more_than_one_root(template: &str) -> Self {
        CompileError::new(
            format!("template `{template}` has more than one root node"),
            CompileErrorCode::MoreThanOneRoot,
        )
    }

    pub fn missing_root(template: &str) -> Self {
        CompileError::new(
            format!("template `{template}` does not produce a root node"),
            CompileErrorCode::MissingRootNode,
        )
    }

    pub fn bad_program(message: impl Into<String>) -> Self {
        CompileError::new(message, CompileErrorCode::BadProgram)
    }

    pub fn unknown_template(name: &str) -> Self {
        CompileError::new(
            format!("template `{name}` is not registered"),
            CompileErrorCode::UnknownTemplate,
        )
    }

    pub fn bad_expression(raw: &str, detail: impl fmt::Display) -> Self {
        CompileError::new(
            format!("invalid expression `{raw}`: {detail}"),
            CompileErrorCode::BadExpression,
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {}..{}", span.start, span.end)?;
        }
        Ok(())
    }
}

impl Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Error raised while evaluating a compiled program against a rendering
/// context.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderError {
    pub message: String,
    pub code: RenderErrorCode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderErrorCode {
    /// A loop source evaluated to something that cannot be iterated.
    InvalidLoopExpression,
    /// Compilation failed while rendering an uncompiled template.
    Compile(CompileErrorCode),
}

impl RenderError {
    pub fn invalid_loop(detail: impl fmt::Display) -> Self {
        RenderError {
            message: format!("invalid loop expression: {detail}"),
            code: RenderErrorCode::InvalidLoopExpression,
        }
    }
}

impl From<CompileError> for RenderError {
    fn from(err: CompileError) -> Self {
        RenderError {
            code: RenderErrorCode::Compile(err.code),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            RenderErrorCode::InvalidLoopExpression => {
                write!(f, "[invalid-loop-expression] {}", self.message)
            }
            RenderErrorCode::Compile(_) => write!(f, "{}", self.message),
        }
    }
}

impl Error for RenderError {}

pub type RenderResult<T> = Result<T, RenderError>;
