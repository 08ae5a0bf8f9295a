//! Error types for template parsing and registration.

use crate::span::Span;
use std::fmt;

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// An error raised while parsing or registering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    /// The error message.
    pub message: String,
    /// The span where the error occurred, when known.
    pub span: Option<Span>,
    /// The error code.
    pub code: TemplateErrorCode,
}

impl TemplateError {
    /// Create a new template error.
    pub fn new(message: impl Into<String>, span: Option<Span>, code: TemplateErrorCode) -> Self {
        Self {
            message: message.into(),
            span,
            code,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(message, Some(span), TemplateErrorCode::Parse)
    }

    /// Create a duplicate-template error.
    pub fn duplicate(name: &str) -> Self {
        Self::new(
            format!("Template \"{}\" is already registered", name),
            None,
            TemplateErrorCode::DuplicateTemplate,
        )
    }

    /// Create an ambiguous-branch error.
    pub fn ambiguous_branch(tag: &str, span: Span) -> Self {
        Self::new(
            format!(
                "<{}> carries more than one of if/elif/else",
                tag
            ),
            Some(span),
            TemplateErrorCode::AmbiguousBranch,
        )
    }

    /// Create a dangling-branch error.
    pub fn dangling_branch(directive: &str, span: Span) -> Self {
        Self::new(
            format!(
                "\"{}\" must immediately follow a sibling with if or elif",
                directive
            ),
            Some(span),
            TemplateErrorCode::DanglingBranch,
        )
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TemplateError {}

/// Error codes for template operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateErrorCode {
    /// Malformed or empty markup.
    Parse,
    /// A template name registered twice without `allow_duplicate`.
    DuplicateTemplate,
    /// An element carrying more than one branch directive.
    AmbiguousBranch,
    /// An elif/else with no qualifying preceding sibling.
    DanglingBranch,
}

impl TemplateErrorCode {
    /// Get the error code as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse-error",
            Self::DuplicateTemplate => "duplicate-template",
            Self::AmbiguousBranch => "ambiguous-branch",
            Self::DanglingBranch => "dangling-branch",
        }
    }
}

impl fmt::Display for TemplateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
