use fern_compiler::{CompileError, RenderError};
use fern_template::TemplateError;

/// Errors surfaced by the component runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("no widget registered under `{0}`")]
    UnknownWidget(String),

    #[error("component {0} is gone")]
    MissingComponent(u64),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
