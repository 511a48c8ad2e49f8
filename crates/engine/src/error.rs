use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("invalid project: {0}")]
    Validation(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("project must include at least one video or text clip")]
    EmptyProject,
}
