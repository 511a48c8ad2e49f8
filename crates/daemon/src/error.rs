use engine::CompileError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("project must include at least one video or text clip")]
    EmptyProject,

    /// Non-fatal on its own: drives the next fallback in a stage.
    #[error("{provider} provider failed: {cause}")]
    Provider { provider: &'static str, cause: String },

    #[error("{0}")]
    EngineExecution(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{stage} stage exhausted all providers: {last}")]
    Exhausted {
        stage: &'static str,
        last: Box<PipelineError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn provider(provider: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider,
            cause: cause.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout(operation.into())
    }
}

impl From<CompileError> for PipelineError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Validation(msg) => Self::Validation(msg),
            CompileError::AssetNotFound(id) => Self::AssetNotFound(id),
            CompileError::EmptyProject => Self::EmptyProject,
        }
    }
}
