use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema violation at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("Instance {id} has no string field '{field}'")]
    MissingField { id: u64, field: String },

    #[error("{responses} responses for {instances} instances")]
    LengthMismatch { instances: usize, responses: usize },
}

impl DatasetError {
    pub(crate) fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        DatasetError::Schema { path: path.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
