use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponderError {
    /// The checkpoint identifier could not be resolved to a usable set of files.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("hub error: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A blocking generation task panicked or was cancelled.
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<tokenizers::Error> for ResponderError {
    fn from(e: tokenizers::Error) -> Self {
        ResponderError::Tokenizer(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResponderError>;
