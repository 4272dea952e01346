use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage io error on `{key}`: {source}")]
    Io { key: String, source: std::io::Error },
    #[error("Invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("Could not encode `{key}`: {message}")]
    Encode { key: String, message: String }
}

/// Failure of a call to the remote sync service
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote unreachable: {0}")]
    Transport(String),
    #[error("Remote answered {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Remote sent an unreadable reply: {0}")]
    Decode(String),
    #[error("Shared store error: {0}")]
    Storage(#[from] StorageError),
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<SyncError> }
}

impl SyncError {
    /// Whether trying the same call again could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            SyncError::Rejected { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            SyncError::Storage(_) => true,
            SyncError::Decode(_) | SyncError::RetryExhausted { .. } => false
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => SyncError::Rejected { status: status.as_u16(), message: err.to_string() },
            None => SyncError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
