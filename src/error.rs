use thiserror::Error;

// Errors raised while scanning a chain. Everything except the tip/cursor
// precondition failures is caught per block by the syncer.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("failed to decode node response: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown blockchain client `{0}`")]
    UnknownClient(String),

    #[error("unknown blockchain `{0}`")]
    UnknownChain(String),

    #[error("a scan of `{0}` is already running")]
    ScanInProgress(String),

    #[error("amount out of range: {0}")]
    Amount(String),
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::Decode(e.to_string())
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
