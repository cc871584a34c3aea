use thiserror::Error;

/// Failures that abort a scan. Per-region ambiguity is never an error; it is
/// carried in the data model as an `Inconclusive` verdict.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("signature registry error: {0}")]
    Registry(String),

    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
