//! Error taxonomy shared by extraction, training, detection, feedback and storage.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// Too few records to extract features or to train
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Detection requested for a kind with no saved artifact
    #[error("model '{0}' is not trained")]
    ModelNotTrained(String),

    #[error("unknown model kind '{0}'")]
    UnknownModelKind(String),

    /// Caller-supplied value outside the accepted set
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Feedback referencing an unknown log
    #[error("log '{0}' not found")]
    LogNotFound(String),

    /// Retrain or detection with nothing to work on
    #[error("no logs available for api '{0}'")]
    NoLogsAvailable(String),

    /// Artifact or record save/load/export/import failure
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Exported artifact does not match its checksum
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Why a single estimator kind could not be fitted. Recorded per kind in the
/// training report; never aborts sibling kinds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrainError {
    #[error("need at least {needed} distinct samples, got {got}")]
    NotEnoughDistinctSamples { needed: usize, got: usize },

    #[error("solver did not converge after {0} iterations")]
    NotConverged(usize),

    #[error("degenerate input: {0}")]
    Degenerate(String),
}
