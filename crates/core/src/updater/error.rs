//! Error types for binary updates.

use thiserror::Error;

/// Errors from checking for or installing a binary update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The release feed could not be read.
    #[error("release feed error: {0}")]
    Feed(String),

    /// The latest release has no asset with the configured name.
    #[error("release {tag} has no asset named {asset}")]
    NoMatchingAsset { tag: String, asset: String },

    /// The binary could not be run or its output was not a version.
    #[error("version probe failed: {0}")]
    Probe(String),

    /// A candidate or freshly installed binary is not functional.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Downloaded bytes do not match the published digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Restoring the backup failed after an earlier failure.
    #[error("{cause}; rollback failed: {reason}")]
    RollbackFailed { cause: String, reason: String },

    /// Too many failed attempts for this release.
    #[error("giving up on release {tag} after {attempts} failed attempts")]
    RetriesExhausted { tag: String, attempts: u32 },

    /// Another attempt is already running.
    #[error("an update is already in progress")]
    AlreadyRunning,

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    pub fn probe(reason: impl Into<String>) -> Self {
        Self::Probe(reason.into())
    }

    pub fn verification(reason: impl Into<String>) -> Self {
        Self::Verification(reason.into())
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        Self::Feed(e.to_string())
    }
}
