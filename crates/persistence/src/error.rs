//! Store error types.

use thiserror::Error;

/// Errors surfaced by the realtime store and the layers built on it.
///
/// Only compare-and-set transactions retry, and only on a lost race; callers
/// treat any of these as fatal for the operation in progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Store unreachable: {0}")]
    Transport(String),

    #[error("Store rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Store denied access")]
    Unauthorized,

    #[error("Malformed value at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("Subscription stream closed")]
    StreamClosed,

    #[error("Gave up on {path} after {attempts} conflicting writes")]
    Contention { path: String, attempts: usize },
}

impl StoreError {
    pub fn malformed(path: impl ToString, err: impl std::fmt::Display) -> Self {
        StoreError::Malformed {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return StoreError::Unauthorized;
            }
            return StoreError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        StoreError::Transport(err.to_string())
    }
}
