//! Error type definitions for the signage playback coordinator.
//!
//! Fatal configuration errors abort startup; everything else is absorbed
//! by the foreground loop with a bounded backoff.

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type for the coordinator.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing config file, missing required key, missing/empty device secret.
    /// Fatal: the process exits non-zero.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Fetch or download failed; caller should retry with backoff.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API response lacks URLs or has a malformed cursor.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Stale IPC socket, loadfile no-op, EOF timeout. Caller restarts the player.
    #[error("player error: {message}")]
    Player { message: String },

    /// Unable to delete a cache file during eviction. Logged, loop continues.
    #[error("eviction error: {message}")]
    Eviction { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn player(message: impl Into<String>) -> Self {
        Self::Player {
            message: message.into(),
        }
    }

    pub fn eviction(message: impl Into<String>) -> Self {
        Self::Eviction {
            message: message.into(),
        }
    }

    /// True for errors the foreground loop should retry rather than propagate.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Protocol { .. } | AppError::Io(_)
        )
    }
}
