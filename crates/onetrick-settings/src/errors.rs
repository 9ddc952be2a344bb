//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// Parsed, but unusable: a zero window, an empty path.
    #[error("invalid {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;
