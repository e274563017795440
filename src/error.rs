use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::EntityId;

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Closed set of failures the time-accounting core can report.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("entity {0} is already clocked in")]
    AlreadyClockedIn(EntityId),

    #[error("entity {0} is not clocked in")]
    NotClockedIn(EntityId),

    /// The stored session start lies after `now` (clock skew or edited data).
    #[error("entity {entity} has a session opened at {open_since}, after {now}")]
    InvalidInterval {
        entity: EntityId,
        open_since: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("cannot render duration: {0}")]
    InvalidDuration(String),

    #[error("failed to persist records to {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// Only ever logged; the offending entry is corrected in place.
    #[error("record for {entity} was malformed and has been repaired: {detail}")]
    MalformedRecord { entity: String, detail: String },

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl TrackerError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        TrackerError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn collaborator(err: impl std::fmt::Display) -> Self {
        TrackerError::CollaboratorUnavailable(err.to_string())
    }

    /// Guard violations leave state untouched and can simply be reported back.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            TrackerError::AlreadyClockedIn(_)
                | TrackerError::NotClockedIn(_)
                | TrackerError::InvalidInterval { .. }
        )
    }
}

/// Startup configuration problems. Any of these stops the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read settings from {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}
