// Error taxonomy shared by every engine operation and repository.

use thiserror::Error;

use crate::model::{FixtureStatus, LeagueStatus};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A league, fixture, club or profile does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Illegal fixture lifecycle transition.
    #[error("fixture {fixture_id} cannot {action} while {status}")]
    InvalidState {
        fixture_id: String,
        action: &'static str,
        status: FixtureStatus,
    },

    /// League-level status does not allow the requested operation.
    #[error("league {league_id} cannot {action} while {status}")]
    InvalidLeagueState {
        league_id: String,
        action: &'static str,
        status: LeagueStatus,
    },

    #[error("validation error: {0}")]
    Validation(String),

    /// The record was modified since it was read.
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export error: {0}")]
    Export(#[from] csv::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Whether the caller may retry the operation after re-reading state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
