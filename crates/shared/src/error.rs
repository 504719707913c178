use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes a caller can observe from a repository gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportFailure,
    ConstraintFailure,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("could not reach the backend: {0}")]
    Transport(String),
    #[error("{0}")]
    Constraint(String),
    #[error("no {collection} record with id {id}")]
    NotFound { collection: String, id: String },
    #[error("backend returned an unreadable response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    pub fn not_found(collection: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // The store answered, but not with anything usable; treat it like a broken link.
            Self::Transport(_) | Self::Decode(_) => ErrorKind::TransportFailure,
            Self::Constraint(_) => ErrorKind::ConstraintFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is missing an `id` field")]
    MissingId,
    #[error("record `id` must be a string or an integer")]
    InvalidId,
}
