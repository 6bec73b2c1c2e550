use std::path::PathBuf;

use thiserror::Error;

use crate::model::ChangeStatus;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source {name} unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    #[error("malformed document at {context}: {reason}")]
    MalformedDocument { context: String, reason: String },

    #[error("change {id} cannot move from {from} to {to}")]
    UnknownStatusTransition {
        id: String,
        from: ChangeStatus,
        to: String,
    },

    #[error("change not found: {0}")]
    ChangeNotFound(String),

    #[error("failed to serialize {}: {reason}", path.display())]
    SerializationFailure { path: PathBuf, reason: String },
}

impl ReconcileError {
    pub fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SerializationFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
