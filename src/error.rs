//! Error types for planning, placement and retrieval operations.

use thiserror::Error;

/// Errors that can occur while planning or applying storage layouts.
///
/// Every variant carries the ids needed to log or display the failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StowageError {
    /// Non-positive or malformed dimensions/coordinates, or an otherwise
    /// inconsistent record.
    #[error("Invalid input for {subject}: {message}")]
    Validation { subject: String, message: String },

    /// Referenced item, container or placement does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// Item dimensions exceed every available container on some axis.
    #[error("Item '{item_id}' ({width} x {depth} x {height}) does not fit into any container")]
    Capacity {
        item_id: String,
        width: f64,
        depth: f64,
        height: f64,
    },

    /// A manual placement collides with an existing occupant.
    #[error("Item '{item_id}' would overlap '{occupant_id}' in container '{container_id}'")]
    Overlap {
        item_id: String,
        container_id: String,
        occupant_id: String,
    },

    /// Round-robin placement made no further progress while the item
    /// remained unplaced.
    #[error("No free slot found for item '{item_id}' after {rounds} round(s)")]
    RetryExhausted { item_id: String, rounds: usize },

    /// Failure reported by a persistence adapter.
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl StowageError {
    pub fn validation(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code, e.g. for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Capacity { .. } => "capacity_exceeded",
            Self::Overlap { .. } => "overlap",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Storage(_) => "storage_error",
        }
    }
}

/// Kind of record referenced by a [`StowageError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Container,
    Placement,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Item => write!(f, "Item"),
            EntityKind::Container => write!(f, "Container"),
            EntityKind::Placement => write!(f, "Placement for item"),
        }
    }
}

/// Result type for stowage operations.
pub type StowageResult<T> = std::result::Result<T, StowageError>;
