//! Error types for arycar.
//!
//! The lifecycle kinds (`NotFound` through `ConcurrentModification`) are
//! caller-facing and recoverable. The engine never retries on its own.

use thiserror::Error;

use crate::model::{MediaType, Status, WorkOrderId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    /// An `InvalidTransition` whose origin is DELIVERED or CANCELLED.
    #[error("work order is in terminal status {from}, cannot move to {to}")]
    TerminalState { from: Status, to: Status },

    #[error("transition {from} -> {to} requires media: {}", join_media(.missing))]
    GuardNotSatisfied {
        from: Status,
        to: Status,
        missing: Vec<MediaType>,
    },

    #[error("work order is {status} and can no longer be modified")]
    Immutable { status: Status },

    #[error("work order {id} changed concurrently (expected status {expected})")]
    ConcurrentModification { id: WorkOrderId, expected: Status },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable, transport-neutral classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    GuardNotSatisfied,
    Immutable,
    ConcurrentModification,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::GuardNotSatisfied => "guard_not_satisfied",
            ErrorKind::Immutable => "immutable",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// `TerminalState` reports as `InvalidTransition`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidTransition { .. } | Error::TerminalState { .. } => {
                ErrorKind::InvalidTransition
            }
            Error::GuardNotSatisfied { .. } => ErrorKind::GuardNotSatisfied,
            Error::Immutable { .. } => ErrorKind::Immutable,
            Error::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_)
            | Error::Database(_)
            | Error::Migration(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// True for every failure a caller can act on without operator help.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Human-facing message, one per failure kind.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound(what) => format!("{what} does not exist"),
            Error::InvalidTransition { from, to } => {
                format!("a work order that is {from} cannot be moved to {to}")
            }
            Error::TerminalState { from, .. } => {
                format!("this work order is already {from}; no further status changes are allowed")
            }
            Error::GuardNotSatisfied { to, missing, .. } => match to {
                Status::InProgress => format!(
                    "upload the entry videos before starting the job (missing: {})",
                    join_media(missing)
                ),
                Status::Delivered => {
                    "upload the delivery video before handing the vehicle over".to_string()
                }
                _ => format!("required media missing: {}", join_media(missing)),
            },
            Error::Immutable { status } => {
                format!("this work order is {status} and can no longer be edited")
            }
            Error::ConcurrentModification { .. } => {
                "the work order was changed by someone else; reload and try again".to_string()
            }
            Error::Validation(msg) => msg.clone(),
            _ => "internal error".to_string(),
        }
    }
}

fn join_media(types: &[MediaType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_an_invalid_transition() {
        let err = Error::TerminalState {
            from: Status::Delivered,
            to: Status::Ready,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.is_recoverable());
    }

    #[test]
    fn missing_entry_videos_message_names_them() {
        let err = Error::GuardNotSatisfied {
            from: Status::Created,
            to: Status::InProgress,
            missing: vec![MediaType::EntryVideoInternal],
        };
        let msg = err.user_message();
        assert!(msg.contains("entry videos"), "{msg}");
        assert!(msg.contains("ENTRY_VIDEO_INTERNAL"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::GuardNotSatisfied);
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = Error::Other("boom".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_recoverable());
        assert_eq!(err.user_message(), "internal error");
    }
}
