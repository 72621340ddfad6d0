//! Domain hooks: reads and writes per entity.
//!
//! Each read binds a remote access function to its query key, staleness
//! window and guard. Each write validates its input, runs once, invalidates
//! the namespaces it affects and reports the outcome to the notification
//! sink. Nothing is written to the cache optimistically.

mod enrollments;
mod exams;
mod experiences;
mod history;
mod plans;
mod statistics;

use aula_core::{ErrorKind, RemoteError, ValidationError};

use crate::notifications::Notification;

pub use enrollments::ENROLLMENT_STALE_TIME;
pub use exams::EXAM_STALE_TIME;
pub use experiences::EXPERIENCE_STALE_TIME;
pub use history::{HISTORY_STALE_TIME, RECOMMENDATION_STALE_TIME};
pub use plans::{PLAN_STALE_TIME, PLAN_UPLOAD_TYPES};
pub use statistics::STATISTICS_STALE_TIME;

pub const HISTORY_UPLOAD_TYPES: &[&str] = &["application/pdf"];

pub const CONFLICT_FALLBACK: &str = "This was already done.";
pub const GENERIC_FALLBACK: &str = "Something went wrong. Please try again.";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";

/// Why a write did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationFailure {
    /// Rejected before any request was sent.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("No signed-in user")]
    NoSession,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl MutationFailure {
    /// Remote error class, if the request was sent.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            MutationFailure::Remote(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == Some(ErrorKind::Conflict)
    }
}

pub type MutationOutcome<T> = Result<T, MutationFailure>;

/// Map a failed write to what the user sees.
///
/// - 409: warning with the backend message (the state already holds)
/// - 401: error asking to sign in again
/// - anything else: error titled `failure_title`, described by the backend
///   message or a fixed fallback
pub fn failure_notification(err: &RemoteError, failure_title: &str) -> Notification {
    match err.kind() {
        ErrorKind::Conflict => {
            Notification::warning(err.backend_message().unwrap_or(CONFLICT_FALLBACK))
        }
        ErrorKind::Unauthorized => Notification::error(SESSION_EXPIRED),
        _ => Notification::error(failure_title)
            .with_description(err.backend_message().unwrap_or(GENERIC_FALLBACK)),
    }
}
