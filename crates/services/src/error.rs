//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{ExamCode, ExamDataError};
use storage::StorageError;

/// Errors emitted by session services.
///
/// Rejected intents are not errors; see `IntentOutcome`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("exam cannot be used: {0}")]
    InvalidExam(#[from] ExamDataError),
    #[error("session has already ended")]
    Ended,
    #[error("session has not finished yet")]
    NotFinished,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by exam generators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerationError {
    #[error("could not read exam source: {0}")]
    Io(#[from] std::io::Error),
    #[error("exam content could not be processed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("generated exam is invalid: {0}")]
    InvalidExam(#[from] ExamDataError),
    #[error("generated exam {found} does not match requested {requested}")]
    ExamCodeMismatch { requested: ExamCode, found: ExamCode },
    #[error("generation service failed: {0}")]
    Service(String),
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
