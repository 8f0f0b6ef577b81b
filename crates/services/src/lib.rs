#![forbid(unsafe_code)]

pub mod alerts;
pub mod error;
pub mod generation;
pub mod history;
pub mod sessions;

pub use exam_core::Clock;

pub use alerts::{AlertSink, SilentAlerts};
pub use error::{GenerationError, HistoryError, SessionError};
pub use generation::{ExamGenerator, GenerationRequest, JsonExamSource};
pub use history::{AttemptListItem, AttemptReview, HistoryService, ReviewItem};
pub use sessions::{
    CurrentQuestion, ExamSession, ExamSessionService, FilteredEntry, Intent, IntentOutcome,
    ResumeOutcome, RunOutcome, SessionEvent, SessionHandle, SessionPhase, SessionRunner,
    SessionView, TickEvent, format_time_left,
};
