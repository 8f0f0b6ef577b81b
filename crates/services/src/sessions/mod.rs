mod engine;
mod runner;
mod view;
mod workflow;

#[cfg(test)]
mod test_support;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::{ExamSession, IntentOutcome, SessionPhase, TickEvent};
pub use runner::{Intent, RunOutcome, SessionEvent, SessionHandle, SessionRunner};
pub use view::{CurrentQuestion, FilteredEntry, SessionView, format_time_left};
pub use workflow::{ExamSessionService, ResumeOutcome};
