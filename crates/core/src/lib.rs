#![forbid(unsafe_code)]

pub mod countdown;
pub mod error;
pub mod model;
pub mod navigator;
pub mod scoring;
pub mod time;

pub use countdown::{Countdown, CountdownPhase, Tick};
pub use error::IntentRejection;
pub use navigator::{FilteredView, QuestionFilter, QuestionStatus, SessionState, StatusFilter};
pub use scoring::{QuestionOutcome, ScoreReport};
pub use time::Clock;
