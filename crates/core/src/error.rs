use thiserror::Error;

use crate::model::{OptionId, QuestionId};

/// Why an intent was turned into a no-op.
///
/// Rejections are expected during normal use (stale UI clicks, timer races)
/// and are reported as values, never as failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntentRejection {
    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {question} takes a single answer, got {count}")]
    SingleAnswerOnly { question: QuestionId, count: usize },

    #[error("index {index} is out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("question {0} is already current")]
    AlreadyCurrent(usize),

    #[error("reorder source and target are both {0}")]
    NoMovement(usize),

    #[error("countdown is not running")]
    CountdownNotRunning,

    #[error("countdown is already running")]
    CountdownAlreadyRunning,

    #[error("session has ended")]
    SessionEnded,
}
