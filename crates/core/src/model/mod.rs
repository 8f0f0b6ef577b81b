mod answers;
mod attempt;
mod exam;
mod ids;
mod question;
mod settings;

pub use answers::AnswerSheet;
pub use attempt::{Attempt, AttemptError, FinishReason, ParseFinishReasonError};
pub use exam::{ExamData, ExamDataError};
pub use ids::{AttemptId, ExamCode, OptionId, ParseIdError, QuestionId};
pub use question::{AnswerOption, Question, QuestionError, QuestionKind};
pub use settings::{ExamSettings, SettingsError};
