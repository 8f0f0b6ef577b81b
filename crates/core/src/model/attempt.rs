use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::answers::AnswerSheet;
use crate::model::exam::ExamData;
use crate::model::ids::{AttemptId, ExamCode};
use crate::scoring::{self, ScoreReport};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(f64),

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CorrectExceedsTotal { correct: u32, total: u32 },

    #[error("total questions ({total}) does not match the archived exam ({questions})")]
    QuestionCountMismatch { total: u32, questions: usize },

    #[error("exam code {attempt} does not match the archived exam {exam}")]
    ExamCodeMismatch { attempt: ExamCode, exam: ExamCode },
}

/// How a session came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    Manual,
    Timeout,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Manual => "manual",
            FinishReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown finish reason: {0}")]
pub struct ParseFinishReasonError(String);

impl FromStr for FinishReason {
    type Err = ParseFinishReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(FinishReason::Manual),
            "timeout" => Ok(FinishReason::Timeout),
            other => Err(ParseFinishReasonError(other.to_string())),
        }
    }
}

/// Immutable, scored record of a finished session.
///
/// Carries frozen copies of the exam and the final answers so that history
/// review never depends on live session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    id: AttemptId,
    exam_code: ExamCode,
    score: f64,
    total_questions: u32,
    correct_answers: u32,
    finished_at: DateTime<Utc>,
    reason: FinishReason,
    exam: ExamData,
    answers: AnswerSheet,
}

impl Attempt {
    /// Grade the frozen answers and build the archival record.
    #[must_use]
    pub fn grade(
        exam: ExamData,
        answers: AnswerSheet,
        reason: FinishReason,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let report = scoring::score(&exam.questions, &answers);
        Self {
            id: AttemptId::generate(),
            exam_code: exam.exam_code.clone(),
            score: report.score,
            total_questions: report.total_questions,
            correct_answers: report.correct_answers,
            finished_at,
            reason,
            exam,
            answers,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the stored totals are inconsistent with each
    /// other or with the archived exam.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        exam_code: ExamCode,
        score: f64,
        total_questions: u32,
        correct_answers: u32,
        finished_at: DateTime<Utc>,
        reason: FinishReason,
        exam: ExamData,
        answers: AnswerSheet,
    ) -> Result<Self, AttemptError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(AttemptError::ScoreOutOfRange(score));
        }
        if correct_answers > total_questions {
            return Err(AttemptError::CorrectExceedsTotal {
                correct: correct_answers,
                total: total_questions,
            });
        }
        if usize::try_from(total_questions).ok() != Some(exam.questions.len()) {
            return Err(AttemptError::QuestionCountMismatch {
                total: total_questions,
                questions: exam.questions.len(),
            });
        }
        if exam_code != exam.exam_code {
            return Err(AttemptError::ExamCodeMismatch {
                attempt: exam_code,
                exam: exam.exam_code,
            });
        }

        Ok(Self {
            id,
            exam_code,
            score,
            total_questions,
            correct_answers,
            finished_at,
            reason,
            exam,
            answers,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn exam_code(&self) -> &ExamCode {
        &self.exam_code
    }

    /// Percentage of exactly-matched questions, 0..=100.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    #[must_use]
    pub fn reason(&self) -> FinishReason {
        self.reason
    }

    #[must_use]
    pub fn exam(&self) -> &ExamData {
        &self.exam
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn report(&self) -> ScoreReport {
        ScoreReport {
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, OptionId, Question, QuestionId, QuestionKind};
    use crate::time::fixed_now;

    fn exam() -> ExamData {
        let questions = (1..=4)
            .map(|i| Question {
                id: QuestionId::new(format!("q{i}")),
                kind: QuestionKind::SingleChoice,
                text: format!("Question {i}"),
                scenario: None,
                options: vec![AnswerOption::new("a", "A"), AnswerOption::new("b", "B")],
                correct_answers: [OptionId::new("a")].into_iter().collect(),
                domain: "General".into(),
                explanation: String::new(),
            })
            .collect();
        ExamData {
            exam_code: ExamCode::new("DVA-C02"),
            exam_name: "Developer".into(),
            questions,
        }
    }

    #[test]
    fn grade_freezes_answers_and_scores() {
        let mut answers = AnswerSheet::new();
        answers.set(QuestionId::new("q1"), [OptionId::new("a")].into_iter().collect());
        answers.set(QuestionId::new("q2"), [OptionId::new("b")].into_iter().collect());

        let attempt = Attempt::grade(exam(), answers.clone(), FinishReason::Manual, fixed_now());

        assert_eq!(attempt.correct_answers(), 1);
        assert_eq!(attempt.total_questions(), 4);
        assert!((attempt.score() - 25.0).abs() < f64::EPSILON);
        assert_eq!(attempt.answers(), &answers);
        assert_eq!(attempt.exam_code().as_str(), "DVA-C02");
    }

    #[test]
    fn from_persisted_rejects_inconsistent_totals() {
        let err = Attempt::from_persisted(
            AttemptId::generate(),
            ExamCode::new("DVA-C02"),
            50.0,
            3,
            1,
            fixed_now(),
            FinishReason::Timeout,
            exam(),
            AnswerSheet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::QuestionCountMismatch { .. }));

        let err = Attempt::from_persisted(
            AttemptId::generate(),
            ExamCode::new("DVA-C02"),
            120.0,
            4,
            1,
            fixed_now(),
            FinishReason::Timeout,
            exam(),
            AnswerSheet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::ScoreOutOfRange(_)));
    }

    #[test]
    fn finish_reason_round_trips_through_str() {
        for reason in [FinishReason::Manual, FinishReason::Timeout] {
            assert_eq!(reason.as_str().parse::<FinishReason>().unwrap(), reason);
        }
        assert!("crash".parse::<FinishReason>().is_err());
    }
}
