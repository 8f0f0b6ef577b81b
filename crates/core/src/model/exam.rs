use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::model::ids::{ExamCode, QuestionId};
use crate::model::question::{Question, QuestionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamDataError {
    #[error("exam code cannot be empty")]
    EmptyExamCode,

    #[error("exam has no questions")]
    NoQuestions,

    #[error("question id {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// A ready-made question set produced by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamData {
    pub exam_code: ExamCode,
    pub exam_name: String,
    pub questions: Vec<Question>,
}

impl ExamData {
    /// Validate the exam before a session may start from it.
    ///
    /// # Errors
    ///
    /// Returns `ExamDataError` if the code is blank, the set is empty, ids repeat,
    /// or any question breaks its own invariants.
    pub fn validate(&self) -> Result<(), ExamDataError> {
        if self.exam_code.is_blank() {
            return Err(ExamDataError::EmptyExamCode);
        }
        if self.questions.is_empty() {
            return Err(ExamDataError::NoQuestions);
        }

        let mut seen = HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            if !seen.insert(&question.id) {
                return Err(ExamDataError::DuplicateQuestion(question.id.clone()));
            }
            question.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Distinct, non-empty domains in alphabetical order.
    #[must_use]
    pub fn domains(&self) -> BTreeSet<&str> {
        self.questions
            .iter()
            .map(|q| q.domain.as_str())
            .filter(|d| !d.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, OptionId, QuestionKind};

    fn question(id: &str, domain: &str) -> Question {
        Question {
            id: QuestionId::new(id),
            kind: QuestionKind::TrueFalse,
            text: format!("Statement {id}"),
            scenario: None,
            options: vec![AnswerOption::new("t", "True"), AnswerOption::new("f", "False")],
            correct_answers: [OptionId::new("t")].into_iter().collect(),
            domain: domain.into(),
            explanation: String::new(),
        }
    }

    fn exam(questions: Vec<Question>) -> ExamData {
        ExamData {
            exam_code: ExamCode::new("CLF-C02"),
            exam_name: "Cloud Practitioner".into(),
            questions,
        }
    }

    #[test]
    fn empty_exam_is_invalid() {
        assert_eq!(exam(Vec::new()).validate(), Err(ExamDataError::NoQuestions));
    }

    #[test]
    fn duplicate_question_ids_are_invalid() {
        let err = exam(vec![question("q1", "A"), question("q1", "B")])
            .validate()
            .unwrap_err();
        assert_eq!(err, ExamDataError::DuplicateQuestion(QuestionId::new("q1")));
    }

    #[test]
    fn question_errors_bubble_up() {
        let mut bad = question("q1", "A");
        bad.correct_answers.clear();
        let err = exam(vec![bad]).validate().unwrap_err();
        assert!(matches!(err, ExamDataError::Question(_)));
    }

    #[test]
    fn domains_are_distinct_and_sorted() {
        let data = exam(vec![
            question("q1", "Security"),
            question("q2", "Billing"),
            question("q3", "Security"),
            question("q4", " "),
        ]);
        let domains: Vec<_> = data.domains().into_iter().collect();
        assert_eq!(domains, vec!["Billing", "Security"]);
    }
}
