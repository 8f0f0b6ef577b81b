use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("question {question} repeats option {option}")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {0} has no correct answer")]
    NoCorrectAnswer(QuestionId),

    #[error("question {question} marks unknown option {option} as correct")]
    UnknownCorrectAnswer {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {question} takes a single answer but lists {count} correct options")]
    TooManyCorrectAnswers { question: QuestionId, count: usize },
}

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// Presentation/answering mode of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    #[serde(alias = "single")]
    SingleChoice,
    #[serde(alias = "multiple")]
    MultiChoice,
    Scenario,
    #[serde(alias = "truefalse")]
    TrueFalse,
}

impl QuestionKind {
    /// Kinds that always take exactly one selected option.
    #[must_use]
    pub fn is_single_answer(self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::TrueFalse)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: impl Into<OptionId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A single exam question as supplied by the generation service.
///
/// Questions are immutable once an exam starts; sessions reorder them but never edit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub options: Vec<AnswerOption>,
    pub correct_answers: BTreeSet<OptionId>,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub explanation: String,
}

impl Question {
    /// Checks the structural invariants of the question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the id is blank, options are missing or repeated,
    /// or the correct-answer set is empty, unknown, or too large for the kind.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.id.is_blank() {
            return Err(QuestionError::EmptyId);
        }
        if self.options.is_empty() {
            return Err(QuestionError::NoOptions(self.id.clone()));
        }

        let mut seen = HashSet::with_capacity(self.options.len());
        for option in &self.options {
            if !seen.insert(&option.id) {
                return Err(QuestionError::DuplicateOption {
                    question: self.id.clone(),
                    option: option.id.clone(),
                });
            }
        }

        if self.correct_answers.is_empty() {
            return Err(QuestionError::NoCorrectAnswer(self.id.clone()));
        }
        if let Some(unknown) = self.correct_answers.iter().find(|id| !seen.contains(id)) {
            return Err(QuestionError::UnknownCorrectAnswer {
                question: self.id.clone(),
                option: unknown.clone(),
            });
        }
        if self.kind.is_single_answer() && self.correct_answers.len() > 1 {
            return Err(QuestionError::TooManyCorrectAnswers {
                question: self.id.clone(),
                count: self.correct_answers.len(),
            });
        }

        Ok(())
    }

    /// Whether callers may select more than one option.
    ///
    /// Scenario questions follow their answer key: multi-select only when more
    /// than one option is correct.
    #[must_use]
    pub fn allows_multiple(&self) -> bool {
        match self.kind {
            QuestionKind::MultiChoice => true,
            QuestionKind::Scenario => self.correct_answers.len() > 1,
            QuestionKind::SingleChoice | QuestionKind::TrueFalse => false,
        }
    }

    #[must_use]
    pub fn has_option(&self, id: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == id)
    }

    /// Exact-match grading: the selection must equal the answer key.
    #[must_use]
    pub fn is_correct(&self, selection: &BTreeSet<OptionId>) -> bool {
        *selection == self.correct_answers
    }

    /// Case-insensitive search over the question text and scenario.
    #[must_use]
    pub fn matches_text(&self, needle_lower: &str) -> bool {
        self.text.to_lowercase().contains(needle_lower)
            || self
                .scenario
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(needle_lower))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: QuestionKind, correct: &[&str]) -> Question {
        Question {
            id: QuestionId::new("q1"),
            kind,
            text: "Which storage class is cheapest?".into(),
            scenario: None,
            options: vec![
                AnswerOption::new("a", "Standard"),
                AnswerOption::new("b", "Glacier"),
                AnswerOption::new("c", "One Zone"),
            ],
            correct_answers: correct.iter().map(|s| OptionId::new(*s)).collect(),
            domain: "Storage".into(),
            explanation: String::new(),
        }
    }

    #[test]
    fn valid_question_passes() {
        assert!(question(QuestionKind::SingleChoice, &["b"]).validate().is_ok());
        assert!(question(QuestionKind::MultiChoice, &["a", "b"]).validate().is_ok());
    }

    #[test]
    fn empty_answer_key_is_rejected() {
        let err = question(QuestionKind::SingleChoice, &[]).validate().unwrap_err();
        assert!(matches!(err, QuestionError::NoCorrectAnswer(_)));
    }

    #[test]
    fn answer_key_must_reference_options() {
        let err = question(QuestionKind::MultiChoice, &["a", "z"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, QuestionError::UnknownCorrectAnswer { .. }));
    }

    #[test]
    fn single_choice_rejects_multiple_correct() {
        let err = question(QuestionKind::TrueFalse, &["a", "b"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, QuestionError::TooManyCorrectAnswers { count: 2, .. }));
    }

    #[test]
    fn duplicate_option_ids_are_rejected() {
        let mut q = question(QuestionKind::SingleChoice, &["a"]);
        q.options.push(AnswerOption::new("a", "again"));
        assert!(matches!(
            q.validate().unwrap_err(),
            QuestionError::DuplicateOption { .. }
        ));
    }

    #[test]
    fn scenario_follows_answer_key() {
        assert!(!question(QuestionKind::Scenario, &["a"]).allows_multiple());
        assert!(question(QuestionKind::Scenario, &["a", "c"]).allows_multiple());
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let json = r#"{
            "id": "q9",
            "type": "multi-choice",
            "text": "Pick two",
            "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
            "correctAnswers": ["a", "b"],
            "domain": "Security",
            "explanation": "Both"
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind, QuestionKind::MultiChoice);
        assert_eq!(q.correct_answers.len(), 2);
        assert!(q.scenario.is_none());
    }
}
