//! Exact-match grading.
//!
//! Pure functions over a question set and an answer sheet; nothing here touches
//! session state or storage.

use std::collections::BTreeMap;

use crate::model::{AnswerSheet, Question};

/// Aggregate result of grading a question set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreReport {
    pub correct_answers: u32,
    pub total_questions: u32,
    /// `100 * correct / total`, unrounded.
    pub score: f64,
}

impl ScoreReport {
    /// Score rounded to one decimal place for display.
    #[must_use]
    pub fn rounded(&self) -> f64 {
        (self.score * 10.0).round() / 10.0
    }
}

/// Per-question verdict used by attempt review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

#[must_use]
pub fn grade_question(question: &Question, answers: &AnswerSheet) -> QuestionOutcome {
    match answers.get(&question.id) {
        None => QuestionOutcome::Unanswered,
        Some(selection) if question.is_correct(selection) => QuestionOutcome::Correct,
        Some(_) => QuestionOutcome::Incorrect,
    }
}

/// Grade every question; partial overlap counts as incorrect.
#[must_use]
pub fn score(questions: &[Question], answers: &AnswerSheet) -> ScoreReport {
    let correct = questions
        .iter()
        .filter(|q| grade_question(q, answers) == QuestionOutcome::Correct)
        .count();
    let correct_answers = u32::try_from(correct).unwrap_or(u32::MAX);
    let total_questions = u32::try_from(questions.len()).unwrap_or(u32::MAX);

    let score = if total_questions == 0 {
        0.0
    } else {
        100.0 * f64::from(correct_answers) / f64::from(total_questions)
    };

    ScoreReport {
        correct_answers,
        total_questions,
        score,
    }
}

/// Accuracy within a single domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainScore {
    pub domain: String,
    pub correct: u32,
    pub total: u32,
}

impl DomainScore {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.correct) / f64::from(self.total)
    }
}

/// Correct/total per domain, ordered by domain name.
#[must_use]
pub fn domain_breakdown(questions: &[Question], answers: &AnswerSheet) -> Vec<DomainScore> {
    let mut by_domain: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for question in questions {
        let entry = by_domain.entry(question.domain.as_str()).or_default();
        entry.1 = entry.1.saturating_add(1);
        if grade_question(question, answers) == QuestionOutcome::Correct {
            entry.0 = entry.0.saturating_add(1);
        }
    }

    by_domain
        .into_iter()
        .map(|(domain, (correct, total))| DomainScore {
            domain: domain.to_string(),
            correct,
            total,
        })
        .collect()
}
