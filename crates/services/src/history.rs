use chrono::{DateTime, Utc};
use std::sync::Arc;

use exam_core::QuestionOutcome;
use exam_core::model::{Attempt, AttemptId, ExamCode, FinishReason, OptionId, Question};
use exam_core::scoring::{DomainScore, domain_breakdown, grade_question};
use storage::repository::{AttemptRepository, StorageError};

use crate::error::HistoryError;

/// Presentation-agnostic list item for a finished attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptListItem {
    pub id: AttemptId,
    pub exam_code: ExamCode,
    pub exam_name: String,
    pub score: f64,
    pub correct: u32,
    pub total: u32,
    pub finished_at: DateTime<Utc>,
    pub reason: FinishReason,
}

impl AttemptListItem {
    #[must_use]
    pub fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id(),
            exam_code: attempt.exam_code().clone(),
            exam_name: attempt.exam().exam_name.clone(),
            score: attempt.score(),
            correct: attempt.correct_answers(),
            total: attempt.total_questions(),
            finished_at: attempt.finished_at(),
            reason: attempt.reason(),
        }
    }
}

/// One question as it was answered.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub position: usize,
    pub question: Question,
    pub selected: Vec<OptionId>,
    pub outcome: QuestionOutcome,
}

/// Full breakdown of a past attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReview {
    pub summary: AttemptListItem,
    pub items: Vec<ReviewItem>,
    pub domains: Vec<DomainScore>,
}

impl AttemptReview {
    #[must_use]
    pub fn from_attempt(attempt: &Attempt) -> Self {
        let questions = &attempt.exam().questions;
        let answers = attempt.answers();
        let items = questions
            .iter()
            .enumerate()
            .map(|(position, question)| ReviewItem {
                position,
                question: question.clone(),
                selected: answers
                    .get(&question.id)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default(),
                outcome: grade_question(question, answers),
            })
            .collect();

        Self {
            summary: AttemptListItem::from_attempt(attempt),
            items,
            domains: domain_breakdown(questions, answers),
        }
    }

    /// Items that were not answered correctly.
    pub fn mistakes(&self) -> impl Iterator<Item = &ReviewItem> {
        self.items
            .iter()
            .filter(|item| item.outcome != QuestionOutcome::Correct)
    }
}

/// Read-side access to attempt history.
#[derive(Clone)]
pub struct HistoryService {
    attempts: Arc<dyn AttemptRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { attempts }
    }

    /// List attempts newest first.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if the history cannot be read.
    pub async fn list(&self, limit: u32) -> Result<Vec<AttemptListItem>, HistoryError> {
        let attempts = self.attempts.list_attempts(limit).await?;
        Ok(attempts.iter().map(AttemptListItem::from_attempt).collect())
    }

    /// Load one attempt with per-question and per-domain results.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` (including `NotFound`) on failure.
    pub async fn review(&self, id: AttemptId) -> Result<AttemptReview, HistoryError> {
        let attempt = self.attempts.get_attempt(id).await?;
        Ok(AttemptReview::from_attempt(&attempt))
    }

    /// Highest score recorded for `exam_code`, if any attempt exists.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if the history cannot be read.
    pub async fn best_score(&self, exam_code: &ExamCode) -> Result<Option<f64>, HistoryError> {
        let attempts = self.attempts.list_attempts(u32::MAX).await?;
        Ok(attempts
            .iter()
            .filter(|a| a.exam_code() == exam_code)
            .map(Attempt::score)
            .reduce(f64::max))
    }

    /// True if `id` is in history.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` for failures other than a missing row.
    pub async fn contains(&self, id: AttemptId) -> Result<bool, HistoryError> {
        match self.attempts.get_attempt(id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use exam_core::model::{AnswerOption, AnswerSheet, ExamData, QuestionId, QuestionKind};
    use exam_core::time::fixed_now;
    use storage::InMemoryAttemptRepository;

    fn exam(code: &str) -> ExamData {
        let question = |id: &str, domain: &str, kind: QuestionKind, correct: &[&str]| Question {
            id: QuestionId::new(id),
            kind,
            text: format!("Question {id}"),
            scenario: None,
            options: vec![
                AnswerOption::new("a", "A"),
                AnswerOption::new("b", "B"),
                AnswerOption::new("c", "C"),
            ],
            correct_answers: correct.iter().map(|o| OptionId::new(*o)).collect(),
            domain: domain.into(),
            explanation: "See the docs.".into(),
        };
        ExamData {
            exam_code: ExamCode::new(code),
            exam_name: format!("{code} practice"),
            questions: vec![
                question("q1", "Networking", QuestionKind::SingleChoice, &["a"]),
                question("q2", "Networking", QuestionKind::MultiChoice, &["a", "c"]),
                question("q3", "Storage", QuestionKind::SingleChoice, &["b"]),
                question("q4", "Storage", QuestionKind::SingleChoice, &["c"]),
            ],
        }
    }

    fn answers(pairs: &[(&str, &[&str])]) -> AnswerSheet {
        let mut sheet = AnswerSheet::new();
        for (question, options) in pairs {
            sheet.set(
                QuestionId::new(*question),
                options.iter().map(|o| OptionId::new(*o)).collect(),
            );
        }
        sheet
    }

    async fn seeded() -> (HistoryService, Vec<Attempt>) {
        let repo = InMemoryAttemptRepository::new();
        let t0 = fixed_now();
        let attempts = vec![
            Attempt::grade(
                exam("NET-1"),
                answers(&[("q1", &["a"]), ("q2", &["a"])]),
                FinishReason::Manual,
                t0,
            ),
            Attempt::grade(
                exam("NET-1"),
                answers(&[("q1", &["a"]), ("q2", &["a", "c"]), ("q3", &["b"])]),
                FinishReason::Timeout,
                t0 + Duration::minutes(30),
            ),
            Attempt::grade(
                exam("STO-2"),
                AnswerSheet::new(),
                FinishReason::Manual,
                t0 + Duration::hours(2),
            ),
        ];
        for attempt in &attempts {
            repo.append_attempt(attempt).await.unwrap();
        }
        (HistoryService::new(Arc::new(repo)), attempts)
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (history, attempts) = seeded().await;
        let listed = history.list(10).await.unwrap();

        let ids: Vec<AttemptId> = listed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![attempts[2].id(), attempts[1].id(), attempts[0].id()]);
        assert_eq!(listed[1].correct, 3);
        assert_eq!(listed[1].total, 4);
        assert_eq!(listed[1].reason, FinishReason::Timeout);
        assert_eq!(listed[1].exam_name, "NET-1 practice");

        assert_eq!(history.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn review_grades_each_question_and_domain() {
        let (history, attempts) = seeded().await;
        let review = history.review(attempts[0].id()).await.unwrap();

        let outcomes: Vec<QuestionOutcome> = review.items.iter().map(|i| i.outcome).collect();
        assert_eq!(
            outcomes,
            [
                QuestionOutcome::Correct,
                QuestionOutcome::Incorrect,
                QuestionOutcome::Unanswered,
                QuestionOutcome::Unanswered,
            ]
        );
        assert_eq!(review.items[1].selected, vec![OptionId::new("a")]);
        assert_eq!(review.mistakes().count(), 3);

        assert_eq!(review.domains.len(), 2);
        assert_eq!(review.domains[0].domain, "Networking");
        assert_eq!((review.domains[0].correct, review.domains[0].total), (1, 2));
        assert_eq!((review.domains[1].correct, review.domains[1].total), (0, 2));
        assert!((review.summary.score - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn review_of_unknown_attempt_is_not_found() {
        let (history, _) = seeded().await;
        let err = history.review(AttemptId::generate()).await.unwrap_err();
        assert!(matches!(err, HistoryError::Storage(StorageError::NotFound)));
        assert!(!history.contains(AttemptId::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn best_score_per_exam_code() {
        let (history, _) = seeded().await;
        assert_eq!(
            history.best_score(&ExamCode::new("NET-1")).await.unwrap(),
            Some(75.0)
        );
        assert_eq!(
            history.best_score(&ExamCode::new("STO-2")).await.unwrap(),
            Some(0.0)
        );
        assert_eq!(history.best_score(&ExamCode::new("NONE")).await.unwrap(), None);
    }
}
