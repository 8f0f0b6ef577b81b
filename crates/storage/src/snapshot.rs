//! Persistence gateway: the crash-recovery snapshot of an in-progress session.
//!
//! Only one in-progress session exists system-wide, so the snapshot lives in a
//! single well-known slot. Questions are stored by id; restoring reconciles
//! those ids against the exam supplied at startup and fails closed on any
//! mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use exam_core::SessionState;
use exam_core::model::{AnswerSheet, ExamCode, ExamData, OptionId, Question, QuestionId};

use crate::repository::{SnapshotStore, StorageError};

pub const SNAPSHOT_KEY: &str = "exam_session";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    TakingExam,
}

/// Serialized layout of an in-progress session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub app_state: AppState,
    pub exam_data: ExamData,
    pub answers: AnswerSheet,
    pub time_left_seconds: u32,
    pub ordered_question_ids: Vec<QuestionId>,
    pub flagged: BTreeSet<QuestionId>,
    #[serde(default)]
    pub current_question_id: Option<QuestionId>,
    /// Reading mode was on when the snapshot was written.
    #[serde(default)]
    pub countdown_suspended: bool,
    pub saved_at: DateTime<Utc>,
}

/// Why a stored snapshot cannot be applied to the current exam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StaleReason {
    #[error("snapshot could not be decoded: {0}")]
    Corrupt(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot belongs to exam {found}, expected {expected}")]
    ExamMismatch { expected: ExamCode, found: ExamCode },

    #[error("snapshot orders {found} questions, exam has {expected}")]
    CountMismatch { expected: usize, found: usize },

    #[error("snapshot references unknown question {0}")]
    UnknownQuestion(QuestionId),

    #[error("snapshot lists question {0} twice")]
    DuplicateQuestion(QuestionId),

    #[error("snapshot answer for {question} uses unknown option {option}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("snapshot answer for single-answer question {question} holds {count} options")]
    TooManyOptions { question: QuestionId, count: usize },
}

/// State rebuilt from a compatible snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSession {
    pub state: SessionState,
    pub time_left_seconds: u32,
    pub suspended: bool,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of looking for a resumable session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restoration {
    Restored(RestoredSession),
    /// A snapshot existed but did not match; it has been discarded.
    Stale(StaleReason),
    Absent,
}

/// What the UI shows when offering to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOffer {
    pub exam_code: ExamCode,
    pub exam_name: String,
    pub time_left_seconds: u32,
    pub answered: usize,
    pub total: usize,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn capture(
        exam: &ExamData,
        state: &SessionState,
        time_left_seconds: u32,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            app_state: AppState::TakingExam,
            exam_data: exam.clone(),
            answers: state.answers().clone(),
            time_left_seconds,
            ordered_question_ids: state.ordered_ids().cloned().collect(),
            flagged: state.flagged().clone(),
            current_question_id: state.current_question().map(|q| q.id.clone()),
            countdown_suspended: false,
            saved_at,
        }
    }

    /// Mark the countdown as frozen in reading mode.
    #[must_use]
    pub fn with_countdown_suspended(mut self, suspended: bool) -> Self {
        self.countdown_suspended = suspended;
        self
    }

    #[must_use]
    pub fn offer(&self) -> SnapshotOffer {
        SnapshotOffer {
            exam_code: self.exam_data.exam_code.clone(),
            exam_name: self.exam_data.exam_name.clone(),
            time_left_seconds: self.time_left_seconds,
            answered: self.answers.len(),
            total: self.ordered_question_ids.len(),
            saved_at: self.saved_at,
        }
    }

    /// Map stored ids back onto `exam`'s questions.
    ///
    /// Every id must resolve exactly once and the counts must agree; answers
    /// and flags must reference known questions and options. Nothing is
    /// partially applied.
    ///
    /// # Errors
    ///
    /// Returns the first `StaleReason` found.
    pub fn reconcile(&self, exam: &ExamData) -> Result<RestoredSession, StaleReason> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StaleReason::UnsupportedVersion(self.version));
        }
        if self.exam_data.exam_code != exam.exam_code {
            return Err(StaleReason::ExamMismatch {
                expected: exam.exam_code.clone(),
                found: self.exam_data.exam_code.clone(),
            });
        }
        if self.ordered_question_ids.len() != exam.questions.len() {
            return Err(StaleReason::CountMismatch {
                expected: exam.questions.len(),
                found: self.ordered_question_ids.len(),
            });
        }

        let by_id: HashMap<&QuestionId, &Question> =
            exam.questions.iter().map(|q| (&q.id, q)).collect();

        let mut seen = BTreeSet::new();
        let mut ordered = Vec::with_capacity(self.ordered_question_ids.len());
        for id in &self.ordered_question_ids {
            let question = by_id
                .get(id)
                .ok_or_else(|| StaleReason::UnknownQuestion(id.clone()))?;
            if !seen.insert(id) {
                return Err(StaleReason::DuplicateQuestion(id.clone()));
            }
            ordered.push((*question).clone());
        }

        for (question_id, selection) in self.answers.iter() {
            let question = by_id
                .get(question_id)
                .ok_or_else(|| StaleReason::UnknownQuestion(question_id.clone()))?;
            if let Some(option) = selection.iter().find(|o| !question.has_option(o)) {
                return Err(StaleReason::UnknownOption {
                    question: question_id.clone(),
                    option: option.clone(),
                });
            }
            if !question.allows_multiple() && selection.len() > 1 {
                return Err(StaleReason::TooManyOptions {
                    question: question_id.clone(),
                    count: selection.len(),
                });
            }
        }
        if let Some(unknown) = self.flagged.iter().find(|id| !by_id.contains_key(id)) {
            return Err(StaleReason::UnknownQuestion(unknown.clone()));
        }

        let current_index = self
            .current_question_id
            .as_ref()
            .and_then(|id| self.ordered_question_ids.iter().position(|o| o == id))
            .unwrap_or(0);

        Ok(RestoredSession {
            state: SessionState::from_parts(
                ordered,
                self.answers.clone(),
                self.flagged.clone(),
                current_index,
            ),
            time_left_seconds: self.time_left_seconds,
            suspended: self.countdown_suspended,
            saved_at: self.saved_at,
        })
    }
}

/// Reads and writes the single snapshot slot.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn SnapshotStore>,
    key: String,
}

impl PersistenceGateway {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            key: SNAPSHOT_KEY.to_string(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the store write fails.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(&self.key, &bytes)
    }

    /// Read the raw snapshot without reconciling it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for undecodable bytes, or the
    /// store's own error.
    pub fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        let Some(bytes) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot delete the slot.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.delete(&self.key)
    }

    /// Describe a pending snapshot without applying it.
    ///
    /// Undecodable snapshots are discarded and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or cleared.
    pub fn offer(&self) -> Result<Option<SnapshotOffer>, StorageError> {
        match self.load() {
            Ok(snapshot) => Ok(snapshot.as_ref().map(SessionSnapshot::offer)),
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(%reason, "discarding undecodable session snapshot");
                self.clear()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Load and reconcile against `exam`. Stale snapshots are cleared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or cleared.
    pub fn restore(&self, exam: &ExamData) -> Result<Restoration, StorageError> {
        let snapshot = match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(Restoration::Absent),
            Err(StorageError::Serialization(reason)) => {
                return self.discard(StaleReason::Corrupt(reason));
            }
            Err(err) => return Err(err),
        };

        match snapshot.reconcile(exam) {
            Ok(restored) => Ok(Restoration::Restored(restored)),
            Err(reason) => self.discard(reason),
        }
    }

    fn discard(&self, reason: StaleReason) -> Result<Restoration, StorageError> {
        tracing::warn!(%reason, "discarding stale session snapshot");
        self.clear()?;
        Ok(Restoration::Stale(reason))
    }
}
