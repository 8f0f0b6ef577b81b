use async_trait::async_trait;
use exam_core::model::{Attempt, AttemptId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//
// ─── SNAPSHOT STORE ────────────────────────────────────────────────────────────
//

/// Durable key-value slot used for crash recovery.
///
/// Calls are synchronous from the engine's point of view; implementations
/// must be cheap enough to run after every intent.
pub trait SnapshotStore: Send + Sync {
    /// Read the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Overwrite the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be modified.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    slots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

//
// ─── ATTEMPT HISTORY ───────────────────────────────────────────────────────────
//

/// Append-only history of finished attempts.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Archive a finished attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if an attempt with the same id exists,
    /// or other storage errors.
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Fetch one attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError>;

    /// List attempts newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be read.
    async fn list_attempts(&self, limit: u32) -> Result<Vec<Attempt>, StorageError>;
}

/// In-memory history for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryAttemptRepository {
    attempts: Arc<Mutex<Vec<Attempt>>>,
}

impl InMemoryAttemptRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|a| a.id() == attempt.id()) {
            return Err(StorageError::Conflict);
        }
        guard.push(attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|a| a.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_attempts(&self, limit: u32) -> Result<Vec<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut out: Vec<Attempt> = guard.clone();
        // Newest first; ties fall back to reverse insertion order.
        out.sort_by_key(Attempt::finished_at);
        out.reverse();
        out.truncate(limit);
        Ok(out)
    }
}

/// Aggregates the history and snapshot backends behind trait objects.
#[derive(Clone)]
pub struct Storage {
    pub attempts: Arc<dyn AttemptRepository>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            attempts: Arc::new(InMemoryAttemptRepository::new()),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{
        AnswerOption, AnswerSheet, ExamCode, ExamData, FinishReason, OptionId, Question,
        QuestionId, QuestionKind,
    };
    use exam_core::time::fixed_now;

    fn exam() -> ExamData {
        ExamData {
            exam_code: ExamCode::new("AZ-900"),
            exam_name: "Azure Fundamentals".into(),
            questions: vec![Question {
                id: QuestionId::new("q1"),
                kind: QuestionKind::TrueFalse,
                text: "Regions contain availability zones".into(),
                scenario: None,
                options: vec![AnswerOption::new("t", "True"), AnswerOption::new("f", "False")],
                correct_answers: [OptionId::new("t")].into_iter().collect(),
                domain: "Cloud Concepts".into(),
                explanation: String::new(),
            }],
        }
    }

    #[test]
    fn snapshot_slot_set_get_delete() {
        let store = InMemorySnapshotStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"two"[..]));
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn attempts_list_newest_first_and_reject_duplicates() {
        let repo = InMemoryAttemptRepository::new();
        let older = Attempt::grade(exam(), AnswerSheet::new(), FinishReason::Manual, fixed_now());
        let newer = Attempt::grade(
            exam(),
            AnswerSheet::new(),
            FinishReason::Timeout,
            fixed_now() + Duration::minutes(5),
        );
        repo.append_attempt(&older).await.unwrap();
        repo.append_attempt(&newer).await.unwrap();

        let listed = repo.list_attempts(10).await.unwrap();
        assert_eq!(listed[0].id(), newer.id());
        assert_eq!(listed[1].id(), older.id());
        assert_eq!(repo.list_attempts(1).await.unwrap().len(), 1);

        let err = repo.append_attempt(&older).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let fetched = repo.get_attempt(older.id()).await.unwrap();
        assert_eq!(fetched, older);
    }
}
