use std::sync::Arc;

use exam_core::model::{Attempt, ExamData, ExamSettings, FinishReason};
use storage::repository::{AttemptRepository, SnapshotStore, Storage, StorageError};
use storage::{PersistenceGateway, Restoration, SnapshotOffer, StaleReason};

use super::engine::ExamSession;
use crate::Clock;
use crate::error::SessionError;

/// Result of trying to pick up a saved session.
#[derive(Debug)]
pub enum ResumeOutcome {
    Resumed(ExamSession),
    /// The snapshot had no time left; it was graded and archived on the spot.
    Expired(Attempt),
    /// The snapshot did not match and has been discarded.
    Stale(StaleReason),
    Absent,
}

/// Orchestrates session start, resume and archival.
#[derive(Clone)]
pub struct ExamSessionService {
    clock: Clock,
    settings: ExamSettings,
    gateway: PersistenceGateway,
    attempts: Arc<dyn AttemptRepository>,
}

impl ExamSessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: ExamSettings,
        snapshots: Arc<dyn SnapshotStore>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            gateway: PersistenceGateway::new(snapshots),
            attempts,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, settings: ExamSettings, storage: &Storage) -> Self {
        Self::new(
            clock,
            settings,
            Arc::clone(&storage.snapshots),
            Arc::clone(&storage.attempts),
        )
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Start a fresh session, replacing any saved one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidExam` for malformed exams, or
    /// `SessionError::Storage` if the previous snapshot cannot be cleared.
    pub fn start_session(&self, exam: ExamData) -> Result<ExamSession, SessionError> {
        exam.validate()?;
        self.gateway.clear()?;
        let session = ExamSession::start(exam, &self.settings, self.gateway.clone(), self.clock);
        tracing::info!(
            exam = %session.exam().exam_code,
            questions = session.state().len(),
            seconds = session.time_left(),
            "session started"
        );
        session.persist();
        Ok(session)
    }

    /// Describe a saved session, if any, without applying it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot store fails.
    pub fn pending_session(&self) -> Result<Option<SnapshotOffer>, SessionError> {
        Ok(self.gateway.offer()?)
    }

    /// Resume the saved session against a freshly supplied exam.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidExam` for malformed exams, or
    /// `SessionError::Storage` on store failures.
    pub async fn resume_session(&self, exam: ExamData) -> Result<ResumeOutcome, SessionError> {
        exam.validate()?;
        let restored = match self.gateway.restore(&exam)? {
            Restoration::Restored(restored) => restored,
            Restoration::Stale(reason) => return Ok(ResumeOutcome::Stale(reason)),
            Restoration::Absent => return Ok(ResumeOutcome::Absent),
        };

        let mut session = ExamSession::restore(
            exam,
            restored,
            &self.settings,
            self.gateway.clone(),
            self.clock,
        );
        tracing::info!(
            exam = %session.exam().exam_code,
            answered = session.state().answered_count(),
            seconds = session.time_left(),
            "session resumed"
        );

        if session.time_left() == 0 {
            let attempt = self.finish_session(&mut session, FinishReason::Timeout).await?;
            return Ok(ResumeOutcome::Expired(attempt));
        }
        Ok(ResumeOutcome::Resumed(session))
    }

    /// Resume using the exam stored inside the snapshot itself.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on store failures.
    pub async fn resume_saved_exam(&self) -> Result<ResumeOutcome, SessionError> {
        let snapshot = match self.gateway.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(ResumeOutcome::Absent),
            Err(StorageError::Serialization(reason)) => {
                return self.discard(StaleReason::Corrupt(reason));
            }
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = snapshot.exam_data.validate() {
            return self.discard(StaleReason::Corrupt(err.to_string()));
        }
        self.resume_session(snapshot.exam_data).await
    }

    /// Throw away the saved session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be cleared.
    pub fn decline_resume(&self) -> Result<(), SessionError> {
        tracing::info!("saved session declined");
        Ok(self.gateway.clear()?)
    }

    /// Finish `session` and archive the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Ended` if the session is already over, or
    /// `SessionError::Storage` if archiving fails. In the latter case the
    /// session keeps its attempt and `finalize_attempt` can be retried.
    pub async fn finish_session(
        &self,
        session: &mut ExamSession,
        reason: FinishReason,
    ) -> Result<Attempt, SessionError> {
        session.finish(reason)?;
        self.finalize_attempt(session).await
    }

    /// Append the finished attempt to history, then drop the snapshot.
    ///
    /// Safe to call repeatedly: an attempt already in history counts as
    /// archived.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFinished` if the session has no attempt yet,
    /// or `SessionError::Storage` if the history append or snapshot clear fails.
    pub async fn finalize_attempt(&self, session: &mut ExamSession) -> Result<Attempt, SessionError> {
        let attempt = session.attempt().cloned().ok_or(SessionError::NotFinished)?;
        if session.is_archived() {
            return Ok(attempt);
        }

        match self.attempts.append_attempt(&attempt).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                tracing::debug!(attempt = %attempt.id(), "attempt already archived");
            }
            Err(err) => {
                tracing::warn!(attempt = %attempt.id(), error = %err, "failed to archive attempt");
                return Err(err.into());
            }
        }
        session.mark_archived()?;
        tracing::info!(attempt = %attempt.id(), score = attempt.score(), "attempt archived");
        Ok(attempt)
    }

    /// Abandon without grading; the snapshot is cleared.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session is over or the snapshot cannot be cleared.
    pub fn abandon(&self, session: &mut ExamSession) -> Result<(), SessionError> {
        session.abandon()
    }

    fn discard(&self, reason: StaleReason) -> Result<ResumeOutcome, SessionError> {
        tracing::warn!(%reason, "discarding stale session snapshot");
        self.gateway.clear()?;
        Ok(ResumeOutcome::Stale(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use exam_core::CountdownPhase;
    use exam_core::model::{AttemptId, OptionId, QuestionId};
    use exam_core::time::fixed_clock;
    use storage::{InMemoryAttemptRepository, InMemorySnapshotStore};

    use crate::sessions::engine::{SessionPhase, TickEvent};
    use crate::sessions::test_support::sample_exam;

    fn service() -> (ExamSessionService, InMemorySnapshotStore, InMemoryAttemptRepository) {
        let snapshots = InMemorySnapshotStore::new();
        let attempts = InMemoryAttemptRepository::new();
        let service = ExamSessionService::new(
            fixed_clock(),
            ExamSettings::default(),
            Arc::new(snapshots.clone()),
            Arc::new(attempts.clone()),
        );
        (service, snapshots, attempts)
    }

    #[test]
    fn start_writes_initial_snapshot() {
        let (service, snapshots, _) = service();
        let session = service.start_session(sample_exam(10)).unwrap();

        assert_eq!(session.time_left(), 900);
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_some());
        let offer = service.pending_session().unwrap().unwrap();
        assert_eq!(offer.total, 10);
        assert_eq!(offer.answered, 0);
        assert_eq!(offer.time_left_seconds, 900);
    }

    #[test]
    fn start_rejects_invalid_exam() {
        let (service, _, _) = service();
        let mut exam = sample_exam(2);
        exam.questions.clear();
        let err = service.start_session(exam).unwrap_err();
        assert!(matches!(err, SessionError::InvalidExam(_)));
    }

    #[tokio::test]
    async fn resume_restores_answers_flags_and_cursor() {
        let (service, _, _) = service();
        let mut session = service.start_session(sample_exam(5)).unwrap();
        assert!(session.answer(&QuestionId::new("q2"), [OptionId::new("a")]).is_applied());
        assert!(session.toggle_flag(&QuestionId::new("q3")).is_applied());
        assert!(session.jump(3).is_applied());
        for _ in 0..10 {
            session.tick();
        }
        drop(session);

        let ResumeOutcome::Resumed(resumed) = service.resume_session(sample_exam(5)).await.unwrap()
        else {
            panic!("expected a resumed session");
        };
        assert_eq!(resumed.time_left(), 440);
        assert_eq!(resumed.state().current_index(), 3);
        assert!(resumed.state().answers().is_answered(&QuestionId::new("q2")));
        assert!(resumed.is_flagged(&QuestionId::new("q3")));
    }

    #[tokio::test]
    async fn resume_keeps_reading_mode_frozen() {
        let (service, _, _) = service();
        let mut session = service.start_session(sample_exam(2)).unwrap();
        session.tick();
        assert!(session.suspend().is_applied());
        drop(session);

        let ResumeOutcome::Resumed(mut resumed) =
            service.resume_session(sample_exam(2)).await.unwrap()
        else {
            panic!("expected a resumed session");
        };
        assert_eq!(resumed.countdown_phase(), CountdownPhase::Suspended);
        assert_eq!(resumed.time_left(), 179);
        assert_eq!(resumed.tick(), TickEvent::Idle);
        assert_eq!(resumed.time_left(), 179);

        assert!(resumed.resume_countdown().is_applied());
        resumed.tick();
        assert_eq!(resumed.time_left(), 178);
    }

    #[tokio::test]
    async fn resume_discards_snapshot_for_other_exam() {
        let (service, snapshots, _) = service();
        service.start_session(sample_exam(3)).unwrap();

        let mut other = sample_exam(3);
        other.exam_code = "OTHER".into();
        let outcome = service.resume_session(other).await.unwrap();

        assert!(matches!(
            outcome,
            ResumeOutcome::Stale(StaleReason::ExamMismatch { .. })
        ));
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_saved_exam_uses_embedded_exam() {
        let (service, _, _) = service();
        let mut session = service.start_session(sample_exam(4)).unwrap();
        session.next();
        drop(session);

        let ResumeOutcome::Resumed(resumed) = service.resume_saved_exam().await.unwrap() else {
            panic!("expected a resumed session");
        };
        assert_eq!(resumed.exam().exam_code.as_str(), "SAMPLE-01");
        assert_eq!(resumed.state().current_index(), 1);
    }

    #[tokio::test]
    async fn resume_saved_exam_discards_garbage() {
        let (service, snapshots, _) = service();
        snapshots.set(storage::SNAPSHOT_KEY, b"{not json").unwrap();

        let outcome = service.resume_saved_exam().await.unwrap();
        assert!(matches!(outcome, ResumeOutcome::Stale(StaleReason::Corrupt(_))));
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_with_no_time_left_finishes_immediately() {
        let settings = ExamSettings::new(1, vec![], false).unwrap();
        let snapshots = InMemorySnapshotStore::new();
        let attempts = InMemoryAttemptRepository::new();
        let service = ExamSessionService::new(
            fixed_clock(),
            settings,
            Arc::new(snapshots.clone()),
            Arc::new(attempts.clone()),
        );
        let mut session = service.start_session(sample_exam(1)).unwrap();
        session.answer(&QuestionId::new("q0"), [OptionId::new("a")]);
        drop(session);

        // The process died right as the last second elapsed.
        let gateway = PersistenceGateway::new(Arc::new(snapshots.clone()));
        let mut snapshot = gateway.load().unwrap().unwrap();
        snapshot.time_left_seconds = 0;
        gateway.save(&snapshot).unwrap();

        let ResumeOutcome::Expired(attempt) = service.resume_session(sample_exam(1)).await.unwrap()
        else {
            panic!("expected an expired resume");
        };
        assert_eq!(attempt.reason(), FinishReason::Timeout);
        assert_eq!(attempts.list_attempts(10).await.unwrap().len(), 1);
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn decline_clears_snapshot() {
        let (service, _, _) = service();
        service.start_session(sample_exam(2)).unwrap();
        service.decline_resume().unwrap();
        assert!(service.pending_session().unwrap().is_none());
        assert!(matches!(
            service.resume_session(sample_exam(2)).await.unwrap(),
            ResumeOutcome::Absent
        ));
    }

    #[tokio::test]
    async fn finish_archives_and_clears_snapshot() {
        let (service, snapshots, attempts) = service();
        let mut session = service.start_session(sample_exam(4)).unwrap();
        session.answer(&QuestionId::new("q0"), [OptionId::new("a")]);

        let attempt = service
            .finish_session(&mut session, FinishReason::Manual)
            .await
            .unwrap();

        assert_eq!(attempt.correct_answers(), 1);
        assert_eq!(attempt.total_questions(), 4);
        assert!((attempt.score() - 25.0).abs() < f64::EPSILON);
        assert_eq!(session.phase(), SessionPhase::Ended(FinishReason::Manual));
        assert!(session.is_archived());
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
        assert_eq!(attempts.get_attempt(attempt.id()).await.unwrap(), attempt);
    }

    #[tokio::test]
    async fn finish_twice_is_rejected() {
        let (service, _, _) = service();
        let mut session = service.start_session(sample_exam(2)).unwrap();
        service
            .finish_session(&mut session, FinishReason::Manual)
            .await
            .unwrap();
        let err = service
            .finish_session(&mut session, FinishReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Ended));
    }

    #[tokio::test]
    async fn finalize_before_finish_is_an_error() {
        let (service, _, _) = service();
        let mut session = service.start_session(sample_exam(2)).unwrap();
        let err = service.finalize_attempt(&mut session).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFinished));
    }

    struct FlakyAttempts {
        inner: InMemoryAttemptRepository,
        fail: AtomicBool,
    }

    #[async_trait]
    impl AttemptRepository for FlakyAttempts {
        async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Connection("offline".into()));
            }
            self.inner.append_attempt(attempt).await
        }

        async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
            self.inner.get_attempt(id).await
        }

        async fn list_attempts(&self, limit: u32) -> Result<Vec<Attempt>, StorageError> {
            self.inner.list_attempts(limit).await
        }
    }

    #[tokio::test]
    async fn failed_archive_keeps_snapshot_until_retry_succeeds() {
        let snapshots = InMemorySnapshotStore::new();
        let attempts = Arc::new(FlakyAttempts {
            inner: InMemoryAttemptRepository::new(),
            fail: AtomicBool::new(true),
        });
        let service = ExamSessionService::new(
            fixed_clock(),
            ExamSettings::default(),
            Arc::new(snapshots.clone()),
            attempts.clone(),
        );
        let mut session = service.start_session(sample_exam(2)).unwrap();

        let err = service
            .finish_session(&mut session, FinishReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_some());
        assert!(!session.is_archived());

        attempts.fail.store(false, Ordering::SeqCst);
        let attempt = service.finalize_attempt(&mut session).await.unwrap();
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
        assert_eq!(attempts.list_attempts(10).await.unwrap(), vec![attempt.clone()]);

        // Retrying after success does not duplicate history.
        service.finalize_attempt(&mut session).await.unwrap();
        assert_eq!(attempts.list_attempts(10).await.unwrap().len(), 1);
    }

    #[test]
    fn abandon_clears_snapshot_and_blocks_intents() {
        let (service, snapshots, _) = service();
        let mut session = service.start_session(sample_exam(2)).unwrap();
        service.abandon(&mut session).unwrap();

        assert_eq!(session.phase(), SessionPhase::Abandoned);
        assert!(snapshots.get(storage::SNAPSHOT_KEY).unwrap().is_none());
        assert!(!session.next().is_applied());
    }
}
