use chrono::{DateTime, Utc};
use std::fmt;

use exam_core::model::{
    Attempt, ExamData, ExamSettings, FinishReason, OptionId, Question, QuestionId,
};
use exam_core::{
    Clock, Countdown, CountdownPhase, FilteredView, IntentRejection, QuestionFilter, SessionState,
    Tick,
};
use storage::{PersistenceGateway, RestoredSession, SessionSnapshot};

use super::view::{FilteredEntry, SessionView};
use crate::error::SessionError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    Ended(FinishReason),
    Abandoned,
}

/// Result of applying a user intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    /// The intent was dropped; state is unchanged.
    Rejected(IntentRejection),
}

impl IntentOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, IntentOutcome::Applied)
    }
}

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Advanced { remaining: u32, warning: Option<u32> },
    /// Time ran out on this tick; the session is now ended with this attempt.
    Expired(Attempt),
    /// Suspended, expired, or ended: nothing changed.
    Idle,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// The single in-progress exam.
///
/// Every state-affecting intent is applied here and immediately followed by a
/// snapshot write. Once the session leaves `Active`, intents and ticks are
/// dropped.
pub struct ExamSession {
    exam: ExamData,
    state: SessionState,
    countdown: Countdown,
    phase: SessionPhase,
    gateway: PersistenceGateway,
    clock: Clock,
    started_at: DateTime<Utc>,
    attempt: Option<Attempt>,
    archived: bool,
}

impl ExamSession {
    pub(crate) fn start(
        exam: ExamData,
        settings: &ExamSettings,
        gateway: PersistenceGateway,
        clock: Clock,
    ) -> Self {
        let mut state = SessionState::fresh(&exam);
        if settings.shuffle_questions() {
            use rand::seq::SliceRandom;
            state.shuffle_with(|questions| questions.shuffle(&mut rand::rng()));
        }
        let countdown = Countdown::new(
            settings.time_budget(exam.questions.len()),
            settings.warning_thresholds(),
        );
        Self::assemble(exam, state, countdown, gateway, clock)
    }

    pub(crate) fn restore(
        exam: ExamData,
        restored: RestoredSession,
        settings: &ExamSettings,
        gateway: PersistenceGateway,
        clock: Clock,
    ) -> Self {
        let mut countdown =
            Countdown::new(restored.time_left_seconds, settings.warning_thresholds());
        if restored.suspended {
            countdown.suspend();
        }
        Self::assemble(exam, restored.state, countdown, gateway, clock)
    }

    fn assemble(
        exam: ExamData,
        state: SessionState,
        countdown: Countdown,
        gateway: PersistenceGateway,
        clock: Clock,
    ) -> Self {
        Self {
            exam,
            state,
            countdown,
            phase: SessionPhase::Active,
            gateway,
            clock,
            started_at: clock.now(),
            attempt: None,
            archived: false,
        }
    }

    // Queries

    #[must_use]
    pub fn exam(&self) -> &ExamData {
        &self.exam
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True while intents and ticks are still accepted.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.phase == SessionPhase::Active && !self.countdown.is_expired()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.state.current_question()
    }

    #[must_use]
    pub fn progress_fraction(&self) -> f64 {
        self.state.progress_fraction()
    }

    #[must_use]
    pub fn time_left(&self) -> u32 {
        self.countdown.remaining()
    }

    #[must_use]
    pub fn countdown_phase(&self) -> CountdownPhase {
        self.countdown.phase()
    }

    #[must_use]
    pub fn is_flagged(&self, id: &QuestionId) -> bool {
        self.state.is_flagged(id)
    }

    #[must_use]
    pub fn filtered_questions<'a>(&'a self, filter: &'a QuestionFilter) -> FilteredView<'a> {
        self.state.filter(filter)
    }

    #[must_use]
    pub fn filtered_entries(&self, filter: &QuestionFilter) -> Vec<FilteredEntry> {
        self.state
            .filter(filter)
            .iter()
            .map(|(position, question)| FilteredEntry {
                position,
                question_id: question.id.clone(),
                text: question.text.clone(),
                domain: question.domain.clone(),
                answered: self.state.answers().is_answered(&question.id),
                flagged: self.state.is_flagged(&question.id),
            })
            .collect()
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView::capture(self)
    }

    /// The graded attempt, once the session has finished.
    #[must_use]
    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    // Intents

    pub fn answer(
        &mut self,
        question_id: &QuestionId,
        options: impl IntoIterator<Item = OptionId>,
    ) -> IntentOutcome {
        self.apply("answer", |state| state.select_answer(question_id, options))
    }

    pub fn answer_current(&mut self, options: impl IntoIterator<Item = OptionId>) -> IntentOutcome {
        let Some(id) = self.current_question().map(|q| q.id.clone()) else {
            return IntentOutcome::Rejected(IntentRejection::IndexOutOfRange {
                index: self.state.current_index(),
                len: self.state.len(),
            });
        };
        self.answer(&id, options)
    }

    pub fn toggle_flag(&mut self, question_id: &QuestionId) -> IntentOutcome {
        self.apply("toggle_flag", |state| state.toggle_flag(question_id).map(|_| ()))
    }

    pub fn toggle_current_flag(&mut self) -> IntentOutcome {
        let Some(id) = self.current_question().map(|q| q.id.clone()) else {
            return IntentOutcome::Rejected(IntentRejection::IndexOutOfRange {
                index: self.state.current_index(),
                len: self.state.len(),
            });
        };
        self.toggle_flag(&id)
    }

    pub fn jump(&mut self, index: usize) -> IntentOutcome {
        self.apply("jump", |state| state.jump(index))
    }

    pub fn next(&mut self) -> IntentOutcome {
        self.apply("next", SessionState::next)
    }

    pub fn previous(&mut self) -> IntentOutcome {
        self.apply("previous", SessionState::previous)
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> IntentOutcome {
        self.apply("reorder", |state| state.reorder(from, to))
    }

    /// Enter reading mode: freeze the countdown.
    pub fn suspend(&mut self) -> IntentOutcome {
        if !self.is_live() {
            return self.reject("suspend", IntentRejection::SessionEnded);
        }
        if !self.countdown.suspend() {
            return self.reject("suspend", IntentRejection::CountdownNotRunning);
        }
        self.persist();
        IntentOutcome::Applied
    }

    /// Leave reading mode: continue from the frozen value.
    pub fn resume_countdown(&mut self) -> IntentOutcome {
        if !self.is_live() {
            return self.reject("resume", IntentRejection::SessionEnded);
        }
        if !self.countdown.resume() {
            return self.reject("resume", IntentRejection::CountdownAlreadyRunning);
        }
        self.persist();
        IntentOutcome::Applied
    }

    /// Advance the countdown by one second.
    ///
    /// Reaching zero finishes the session with the answers held at that
    /// instant; later ticks are idle.
    pub fn tick(&mut self) -> TickEvent {
        if self.phase != SessionPhase::Active {
            return TickEvent::Idle;
        }
        match self.countdown.tick() {
            Tick::Advanced { remaining, warning } => {
                self.persist();
                TickEvent::Advanced { remaining, warning }
            }
            Tick::Expired => {
                tracing::info!(exam = %self.exam.exam_code, "countdown expired");
                // The slot keeps zero seconds until archival clears it.
                self.persist();
                TickEvent::Expired(self.seal(FinishReason::Timeout))
            }
            Tick::Ignored(_) => TickEvent::Idle,
        }
    }

    /// Freeze the answers and grade them.
    ///
    /// The snapshot stays in place until the attempt has been archived.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Ended` if the session already finished or was abandoned.
    pub fn finish(&mut self, reason: FinishReason) -> Result<Attempt, SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(SessionError::Ended);
        }
        Ok(self.seal(reason))
    }

    fn seal(&mut self, reason: FinishReason) -> Attempt {
        let attempt = Attempt::grade(
            self.exam.clone(),
            self.state.answers().clone(),
            reason,
            self.clock.now(),
        );
        self.phase = SessionPhase::Ended(reason);
        self.attempt = Some(attempt.clone());
        tracing::info!(
            exam = %self.exam.exam_code,
            %reason,
            correct = attempt.correct_answers(),
            total = attempt.total_questions(),
            "session finished"
        );
        attempt
    }

    /// Drop the session without grading it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Ended` if already over, or `SessionError::Storage`
    /// if the snapshot cannot be cleared; the session then stays active.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(SessionError::Ended);
        }
        self.gateway.clear()?;
        self.phase = SessionPhase::Abandoned;
        tracing::info!(exam = %self.exam.exam_code, "session abandoned");
        Ok(())
    }

    /// Record that the attempt reached the history store and drop the snapshot.
    pub(crate) fn mark_archived(&mut self) -> Result<(), SessionError> {
        self.archived = true;
        self.gateway.clear()?;
        Ok(())
    }

    /// Write the current state to the snapshot slot.
    ///
    /// Failures are logged; the in-memory session stays authoritative.
    pub(crate) fn persist(&self) {
        let snapshot = SessionSnapshot::capture(
            &self.exam,
            &self.state,
            self.countdown.remaining(),
            self.clock.now(),
        )
        .with_countdown_suspended(self.countdown.phase() == CountdownPhase::Suspended);
        if let Err(err) = self.gateway.save(&snapshot) {
            tracing::warn!(error = %err, "failed to write session snapshot");
        }
    }

    fn apply(
        &mut self,
        intent: &'static str,
        op: impl FnOnce(&mut SessionState) -> Result<(), IntentRejection>,
    ) -> IntentOutcome {
        if !self.is_live() {
            return self.reject(intent, IntentRejection::SessionEnded);
        }
        match op(&mut self.state) {
            Ok(()) => {
                self.persist();
                IntentOutcome::Applied
            }
            Err(reason) => self.reject(intent, reason),
        }
    }

    fn reject(&self, intent: &'static str, reason: IntentRejection) -> IntentOutcome {
        tracing::debug!(intent, %reason, "intent rejected");
        IntentOutcome::Rejected(reason)
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("exam_code", &self.exam.exam_code)
            .field("questions", &self.state.len())
            .field("current", &self.state.current_index())
            .field("answered", &self.state.answered_count())
            .field("time_left", &self.countdown.remaining())
            .field("phase", &self.phase)
            .field("archived", &self.archived)
            .finish_non_exhaustive()
    }
}
