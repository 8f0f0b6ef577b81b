//! Drives one session from a single task.
//!
//! Ticks and user intents are merged into one ordered stream, so no intent
//! ever observes a half-applied tick. When both are ready at the same instant
//! the tick goes first.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, Interval};

use exam_core::model::{Attempt, FinishReason, OptionId, QuestionId};
use exam_core::{IntentRejection, QuestionFilter};

use super::engine::{ExamSession, IntentOutcome, TickEvent};
use super::view::{FilteredEntry, SessionView};
use super::workflow::ExamSessionService;
use crate::alerts::{AlertSink, SilentAlerts};
use crate::error::SessionError;

const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// A request from the UI.
#[derive(Debug)]
pub enum Intent {
    Answer {
        question: QuestionId,
        options: Vec<OptionId>,
    },
    AnswerCurrent(Vec<OptionId>),
    ToggleFlag(QuestionId),
    ToggleCurrentFlag,
    Jump(usize),
    Next,
    Previous,
    Reorder {
        from: usize,
        to: usize,
    },
    /// Enter reading mode.
    Suspend,
    /// Leave reading mode.
    ResumeCountdown,
    Filter {
        filter: QuestionFilter,
        reply: oneshot::Sender<Vec<FilteredEntry>>,
    },
    Inspect(oneshot::Sender<SessionView>),
    Finish,
    Abandon,
    /// Stop driving the session but keep its snapshot for a later resume.
    Detach,
}

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Updated(SessionView),
    Rejected(IntentRejection),
    Tick { remaining: u32 },
    TimeWarning { remaining: u32 },
    Finished(Attempt),
    /// Graded but not yet in history; the snapshot is still in place.
    ArchiveFailed { attempt: Attempt, error: String },
    /// The snapshot could not be dropped; the session keeps running.
    AbandonFailed { error: String },
    Abandoned,
}

/// How the runner task ended.
#[derive(Debug)]
pub enum RunOutcome {
    Finished(Attempt),
    /// Archiving failed; retry with `ExamSessionService::finalize_attempt`.
    Unarchived(Box<ExamSession>),
    Abandoned,
    Detached(Box<ExamSession>),
}

enum Exit {
    Finished,
    Abandoned,
    Detached,
}

pub struct SessionRunner {
    service: ExamSessionService,
    session: ExamSession,
    alerts: Arc<dyn AlertSink>,
    tick_period: Duration,
}

impl SessionRunner {
    #[must_use]
    pub fn new(service: ExamSessionService, session: ExamSession) -> Self {
        Self {
            service,
            session,
            alerts: Arc::new(SilentAlerts),
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Spawn the runner on the current tokio runtime.
    ///
    /// The first tick is due one period after this call.
    pub fn spawn(self) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let ticker = time::interval_at(Instant::now() + self.tick_period, self.tick_period);
        let task = tokio::spawn(self.run(ticker, intent_rx, event_tx));
        (
            SessionHandle {
                intents: intent_tx,
                task,
            },
            event_rx,
        )
    }

    async fn run(
        mut self,
        mut ticker: Interval,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> RunOutcome {
        tracing::debug!(exam = %self.session.exam().exam_code, "session runner started");
        loop {
            let flow = tokio::select! {
                biased;
                _ = ticker.tick() => self.on_tick(&events),
                intent = intents.recv() => match intent {
                    Some(intent) => self.on_intent(intent, &events),
                    None => ControlFlow::Break(Exit::Detached),
                },
            };
            if let ControlFlow::Break(exit) = flow {
                return self.conclude(exit, &events).await;
            }
        }
    }

    fn on_tick(&mut self, events: &mpsc::UnboundedSender<SessionEvent>) -> ControlFlow<Exit> {
        match self.session.tick() {
            TickEvent::Advanced { remaining, warning } => {
                emit(events, SessionEvent::Tick { remaining });
                if let Some(remaining) = warning {
                    self.alerts.time_warning(remaining);
                    emit(events, SessionEvent::TimeWarning { remaining });
                }
                ControlFlow::Continue(())
            }
            TickEvent::Expired(_) => ControlFlow::Break(Exit::Finished),
            TickEvent::Idle => ControlFlow::Continue(()),
        }
    }

    fn on_intent(
        &mut self,
        intent: Intent,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> ControlFlow<Exit> {
        let session = &mut self.session;
        let outcome = match intent {
            Intent::Answer { question, options } => session.answer(&question, options),
            Intent::AnswerCurrent(options) => session.answer_current(options),
            Intent::ToggleFlag(question) => session.toggle_flag(&question),
            Intent::ToggleCurrentFlag => session.toggle_current_flag(),
            Intent::Jump(index) => session.jump(index),
            Intent::Next => session.next(),
            Intent::Previous => session.previous(),
            Intent::Reorder { from, to } => session.reorder(from, to),
            Intent::Suspend => session.suspend(),
            Intent::ResumeCountdown => session.resume_countdown(),
            Intent::Filter { filter, reply } => {
                let _ = reply.send(session.filtered_entries(&filter));
                return ControlFlow::Continue(());
            }
            Intent::Inspect(reply) => {
                let _ = reply.send(session.view());
                return ControlFlow::Continue(());
            }
            Intent::Finish => match session.finish(FinishReason::Manual) {
                Ok(_) => return ControlFlow::Break(Exit::Finished),
                Err(_) => IntentOutcome::Rejected(IntentRejection::SessionEnded),
            },
            Intent::Abandon => match self.service.abandon(session) {
                Ok(()) => return ControlFlow::Break(Exit::Abandoned),
                Err(SessionError::Storage(err)) => {
                    tracing::warn!(error = %err, "could not clear snapshot; session stays active");
                    emit(events, SessionEvent::AbandonFailed { error: err.to_string() });
                    return ControlFlow::Continue(());
                }
                Err(_) => IntentOutcome::Rejected(IntentRejection::SessionEnded),
            },
            Intent::Detach => return ControlFlow::Break(Exit::Detached),
        };

        match outcome {
            IntentOutcome::Applied => emit(events, SessionEvent::Updated(session.view())),
            IntentOutcome::Rejected(reason) => emit(events, SessionEvent::Rejected(reason)),
        }
        ControlFlow::Continue(())
    }

    async fn conclude(
        mut self,
        exit: Exit,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> RunOutcome {
        match exit {
            Exit::Abandoned => {
                emit(events, SessionEvent::Abandoned);
                RunOutcome::Abandoned
            }
            Exit::Detached => {
                tracing::debug!("session runner detached");
                RunOutcome::Detached(Box::new(self.session))
            }
            Exit::Finished => match self.service.finalize_attempt(&mut self.session).await {
                Ok(attempt) => {
                    emit(events, SessionEvent::Finished(attempt.clone()));
                    RunOutcome::Finished(attempt)
                }
                Err(err) => {
                    if let Some(attempt) = self.session.attempt().cloned() {
                        emit(
                            events,
                            SessionEvent::ArchiveFailed {
                                attempt,
                                error: err.to_string(),
                            },
                        );
                    }
                    RunOutcome::Unarchived(Box::new(self.session))
                }
            },
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    // A UI that stopped listening does not stop the exam.
    let _ = events.send(event);
}

/// Sending side of a running session.
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<Intent>,
    task: JoinHandle<RunOutcome>,
}

impl SessionHandle {
    /// Queue an intent. Returns false once the runner has stopped.
    pub fn send(&self, intent: Intent) -> bool {
        self.intents.send(intent).is_ok()
    }

    /// Current read model, or `None` once the runner has stopped.
    pub async fn view(&self) -> Option<SessionView> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Intent::Inspect(reply)) {
            return None;
        }
        rx.await.ok()
    }

    pub async fn filter(&self, filter: QuestionFilter) -> Option<Vec<FilteredEntry>> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Intent::Filter { filter, reply }) {
            return None;
        }
        rx.await.ok()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the runner to stop.
    ///
    /// Dropping the handle's sender first detaches a still-running session.
    ///
    /// # Errors
    ///
    /// Returns `JoinError` if the runner task panicked or was cancelled.
    pub async fn join(self) -> Result<RunOutcome, JoinError> {
        let Self { intents, task } = self;
        drop(intents);
        task.await
    }
}
