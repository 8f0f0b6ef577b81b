use exam_core::model::{ExamCode, OptionId, QuestionId, QuestionKind};
use exam_core::{CountdownPhase, QuestionStatus};

use super::engine::{ExamSession, SessionPhase};

/// Presentation-agnostic read model of a running session.
///
/// No pre-formatted strings beyond the question content itself; the UI decides
/// how to render time, progress and statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub exam_code: ExamCode,
    pub exam_name: String,
    pub phase: SessionPhase,
    pub countdown: CountdownPhase,
    pub time_left_seconds: u32,
    pub current_index: usize,
    pub total: usize,
    pub answered: usize,
    pub progress: f64,
    pub current: Option<CurrentQuestion>,
    pub statuses: Vec<QuestionStatus>,
}

/// The question under the cursor together with its recorded selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentQuestion {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub text: String,
    pub scenario: Option<String>,
    pub options: Vec<(OptionId, String)>,
    pub allows_multiple: bool,
    pub selected: Vec<OptionId>,
    pub flagged: bool,
    pub domain: String,
}

/// One row of a filtered question list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredEntry {
    /// Position in the session's ordering, usable with `jump`.
    pub position: usize,
    pub question_id: QuestionId,
    pub text: String,
    pub domain: String,
    pub answered: bool,
    pub flagged: bool,
}

impl SessionView {
    #[must_use]
    pub(crate) fn capture(session: &ExamSession) -> Self {
        let state = session.state();
        let current = state.current_question().map(|question| CurrentQuestion {
            id: question.id.clone(),
            kind: question.kind,
            text: question.text.clone(),
            scenario: question.scenario.clone(),
            options: question
                .options
                .iter()
                .map(|o| (o.id.clone(), o.text.clone()))
                .collect(),
            allows_multiple: question.allows_multiple(),
            selected: state
                .answers()
                .get(&question.id)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
            flagged: state.is_flagged(&question.id),
            domain: question.domain.clone(),
        });

        Self {
            exam_code: session.exam().exam_code.clone(),
            exam_name: session.exam().exam_name.clone(),
            phase: session.phase(),
            countdown: session.countdown_phase(),
            time_left_seconds: session.time_left(),
            current_index: state.current_index(),
            total: state.len(),
            answered: state.answered_count(),
            progress: state.progress_fraction(),
            current,
            statuses: state.statuses().collect(),
        }
    }
}

/// Render seconds as `MM:SS`, or `H:MM:SS` past an hour.
#[must_use]
pub fn format_time_left(seconds: u32) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
