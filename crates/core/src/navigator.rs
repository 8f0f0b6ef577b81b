//! In-memory session state and the navigation operations over it.
//!
//! `SessionState` owns the working permutation of questions, the cursor, and
//! the answer/flag sets. Every operation keeps the permutation a bijection over
//! the exam's question ids.

use std::collections::BTreeSet;

use crate::error::IntentRejection;
use crate::model::{AnswerSheet, ExamData, OptionId, Question, QuestionId};

//
// ─── FILTERS ───────────────────────────────────────────────────────────────────
//

/// Answer/flag status predicate for the question picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Answered,
    Unanswered,
    Flagged,
}

/// Composable question filter; every populated criterion must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionFilter {
    status: StatusFilter,
    domain: Option<String>,
    text: Option<String>,
}

impl QuestionFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Restrict to one domain. Matching is exact; a blank domain clears the criterion.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.domain = (!domain.trim().is_empty()).then_some(domain);
        self
    }

    /// Case-insensitive substring search. A blank needle clears the criterion.
    #[must_use]
    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        let needle = text.as_ref().trim().to_lowercase();
        self.text = (!needle.is_empty()).then_some(needle);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusFilter {
        self.status
    }

    fn matches(&self, question: &Question, answered: bool, flagged: bool) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Answered => answered,
            StatusFilter::Unanswered => !answered,
            StatusFilter::Flagged => flagged,
        };
        status_ok
            && self.domain.as_deref().is_none_or(|d| question.domain == d)
            && self.text.as_deref().is_none_or(|t| question.matches_text(t))
    }
}

/// Lazy, restartable view over `(position, question)` pairs.
///
/// Each call to [`FilteredView::iter`] starts from the beginning; the
/// underlying order is never modified.
#[derive(Debug, Clone, Copy)]
pub struct FilteredView<'a> {
    state: &'a SessionState,
    filter: &'a QuestionFilter,
}

impl<'a> FilteredView<'a> {
    pub fn iter(self) -> impl Iterator<Item = (usize, &'a Question)> + 'a {
        let state = self.state;
        let filter = self.filter;
        state
            .ordered
            .iter()
            .enumerate()
            .filter(move |(_, q)| {
                filter.matches(q, state.answers.is_answered(&q.id), state.flagged.contains(&q.id))
            })
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

/// Navigator dot for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionStatus {
    pub answered: bool,
    pub flagged: bool,
    pub current: bool,
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    ordered: Vec<Question>,
    answers: AnswerSheet,
    flagged: BTreeSet<QuestionId>,
    current_index: usize,
}

impl SessionState {
    /// Fresh state in the exam's own question order.
    #[must_use]
    pub fn fresh(exam: &ExamData) -> Self {
        Self {
            ordered: exam.questions.clone(),
            answers: AnswerSheet::new(),
            flagged: BTreeSet::new(),
            current_index: 0,
        }
    }

    /// Assemble state from already reconciled parts.
    ///
    /// The caller guarantees `ordered` is a permutation of the exam; answers and
    /// flags for ids outside it are dropped and an out-of-range cursor resets to 0.
    #[must_use]
    pub fn from_parts(
        ordered: Vec<Question>,
        answers: AnswerSheet,
        flagged: BTreeSet<QuestionId>,
        current_index: usize,
    ) -> Self {
        let known: BTreeSet<&QuestionId> = ordered.iter().map(|q| &q.id).collect();
        let answers: AnswerSheet = answers
            .iter()
            .filter(|(id, _)| known.contains(id))
            .map(|(id, sel)| (id.clone(), sel.clone()))
            .collect::<std::collections::BTreeMap<_, _>>()
            .into();
        let flagged = flagged.into_iter().filter(|id| known.contains(id)).collect();
        let current_index = if current_index < ordered.len() {
            current_index
        } else {
            0
        };

        Self {
            ordered,
            answers,
            flagged,
            current_index,
        }
    }

    /// Shuffle the presentation order, keeping the first question current.
    pub fn shuffle_with(&mut self, shuffle: impl FnOnce(&mut [Question])) {
        shuffle(&mut self.ordered);
        self.current_index = 0;
    }

    // Queries

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    #[must_use]
    pub fn ordered_questions(&self) -> &[Question] {
        &self.ordered
    }

    pub fn ordered_ids(&self) -> impl Iterator<Item = &QuestionId> {
        self.ordered.iter().map(|q| &q.id)
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn flagged(&self) -> &BTreeSet<QuestionId> {
        &self.flagged
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.ordered.get(self.current_index)
    }

    #[must_use]
    pub fn position_of(&self, id: &QuestionId) -> Option<usize> {
        self.ordered.iter().position(|q| &q.id == id)
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.ordered.iter().find(|q| &q.id == id)
    }

    #[must_use]
    pub fn is_flagged(&self, id: &QuestionId) -> bool {
        self.flagged.contains(id)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Position-based progress: `(current + 1) / total`.
    #[must_use]
    pub fn progress_fraction(&self) -> f64 {
        if self.ordered.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = (self.current_index + 1) as f64 / self.ordered.len() as f64;
        fraction
    }

    #[must_use]
    pub fn status_at(&self, index: usize) -> Option<QuestionStatus> {
        self.ordered.get(index).map(|q| QuestionStatus {
            answered: self.answers.is_answered(&q.id),
            flagged: self.flagged.contains(&q.id),
            current: index == self.current_index,
        })
    }

    pub fn statuses(&self) -> impl Iterator<Item = QuestionStatus> + '_ {
        (0..self.ordered.len()).filter_map(|i| self.status_at(i))
    }

    #[must_use]
    pub fn filter<'a>(&'a self, filter: &'a QuestionFilter) -> FilteredView<'a> {
        FilteredView {
            state: self,
            filter,
        }
    }

    /// True when the order is a permutation of exactly the exam's question ids.
    #[must_use]
    pub fn covers(&self, exam: &ExamData) -> bool {
        if self.ordered.len() != exam.questions.len() {
            return false;
        }
        let ours: BTreeSet<&QuestionId> = self.ordered_ids().collect();
        let theirs: BTreeSet<&QuestionId> = exam.questions.iter().map(|q| &q.id).collect();
        ours.len() == self.ordered.len() && ours == theirs
    }

    // Mutations

    /// Replace the selection for a question.
    ///
    /// Single-answer questions take at most one option; an empty selection
    /// clears the answer. Correctness is not checked here.
    ///
    /// # Errors
    ///
    /// Returns `IntentRejection` for unknown questions or options, or when a
    /// single-answer question receives several options.
    pub fn select_answer(
        &mut self,
        question_id: &QuestionId,
        options: impl IntoIterator<Item = OptionId>,
    ) -> Result<(), IntentRejection> {
        let question = self
            .question(question_id)
            .ok_or_else(|| IntentRejection::UnknownQuestion(question_id.clone()))?;

        let selection: BTreeSet<OptionId> = options.into_iter().collect();
        if let Some(unknown) = selection.iter().find(|o| !question.has_option(o)) {
            return Err(IntentRejection::UnknownOption {
                question: question_id.clone(),
                option: unknown.clone(),
            });
        }
        if !question.allows_multiple() && selection.len() > 1 {
            return Err(IntentRejection::SingleAnswerOnly {
                question: question_id.clone(),
                count: selection.len(),
            });
        }

        self.answers.set(question_id.clone(), selection);
        Ok(())
    }

    /// Toggle the review flag. Returns the new flag state.
    ///
    /// # Errors
    ///
    /// Returns `IntentRejection::UnknownQuestion` if the id is not in the session.
    pub fn toggle_flag(&mut self, question_id: &QuestionId) -> Result<bool, IntentRejection> {
        if self.position_of(question_id).is_none() {
            return Err(IntentRejection::UnknownQuestion(question_id.clone()));
        }
        if self.flagged.remove(question_id) {
            Ok(false)
        } else {
            self.flagged.insert(question_id.clone());
            Ok(true)
        }
    }

    /// Move the cursor.
    ///
    /// # Errors
    ///
    /// Returns `IntentRejection` when the index is out of range or already current.
    pub fn jump(&mut self, index: usize) -> Result<(), IntentRejection> {
        if index >= self.ordered.len() {
            return Err(IntentRejection::IndexOutOfRange {
                index,
                len: self.ordered.len(),
            });
        }
        if index == self.current_index {
            return Err(IntentRejection::AlreadyCurrent(index));
        }
        self.current_index = index;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `IntentRejection::IndexOutOfRange` on the last question.
    pub fn next(&mut self) -> Result<(), IntentRejection> {
        self.jump(self.current_index + 1)
    }

    /// # Errors
    ///
    /// Returns `IntentRejection::IndexOutOfRange` on the first question.
    pub fn previous(&mut self) -> Result<(), IntentRejection> {
        match self.current_index.checked_sub(1) {
            Some(index) => self.jump(index),
            None => Err(IntentRejection::IndexOutOfRange {
                index: 0,
                len: self.ordered.len(),
            }),
        }
    }

    /// Move the question at `from` to `to`, shifting the ones in between.
    ///
    /// The cursor follows the question that was current before the move.
    ///
    /// # Errors
    ///
    /// Returns `IntentRejection` when either index is out of range or both are equal.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), IntentRejection> {
        let len = self.ordered.len();
        for index in [from, to] {
            if index >= len {
                return Err(IntentRejection::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Err(IntentRejection::NoMovement(from));
        }

        let current_id = self.ordered[self.current_index].id.clone();
        let moved = self.ordered.remove(from);
        self.ordered.insert(to, moved);
        self.current_index = self.position_of(&current_id).unwrap_or(0);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
