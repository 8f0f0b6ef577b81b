use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::{OptionId, QuestionId};

/// Selected options per question.
///
/// An empty selection is never stored: clearing every option makes the
/// question unanswered again. The same rule applies when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<QuestionId, BTreeSet<OptionId>>")]
pub struct AnswerSheet(BTreeMap<QuestionId, BTreeSet<OptionId>>);

impl From<BTreeMap<QuestionId, BTreeSet<OptionId>>> for AnswerSheet {
    fn from(mut map: BTreeMap<QuestionId, BTreeSet<OptionId>>) -> Self {
        map.retain(|_, selection| !selection.is_empty());
        Self(map)
    }
}

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection for a question; an empty set removes it.
    pub fn set(&mut self, question: QuestionId, selection: BTreeSet<OptionId>) {
        if selection.is_empty() {
            self.0.remove(&question);
        } else {
            self.0.insert(question, selection);
        }
    }

    #[must_use]
    pub fn get(&self, question: &QuestionId) -> Option<&BTreeSet<OptionId>> {
        self.0.get(question)
    }

    #[must_use]
    pub fn is_answered(&self, question: &QuestionId) -> bool {
        self.0.contains_key(question)
    }

    /// Number of answered questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &BTreeSet<OptionId>)> {
        self.0.iter()
    }
}
