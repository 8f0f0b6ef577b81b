use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("seconds per question must be > 0")]
    InvalidSecondsPerQuestion,

    #[error("warning thresholds must be > 0")]
    InvalidWarningThreshold,
}

/// Timing rules applied when a fresh session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSettings {
    seconds_per_question: u32,
    warning_thresholds: Vec<u32>,
    shuffle_questions: bool,
}

impl Default for ExamSettings {
    /// 90 seconds per question, warnings at two minutes, one minute and 30 seconds,
    /// questions kept in the order the exam was generated.
    fn default() -> Self {
        Self {
            seconds_per_question: 90,
            warning_thresholds: vec![120, 60, 30],
            shuffle_questions: false,
        }
    }
}

impl ExamSettings {
    /// Creates custom settings. Thresholds are deduplicated and sorted descending.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the per-question budget or any threshold is zero.
    pub fn new(
        seconds_per_question: u32,
        warning_thresholds: impl IntoIterator<Item = u32>,
        shuffle_questions: bool,
    ) -> Result<Self, SettingsError> {
        if seconds_per_question == 0 {
            return Err(SettingsError::InvalidSecondsPerQuestion);
        }
        let mut thresholds: Vec<u32> = warning_thresholds.into_iter().collect();
        if thresholds.contains(&0) {
            return Err(SettingsError::InvalidWarningThreshold);
        }
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();

        Ok(Self {
            seconds_per_question,
            warning_thresholds: thresholds,
            shuffle_questions,
        })
    }

    #[must_use]
    pub fn seconds_per_question(&self) -> u32 {
        self.seconds_per_question
    }

    #[must_use]
    pub fn warning_thresholds(&self) -> &[u32] {
        &self.warning_thresholds
    }

    #[must_use]
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    /// Time budget for a fresh session with `question_count` questions.
    #[must_use]
    pub fn time_budget(&self, question_count: usize) -> u32 {
        let count = u32::try_from(question_count).unwrap_or(u32::MAX);
        count.saturating_mul(self.seconds_per_question)
    }
}
