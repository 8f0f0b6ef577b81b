use async_trait::async_trait;
use std::path::{Path, PathBuf};

use exam_core::model::{ExamCode, ExamData};

use crate::error::GenerationError;

/// Parameters handed to a question generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Opaque study materials (file names, extracted text, ...).
    pub materials: Vec<String>,
    pub exam_code: ExamCode,
    /// Upper bound on questions; 0 means "whatever the source provides".
    pub question_count: u32,
    pub extra_topics: Vec<String>,
    pub language: String,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(exam_code: impl Into<ExamCode>) -> Self {
        Self {
            materials: Vec::new(),
            exam_code: exam_code.into(),
            question_count: 0,
            extra_topics: Vec::new(),
            language: "en".to_string(),
        }
    }

    #[must_use]
    pub fn with_question_count(mut self, count: u32) -> Self {
        self.question_count = count;
        self
    }
}

/// Produces a ready-made question set.
///
/// The engine only relies on a well-formed `ExamData` on success; retries are
/// the generator's business.
#[async_trait]
pub trait ExamGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns `GenerationError` if content cannot be produced or is invalid.
    async fn generate(&self, request: &GenerationRequest) -> Result<ExamData, GenerationError>;
}

/// Reads a pre-generated exam from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonExamSource {
    path: PathBuf,
}

impl JsonExamSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the whole exam.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` for unreadable, malformed, or invalid content.
    pub async fn load(&self) -> Result<ExamData, GenerationError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let exam: ExamData = serde_json::from_str(&raw)?;
        exam.validate()?;
        Ok(exam)
    }
}

#[async_trait]
impl ExamGenerator for JsonExamSource {
    async fn generate(&self, request: &GenerationRequest) -> Result<ExamData, GenerationError> {
        let mut exam = self.load().await?;
        if !request.exam_code.is_blank() && request.exam_code != exam.exam_code {
            return Err(GenerationError::ExamCodeMismatch {
                requested: request.exam_code.clone(),
                found: exam.exam_code,
            });
        }
        if request.question_count > 0 {
            let limit = usize::try_from(request.question_count).unwrap_or(usize::MAX);
            exam.questions.truncate(limit);
        }
        Ok(exam)
    }
}
