use exam_core::model::{AnswerSheet, Attempt, AttemptId, ExamCode, ExamData, FinishReason};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_finish_reason(s: &str) -> Result<FinishReason, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<Attempt, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let id: AttemptId = id.parse().map_err(ser)?;
    let exam_code: String = row.try_get("exam_code").map_err(ser)?;
    let score: f64 = row.try_get("score").map_err(ser)?;
    let total_questions = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let correct_answers = u32_from_i64(
        "correct_answers",
        row.try_get::<i64, _>("correct_answers").map_err(ser)?,
    )?;
    let reason: String = row.try_get("finish_reason").map_err(ser)?;
    let reason = parse_finish_reason(&reason)?;
    let finished_at = row.try_get("finished_at").map_err(ser)?;

    let exam_json: String = row.try_get("exam_json").map_err(ser)?;
    let exam: ExamData = serde_json::from_str(&exam_json).map_err(ser)?;
    let answers_json: String = row.try_get("answers_json").map_err(ser)?;
    let answers: AnswerSheet = serde_json::from_str(&answers_json).map_err(ser)?;

    Attempt::from_persisted(
        id,
        ExamCode::new(exam_code),
        score,
        total_questions,
        correct_answers,
        finished_at,
        reason,
        exam,
        answers,
    )
    .map_err(ser)
}
