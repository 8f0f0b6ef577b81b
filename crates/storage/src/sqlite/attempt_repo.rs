use exam_core::model::{Attempt, AttemptId};

use super::SqliteRepository;
use super::mapping::{map_attempt_row, ser};
use crate::repository::{AttemptRepository, StorageError};

const SELECT_COLUMNS: &str = r"
    SELECT
        id, exam_code, score, total_questions, correct_answers,
        finish_reason, finished_at, exam_json, answers_json
    FROM attempts
";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let exam_json = serde_json::to_string(attempt.exam()).map_err(ser)?;
        let answers_json = serde_json::to_string(attempt.answers()).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO attempts (
                    id, exam_code, exam_name, score, total_questions, correct_answers,
                    finish_reason, finished_at, exam_json, answers_json
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(attempt.id().to_string())
        .bind(attempt.exam_code().as_str())
        .bind(attempt.exam().exam_name.as_str())
        .bind(attempt.score())
        .bind(i64::from(attempt.total_questions()))
        .bind(i64::from(attempt.correct_answers()))
        .bind(attempt.reason().as_str())
        .bind(attempt.finished_at())
        .bind(exam_json)
        .bind(answers_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }

    async fn list_attempts(&self, limit: u32) -> Result<Vec<Attempt>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY finished_at DESC, rowid DESC LIMIT ?1");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }
}
