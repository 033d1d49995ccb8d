use assess_core::model::{AttemptId, QuestionId};

use super::SqliteRepository;
use super::mapping::{conn, map_draft_row};
use crate::repository::{DraftRecord, DraftRepository, StorageError};

#[async_trait::async_trait]
impl DraftRepository for SqliteRepository {
    async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO drafts (attempt_id, question_id, text, saved_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                    text = excluded.text,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(draft.attempt_id.to_string())
        .bind(draft.question_id.as_str())
        .bind(draft.text.as_str())
        .bind(draft.saved_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_draft(
        &self,
        attempt_id: AttemptId,
        question_id: &QuestionId,
    ) -> Result<Option<DraftRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT attempt_id, question_id, text, saved_at
                FROM drafts
                WHERE attempt_id = ?1 AND question_id = ?2
            ",
        )
        .bind(attempt_id.to_string())
        .bind(question_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_draft_row).transpose()
    }

    async fn list_drafts(&self, attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT attempt_id, question_id, text, saved_at
                FROM drafts
                WHERE attempt_id = ?1
                ORDER BY question_id ASC
            ",
        )
        .bind(attempt_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_draft_row).collect()
    }

    async fn delete_drafts(&self, attempt_id: AttemptId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM drafts WHERE attempt_id = ?1")
            .bind(attempt_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected())
    }
}
