use assess_core::model::{AssessmentResult, AttemptSummary, Breakdown, QuestionId, ScoredAnswer};
use sqlx::Row;
use std::collections::BTreeMap;

use super::SqliteRepository;
use super::mapping::{
    Dimension, attempt_id_from_str, conn, i64_from_u64, parse_difficulty, ser, u32_from_i64,
    u64_from_i64,
};
use crate::repository::{AttemptRepository, AttemptRow, StorageError};

fn breakdown_rows(result: &AssessmentResult) -> Vec<(Dimension, String, Breakdown)> {
    let sections = result
        .by_section
        .iter()
        .map(|(k, b)| (Dimension::Section, k.clone(), *b));
    let categories = result
        .by_category
        .iter()
        .map(|(k, b)| (Dimension::Category, k.clone(), *b));
    let difficulties = result
        .by_difficulty
        .iter()
        .map(|(k, b)| (Dimension::Difficulty, k.as_str().to_owned(), *b));
    sections.chain(categories).chain(difficulties).collect()
}

impl SqliteRepository {
    async fn load_attempt(&self, id: i64) -> Result<AttemptSummary, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    attempt_id, started_at, completed_at, time_limit_secs,
                    earned_points, total_points, percentage, correct_count, total_questions
                FROM attempts
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let answer_rows = sqlx::query(
            r"
                SELECT question_id, points_earned, is_correct
                FROM attempt_answers
                WHERE attempt_row_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut answers = Vec::with_capacity(answer_rows.len());
        for r in &answer_rows {
            answers.push(ScoredAnswer {
                question_id: QuestionId::new(r.try_get::<String, _>("question_id").map_err(ser)?),
                points_earned: u32_from_i64(
                    "points_earned",
                    r.try_get::<i64, _>("points_earned").map_err(ser)?,
                )?,
                is_correct: r.try_get::<bool, _>("is_correct").map_err(ser)?,
            });
        }

        let breakdown_rows = sqlx::query(
            r"
                SELECT dimension, group_key, correct, total, earned_points, max_points
                FROM attempt_breakdowns
                WHERE attempt_row_id = ?1
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut by_section = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut by_difficulty = BTreeMap::new();
        for r in &breakdown_rows {
            let key: String = r.try_get("group_key").map_err(ser)?;
            let breakdown = Breakdown {
                correct: u32_from_i64("correct", r.try_get::<i64, _>("correct").map_err(ser)?)?,
                total: u32_from_i64("total", r.try_get::<i64, _>("total").map_err(ser)?)?,
                earned_points: u64_from_i64(
                    "earned_points",
                    r.try_get::<i64, _>("earned_points").map_err(ser)?,
                )?,
                max_points: u64_from_i64(
                    "max_points",
                    r.try_get::<i64, _>("max_points").map_err(ser)?,
                )?,
            };
            let dimension: String = r.try_get("dimension").map_err(ser)?;
            match Dimension::parse(&dimension)? {
                Dimension::Section => {
                    by_section.insert(key, breakdown);
                }
                Dimension::Category => {
                    by_category.insert(key, breakdown);
                }
                Dimension::Difficulty => {
                    by_difficulty.insert(parse_difficulty(&key)?, breakdown);
                }
            }
        }

        let result = AssessmentResult {
            earned_points: u64_from_i64(
                "earned_points",
                row.try_get::<i64, _>("earned_points").map_err(ser)?,
            )?,
            total_points: u64_from_i64(
                "total_points",
                row.try_get::<i64, _>("total_points").map_err(ser)?,
            )?,
            percentage: u32_from_i64("percentage", row.try_get::<i64, _>("percentage").map_err(ser)?)?,
            correct_count: u32_from_i64(
                "correct_count",
                row.try_get::<i64, _>("correct_count").map_err(ser)?,
            )?,
            total_questions: u32_from_i64(
                "total_questions",
                row.try_get::<i64, _>("total_questions").map_err(ser)?,
            )?,
            answers,
            by_section,
            by_category,
            by_difficulty,
        };

        let attempt_id: String = row.try_get("attempt_id").map_err(ser)?;
        let time_limit_secs = row
            .try_get::<Option<i64>, _>("time_limit_secs")
            .map_err(ser)?
            .map(|v| u32_from_i64("time_limit_secs", v))
            .transpose()?;

        AttemptSummary::new(
            attempt_id_from_str(&attempt_id)?,
            row.try_get("started_at").map_err(ser)?,
            row.try_get("completed_at").map_err(ser)?,
            time_limit_secs,
            result,
        )
        .map_err(ser)
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, summary: &AttemptSummary) -> Result<i64, StorageError> {
        let result = summary.result();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO attempts (
                    attempt_id, started_at, completed_at, time_limit_secs,
                    earned_points, total_points, percentage, correct_count, total_questions
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(summary.attempt_id().to_string())
        .bind(summary.started_at())
        .bind(summary.completed_at())
        .bind(summary.time_limit_secs().map(i64::from))
        .bind(i64_from_u64("earned_points", result.earned_points)?)
        .bind(i64_from_u64("total_points", result.total_points)?)
        .bind(i64::from(result.percentage))
        .bind(i64::from(result.correct_count))
        .bind(i64::from(result.total_questions))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => conn(other),
        })?;
        let row_id = res.last_insert_rowid();

        for (position, answer) in result.answers.iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO attempt_answers (
                        attempt_row_id, position, question_id, points_earned, is_correct
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(row_id)
            .bind(i64_from_u64("position", position as u64)?)
            .bind(answer.question_id.as_str())
            .bind(i64::from(answer.points_earned))
            .bind(answer.is_correct)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        for (dimension, key, b) in breakdown_rows(result) {
            sqlx::query(
                r"
                    INSERT INTO attempt_breakdowns (
                        attempt_row_id, dimension, group_key,
                        correct, total, earned_points, max_points
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(row_id)
            .bind(dimension.as_str())
            .bind(key)
            .bind(i64::from(b.correct))
            .bind(i64::from(b.total))
            .bind(i64_from_u64("earned_points", b.earned_points)?)
            .bind(i64_from_u64("max_points", b.max_points)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(row_id)
    }

    async fn get_attempt(&self, id: i64) -> Result<AttemptSummary, StorageError> {
        self.load_attempt(id).await
    }

    async fn list_attempts(&self, limit: u32) -> Result<Vec<AttemptRow>, StorageError> {
        let ids = sqlx::query(
            r"
                SELECT id
                FROM attempts
                ORDER BY completed_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(ids.len());
        for row in ids {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(AttemptRow::new(id, self.load_attempt(id).await?));
        }
        Ok(out)
    }
}
