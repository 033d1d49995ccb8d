use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY,
            attempt_id TEXT NOT NULL UNIQUE,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            time_limit_secs INTEGER CHECK (time_limit_secs IS NULL OR time_limit_secs > 0),
            earned_points INTEGER NOT NULL CHECK (earned_points >= 0),
            total_points INTEGER NOT NULL CHECK (total_points >= earned_points),
            percentage INTEGER NOT NULL CHECK (percentage BETWEEN 0 AND 100),
            correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
            total_questions INTEGER NOT NULL CHECK (total_questions >= correct_count)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempt_answers (
            attempt_row_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            question_id TEXT NOT NULL,
            points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            PRIMARY KEY (attempt_row_id, position),
            FOREIGN KEY (attempt_row_id) REFERENCES attempts(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempt_breakdowns (
            attempt_row_id INTEGER NOT NULL,
            dimension TEXT NOT NULL CHECK (dimension IN ('section', 'category', 'difficulty')),
            group_key TEXT NOT NULL,
            correct INTEGER NOT NULL CHECK (correct >= 0),
            total INTEGER NOT NULL CHECK (total >= correct),
            earned_points INTEGER NOT NULL CHECK (earned_points >= 0),
            max_points INTEGER NOT NULL CHECK (max_points >= earned_points),
            PRIMARY KEY (attempt_row_id, dimension, group_key),
            FOREIGN KEY (attempt_row_id) REFERENCES attempts(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS drafts (
            attempt_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            text TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            PRIMARY KEY (attempt_id, question_id)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_completed
            ON attempts (completed_at, id);
    ",
];

/// Runs the versioned schema migrations.
///
/// Version 1 creates attempts with their scored answers and breakdowns, plus drafts.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
