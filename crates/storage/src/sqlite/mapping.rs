use assess_core::model::{AttemptId, Difficulty, QuestionId};
use sqlx::Row;

use crate::repository::{DraftRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn attempt_id_from_str(raw: &str) -> Result<AttemptId, StorageError> {
    raw.parse::<AttemptId>().map_err(ser)
}

/// Breakdown dimension as stored in `attempt_breakdowns.dimension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dimension {
    Section,
    Category,
    Difficulty,
}

impl Dimension {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Dimension::Section => "section",
            Dimension::Category => "category",
            Dimension::Difficulty => "difficulty",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, StorageError> {
        match raw {
            "section" => Ok(Dimension::Section),
            "category" => Ok(Dimension::Category),
            "difficulty" => Ok(Dimension::Difficulty),
            other => Err(StorageError::Serialization(format!(
                "invalid dimension: {other}"
            ))),
        }
    }
}

pub(crate) fn parse_difficulty(raw: &str) -> Result<Difficulty, StorageError> {
    Difficulty::parse(raw)
        .ok_or_else(|| StorageError::Serialization(format!("invalid difficulty: {raw}")))
}

pub(crate) fn map_draft_row(row: &sqlx::sqlite::SqliteRow) -> Result<DraftRecord, StorageError> {
    let attempt_id: String = row.try_get("attempt_id").map_err(ser)?;
    let question_id: String = row.try_get("question_id").map_err(ser)?;
    Ok(DraftRecord {
        attempt_id: attempt_id_from_str(&attempt_id)?,
        question_id: QuestionId::new(question_id),
        text: row.try_get("text").map_err(ser)?,
        saved_at: row.try_get("saved_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_round_trips() {
        for d in [Dimension::Section, Dimension::Category, Dimension::Difficulty] {
            assert_eq!(Dimension::parse(d.as_str()).unwrap(), d);
        }
        assert!(Dimension::parse("bogus").is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(u32_from_i64("total", -1).is_err());
        assert!(u64_from_i64("earned_points", -5).is_err());
        assert_eq!(i64_from_u64("points", 7).unwrap(), 7);
    }
}
