use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId};
use crate::model::question::Difficulty;

//
// ─── SCORED ANSWER ─────────────────────────────────────────────────────────────
//

/// Scoring outcome for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAnswer {
    pub question_id: QuestionId,
    pub points_earned: u32,
    pub is_correct: bool,
}

//
// ─── BREAKDOWN ─────────────────────────────────────────────────────────────────
//

/// Totals for one group (a section, a category, or a difficulty tier).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub correct: u32,
    pub total: u32,
    pub earned_points: u64,
    pub max_points: u64,
}

impl Breakdown {
    pub(crate) fn add(&mut self, max_points: u32, scored: Option<&ScoredAnswer>) {
        self.total = self.total.saturating_add(1);
        self.max_points = self.max_points.saturating_add(u64::from(max_points));
        if let Some(scored) = scored {
            self.earned_points = self
                .earned_points
                .saturating_add(u64::from(scored.points_earned));
            if scored.is_correct {
                self.correct = self.correct.saturating_add(1);
            }
        }
    }

    /// Point-weighted percentage for the group, rounded half up.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        rounded_percentage(self.earned_points, self.max_points)
    }
}

/// `round(earned / total * 100)` with half rounding up, in integer arithmetic.
/// Returns 0 when `total` is 0.
#[must_use]
pub fn rounded_percentage(earned: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let earned = u128::from(earned.min(total));
    let total = u128::from(total);
    let pct = (earned * 200 + total) / (total * 2);
    u32::try_from(pct).unwrap_or(100)
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// Terminal, scored outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    pub earned_points: u64,
    pub total_points: u64,
    pub percentage: u32,
    pub correct_count: u32,
    pub total_questions: u32,
    pub answers: Vec<ScoredAnswer>,
    pub by_section: BTreeMap<String, Breakdown>,
    pub by_category: BTreeMap<String, Breakdown>,
    pub by_difficulty: BTreeMap<Difficulty, Breakdown>,
}

impl AssessmentResult {
    #[must_use]
    pub fn scored(&self, question_id: &QuestionId) -> Option<&ScoredAnswer> {
        self.answers.iter().find(|a| &a.question_id == question_id)
    }
}

//
// ─── ATTEMPT SUMMARY ───────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptSummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("earned points ({earned}) exceed total points ({total})")]
    PointsOverflow { earned: u64, total: u64 },
}

/// A completed attempt as it is persisted for history views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSummary {
    attempt_id: AttemptId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    time_limit_secs: Option<u32>,
    result: AssessmentResult,
}

impl AttemptSummary {
    /// # Errors
    ///
    /// Returns `AttemptSummaryError` if timestamps are inverted or the result totals
    /// are inconsistent.
    pub fn new(
        attempt_id: AttemptId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        time_limit_secs: Option<u32>,
        result: AssessmentResult,
    ) -> Result<Self, AttemptSummaryError> {
        if completed_at < started_at {
            return Err(AttemptSummaryError::InvalidTimeRange);
        }
        if result.earned_points > result.total_points {
            return Err(AttemptSummaryError::PointsOverflow {
                earned: result.earned_points,
                total: result.total_points,
            });
        }
        Ok(Self {
            attempt_id,
            started_at,
            completed_at,
            time_limit_secs,
            result,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn result(&self) -> &AssessmentResult {
        &self.result
    }

    /// Whole seconds between start and completion.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}
