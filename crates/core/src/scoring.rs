//! Per-question scoring.
//!
//! Objective variants are all-or-nothing. Free-text answers get length-based
//! partial credit: the rule never reads the text itself, and a question's
//! grading criteria play no part in it.

use std::collections::HashMap;

use crate::model::{Answer, AnswerValue, Question, QuestionId, QuestionKind, ScoredAnswer};

/// Free-text answers at or below this many characters earn nothing.
pub const FREE_TEXT_MIN_CHARS: usize = 50;

/// Characters per credit step for free-text answers.
pub const FREE_TEXT_CHARS_PER_STEP: usize = 50;

/// Points granted per credit step.
pub const FREE_TEXT_POINTS_PER_STEP: u32 = 2;

/// Score a single question. A missing answer, or one of the wrong shape, earns zero.
#[must_use]
pub fn score(question: &Question, answer: Option<&Answer>) -> ScoredAnswer {
    let points_earned = match (question.kind(), answer.map(|a| &a.value)) {
        (QuestionKind::SingleChoice { correct, .. }, Some(AnswerValue::Choice(chosen))) => {
            if chosen == correct { question.points() } else { 0 }
        }
        (QuestionKind::TrueFalse { correct }, Some(AnswerValue::Boolean(given))) => {
            if given == correct { question.points() } else { 0 }
        }
        (QuestionKind::FreeText { .. }, Some(AnswerValue::Text(text))) => {
            free_text_points(question.points(), text)
        }
        _ => 0,
    };

    let is_correct = match question.kind() {
        QuestionKind::FreeText { .. } => free_text_passes(question.points(), points_earned),
        _ => points_earned > 0,
    };

    ScoredAnswer {
        question_id: question.id().clone(),
        points_earned,
        is_correct,
    }
}

/// Score every question in order, looking answers up by question id.
#[must_use]
pub fn score_all(questions: &[Question], answers: &HashMap<QuestionId, Answer>) -> Vec<ScoredAnswer> {
    questions
        .iter()
        .map(|q| score(q, answers.get(q.id())))
        .collect()
}

/// `min(points, floor(len / 50) * 2)` for answers longer than 50 characters.
#[must_use]
pub fn free_text_points(points: u32, text: &str) -> u32 {
    let len = text.chars().count();
    if len <= FREE_TEXT_MIN_CHARS {
        return 0;
    }
    let steps = u32::try_from(len / FREE_TEXT_CHARS_PER_STEP).unwrap_or(u32::MAX);
    steps.saturating_mul(FREE_TEXT_POINTS_PER_STEP).min(points)
}

/// `earned >= 0.6 * points`, compared exactly.
#[must_use]
pub fn free_text_passes(points: u32, earned: u32) -> bool {
    u64::from(earned) * 10 >= u64::from(points) * 6
}
