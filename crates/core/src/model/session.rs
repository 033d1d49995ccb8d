use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::answer::{Answer, AnswerValue};
use crate::model::ids::{AttemptId, QuestionId};
use crate::model::question::{Question, QuestionBank, Variant};

/// Illegal transitions and collaborator misuse of a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session has not been started")]
    NotStarted,

    #[error("session has already been started")]
    AlreadyStarted,

    #[error("session is already completed")]
    Completed,

    #[error("session is not completed")]
    NotCompleted,

    #[error("time limit must be > 0 seconds")]
    InvalidTimeLimit,

    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("answer does not fit {variant} question {id}")]
    AnswerMismatch { id: QuestionId, variant: Variant },
}

/// Lifecycle state of a session. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// One attempt at an assessment.
///
/// Holds a snapshot of the questions taken at start, the cursor, and the latest
/// answer per question. Answers stay mutable until the session completes.
#[derive(Debug, Clone)]
pub struct Session {
    attempt_id: AttemptId,
    questions: Vec<Question>,
    current: usize,
    answers: HashMap<QuestionId, Answer>,
    status: SessionStatus,
    time_limit_secs: Option<u32>,
    remaining_secs: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a fresh, not-started session with a new attempt id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_attempt_id(AttemptId::generate())
    }

    #[must_use]
    pub fn with_attempt_id(attempt_id: AttemptId) -> Self {
        Self {
            attempt_id,
            questions: Vec::new(),
            current: 0,
            answers: HashMap::new(),
            status: SessionStatus::NotStarted,
            time_limit_secs: None,
            remaining_secs: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Snapshot the bank and move to `InProgress`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadyStarted` / `Completed` if the session was started
    /// before, or `InvalidTimeLimit` for a zero limit.
    pub fn start(
        &mut self,
        bank: &QuestionBank,
        time_limit_secs: Option<u32>,
        started_at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        match self.status {
            SessionStatus::NotStarted => {}
            SessionStatus::InProgress => return Err(SessionStateError::AlreadyStarted),
            SessionStatus::Completed => return Err(SessionStateError::Completed),
        }
        if time_limit_secs == Some(0) {
            return Err(SessionStateError::InvalidTimeLimit);
        }

        self.questions = bank.questions().to_vec();
        self.current = 0;
        self.answers.clear();
        self.time_limit_secs = time_limit_secs;
        self.remaining_secs = time_limit_secs;
        self.started_at = Some(started_at);
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), SessionStateError> {
        match self.status {
            SessionStatus::InProgress => Ok(()),
            SessionStatus::NotStarted => Err(SessionStateError::NotStarted),
            SessionStatus::Completed => Err(SessionStateError::Completed),
        }
    }

    /// Insert or replace the answer for `question_id`. The cursor does not move.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` when the session is not in progress, the question is
    /// unknown, or the value does not fit the question variant.
    pub fn record_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
        submitted_at: DateTime<Utc>,
    ) -> Result<&Answer, SessionStateError> {
        self.ensure_in_progress()?;

        let question = self
            .questions
            .iter()
            .find(|q| q.id() == question_id)
            .ok_or_else(|| SessionStateError::UnknownQuestion(question_id.clone()))?;
        if !value.fits(question.variant()) {
            return Err(SessionStateError::AnswerMismatch {
                id: question_id.clone(),
                variant: question.variant(),
            });
        }

        let answer = self
            .answers
            .entry(question_id.clone())
            .insert_entry(Answer::new(value, submitted_at))
            .into_mut();
        Ok(answer)
    }

    /// Move the cursor to `index`, clamped to the question range.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` when the session is not in progress.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionStateError> {
        self.ensure_in_progress()?;
        self.current = index.min(self.questions.len().saturating_sub(1));
        Ok(self.current)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when the session is not in progress.
    pub fn go_next(&mut self) -> Result<usize, SessionStateError> {
        self.go_to(self.current.saturating_add(1))
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when the session is not in progress.
    pub fn go_previous(&mut self) -> Result<usize, SessionStateError> {
        self.go_to(self.current.saturating_sub(1))
    }

    /// Record the latest remaining time reported by the timer.
    ///
    /// Ignored unless the session is timed and in progress.
    pub fn set_remaining(&mut self, remaining_secs: u32) {
        if self.status == SessionStatus::InProgress && self.time_limit_secs.is_some() {
            self.remaining_secs = Some(remaining_secs);
        }
    }

    /// Freeze the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` unless the session is in progress.
    pub fn complete(&mut self, completed_at: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;
        self.status = SessionStatus::Completed;
        self.completed_at = Some(completed_at);
        Ok(())
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    #[must_use]
    pub fn answers(&self) -> &HashMap<QuestionId, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    /// Remaining seconds; `None` for untimed sessions or outside `InProgress`.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        if self.status == SessionStatus::InProgress {
            self.remaining_secs
        } else {
            None
        }
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}
