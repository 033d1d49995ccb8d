use assess_core::model::{AnswerValue, AttemptId, Question, Session, SessionStatus};

/// Presentation snapshot of a session, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub attempt_id: AttemptId,
    pub status: SessionStatus,
    pub index: usize,
    pub total: usize,
    pub current_question: Option<Question>,
    pub current_answer: Option<AnswerValue>,
    pub remaining_secs: Option<u32>,
    pub answered: usize,
}

impl SessionView {
    pub(crate) fn of(session: &Session) -> Self {
        let current_question = session.current_question().cloned();
        let current_answer = current_question
            .as_ref()
            .and_then(|q| session.answer_for(q.id()))
            .map(|a| a.value.clone());

        Self {
            attempt_id: session.attempt_id(),
            status: session.status(),
            index: session.current_index(),
            total: session.questions().len(),
            current_question,
            current_answer,
            remaining_secs: session.remaining_secs(),
            answered: session.answered_count(),
        }
    }

    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}
