use std::fmt;

use assess_core::model::{
    AnswerValue, AssessmentResult, AssessmentSettings, AttemptId, AttemptSummary, FeedbackTier,
    QuestionBank, QuestionId, Session, SessionStateError, SessionStatus,
};
use assess_core::{report, scoring};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use super::view::SessionView;
use crate::Clock;
use crate::error::SessionError;
use crate::timer::{TimerEvent, TimerHandle, TimerService};

/// Drives one assessment attempt: lifecycle, answers, navigation, countdown
/// and the final result.
///
/// Timer callbacks only queue [`TimerEvent`]s; the controller applies them when
/// asked, so every state change happens on the caller's side. Finishing is
/// idempotent, which settles a submit racing the expiry.
pub struct SessionController {
    clock: Clock,
    settings: AssessmentSettings,
    timer_service: TimerService,
    session: Session,
    result: Option<AssessmentResult>,
    timer: Option<TimerHandle>,
    events: Option<UnboundedReceiver<TimerEvent>>,
    attempt_row_id: Option<i64>,
}

impl SessionController {
    #[must_use]
    pub fn new(clock: Clock, settings: AssessmentSettings) -> Self {
        Self::resume(clock, settings, AttemptId::generate())
    }

    /// Controller for an attempt that was begun earlier, e.g. before a reload.
    ///
    /// The session still has to be started; drafts saved under `attempt_id` can
    /// then be restored into it.
    #[must_use]
    pub fn resume(clock: Clock, settings: AssessmentSettings, attempt_id: AttemptId) -> Self {
        Self {
            clock,
            settings,
            timer_service: TimerService::new(),
            session: Session::with_attempt_id(attempt_id),
            result: None,
            timer: None,
            events: None,
            attempt_row_id: None,
        }
    }

    #[must_use]
    pub fn with_timer_service(mut self, timer_service: TimerService) -> Self {
        self.timer_service = timer_service;
        self
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────────

    /// Snapshot `bank` and begin the attempt. A time limit starts the countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the session is not started yet or for a
    /// zero limit, and `SessionError::Schedule` when a timed session has no runtime
    /// to run on. A failed start leaves the session not started.
    pub fn start(
        &mut self,
        bank: &QuestionBank,
        time_limit_secs: Option<u32>,
    ) -> Result<(), SessionError> {
        self.session.start(bank, time_limit_secs, self.clock.now())?;

        if let Some(limit_secs) = time_limit_secs {
            if let Err(err) = self.start_timer(limit_secs) {
                self.session = Session::with_attempt_id(self.session.attempt_id());
                return Err(err);
            }
        }

        info!(
            attempt_id = %self.session.attempt_id(),
            questions = bank.len(),
            time_limit_secs,
            "session started"
        );
        Ok(())
    }

    fn start_timer(&mut self, limit_secs: u32) -> Result<(), SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tick_tx = tx.clone();
        let handle = self.timer_service.start(
            limit_secs,
            move |remaining| {
                let _ = tick_tx.send(TimerEvent::Tick(remaining));
            },
            move || {
                let _ = tx.send(TimerEvent::Expired);
            },
        )?;
        self.timer = Some(handle);
        self.events = Some(rx);
        Ok(())
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.events = None;
    }

    /// Score every question and complete the attempt.
    ///
    /// Calling it again after completion returns the stored result unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if the session was never started.
    pub fn finish(&mut self) -> Result<&AssessmentResult, SessionError> {
        if self.session.is_completed() {
            return self
                .result
                .as_ref()
                .ok_or(SessionError::State(SessionStateError::NotCompleted));
        }

        self.session.complete(self.clock.now())?;
        self.stop_timer();

        let scored = scoring::score_all(self.session.questions(), self.session.answers());
        let result = report::summarize(self.session.questions(), &scored);
        info!(
            attempt_id = %self.session.attempt_id(),
            earned = result.earned_points,
            total = result.total_points,
            percentage = result.percentage,
            "session finished"
        );
        Ok(self.result.insert(result))
    }

    /// Discard a completed attempt and leave a fresh, not-started session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the session is completed.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if !self.session.is_completed() {
            return Err(SessionStateError::NotCompleted.into());
        }
        let previous = self.session.attempt_id();
        self.stop_timer();
        self.session = Session::new();
        self.result = None;
        self.attempt_row_id = None;
        info!(
            previous_attempt_id = %previous,
            attempt_id = %self.session.attempt_id(),
            "session restarted"
        );
        Ok(())
    }

    // ─── Answers & navigation ──────────────────────────────────────────────────

    /// Insert or replace the answer for `question_id`. The cursor does not move.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` when the session is not in progress (including
    /// after a queued expiry), the question is unknown or the value does not fit.
    pub fn record_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
    ) -> Result<(), SessionError> {
        self.sync_timer()?;
        let now = self.clock.now();
        self.session.record_answer(question_id, value, now)?;
        debug!(
            attempt_id = %self.session.attempt_id(),
            question_id = %question_id,
            answered = self.session.answered_count(),
            "answer recorded"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::State` when the session is not in progress.
    pub fn go_next(&mut self) -> Result<usize, SessionError> {
        self.sync_timer()?;
        let index = self.session.go_next()?;
        debug!(index, "moved to next question");
        Ok(index)
    }

    /// # Errors
    ///
    /// Returns `SessionError::State` when the session is not in progress.
    pub fn go_previous(&mut self) -> Result<usize, SessionError> {
        self.sync_timer()?;
        let index = self.session.go_previous()?;
        debug!(index, "moved to previous question");
        Ok(index)
    }

    /// Jump to `index`, clamped to the question range.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` when the session is not in progress.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.sync_timer()?;
        let index = self.session.go_to(index)?;
        debug!(index, "moved to question");
        Ok(index)
    }

    // ─── Timer integration ─────────────────────────────────────────────────────

    /// Wait for the next countdown event. `None` once no countdown is running.
    pub async fn next_timer_event(&mut self) -> Option<TimerEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Apply a countdown event: ticks update the remaining time, expiry finishes.
    ///
    /// Events arriving after completion are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` for an expiry on a session that never started.
    pub fn on_timer_event(&mut self, event: TimerEvent) -> Result<(), SessionError> {
        if self.session.is_completed() {
            debug!(?event, "timer event after completion ignored");
            return Ok(());
        }
        match event {
            TimerEvent::Tick(remaining) => {
                self.session.set_remaining(remaining);
                debug!(attempt_id = %self.session.attempt_id(), remaining, "tick");
            }
            TimerEvent::Expired => {
                self.session.set_remaining(0);
                info!(attempt_id = %self.session.attempt_id(), "time expired");
                self.finish()?;
            }
        }
        Ok(())
    }

    /// Apply every queued countdown event without waiting. Returns how many were applied.
    ///
    /// # Errors
    ///
    /// See [`Self::on_timer_event`].
    pub fn sync_timer(&mut self) -> Result<usize, SessionError> {
        let mut applied = 0;
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.on_timer_event(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView::of(&self.session)
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.session.attempt_id()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.session.is_completed()
    }

    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    #[must_use]
    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    /// Feedback band of the final result under the configured pass threshold.
    #[must_use]
    pub fn feedback(&self) -> Option<FeedbackTier> {
        self.result.as_ref().map(|r| self.settings.feedback_tier(r))
    }

    /// Persistable record of the completed attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the session is completed.
    pub fn summary(&self) -> Result<AttemptSummary, SessionError> {
        let not_completed = || SessionError::State(SessionStateError::NotCompleted);
        let result = self.result.as_ref().ok_or_else(not_completed)?;
        let started_at = self.session.started_at().ok_or_else(not_completed)?;
        let completed_at = self.session.completed_at().ok_or_else(not_completed)?;
        Ok(AttemptSummary::new(
            self.session.attempt_id(),
            started_at,
            completed_at,
            self.session.time_limit_secs(),
            result.clone(),
        )?)
    }

    /// Storage row id once the attempt has been persisted.
    #[must_use]
    pub fn attempt_row_id(&self) -> Option<i64> {
        self.attempt_row_id
    }

    pub(crate) fn set_attempt_row_id(&mut self, id: i64) {
        self.attempt_row_id = Some(id);
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("attempt_id", &self.session.attempt_id())
            .field("status", &self.session.status())
            .field("current", &self.session.current_index())
            .field("answered", &self.session.answered_count())
            .field("timer", &self.timer)
            .field("attempt_row_id", &self.attempt_row_id)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{Difficulty, QuestionDraft};
    use assess_core::time::fixed_clock;
    use std::time::Duration;

    fn law_bank() -> QuestionBank {
        QuestionBank::validate(vec![
            QuestionDraft::single_choice("k1", ["Offer", "Acceptance", "Consideration"], 1)
                .with_points(2)
                .with_section("Part A")
                .with_category("Contracts"),
            QuestionDraft::true_false("t1", true)
                .with_section("Part A")
                .with_category("Torts")
                .with_difficulty(Difficulty::Easy),
            QuestionDraft::free_text("e1", 10, 20)
                .with_section("Part B")
                .with_category("Contracts")
                .with_difficulty(Difficulty::Expert),
        ])
        .unwrap()
    }

    fn controller() -> SessionController {
        SessionController::new(fixed_clock(), AssessmentSettings::default())
    }

    #[test]
    fn answers_navigation_and_finish() {
        let mut c = controller();
        c.start(&law_bank(), None).unwrap();

        c.record_answer(&QuestionId::new("k1"), AnswerValue::Choice(1))
            .unwrap();
        assert_eq!(c.view().index, 0);
        assert_eq!(c.go_next().unwrap(), 1);
        c.record_answer(&QuestionId::new("t1"), AnswerValue::Boolean(true))
            .unwrap();
        assert_eq!(c.go_to(99).unwrap(), 2);
        assert_eq!(c.go_next().unwrap(), 2);
        c.record_answer(&QuestionId::new("e1"), AnswerValue::Text("x".repeat(200)))
            .unwrap();
        assert_eq!(c.go_previous().unwrap(), 1);

        let view = c.view();
        assert_eq!(view.answered, 3);
        assert_eq!(view.total, 3);
        assert_eq!(view.current_answer, Some(AnswerValue::Boolean(true)));
        assert_eq!(view.remaining_secs, None);

        let result = c.finish().unwrap().clone();
        assert_eq!(result.earned_points, 11);
        assert_eq!(result.total_points, 13);
        assert_eq!(result.percentage, 85);
        assert_eq!(result.correct_count, 3);
        assert_eq!(c.status(), SessionStatus::Completed);
        assert_eq!(c.feedback(), Some(FeedbackTier::Passed));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut c = controller();
        c.start(&law_bank(), None).unwrap();
        c.record_answer(&QuestionId::new("t1"), AnswerValue::Boolean(true))
            .unwrap();

        let first = c.finish().unwrap().clone();
        let second = c.finish().unwrap().clone();
        assert_eq!(first, second);
        assert!(c.on_timer_event(TimerEvent::Expired).is_ok());
        assert_eq!(c.result(), Some(&first));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut c = controller();
        assert!(matches!(
            c.finish(),
            Err(SessionError::State(SessionStateError::NotStarted))
        ));
        assert!(matches!(
            c.record_answer(&QuestionId::new("k1"), AnswerValue::Choice(0)),
            Err(SessionError::State(SessionStateError::NotStarted))
        ));
        assert!(matches!(
            c.restart(),
            Err(SessionError::State(SessionStateError::NotCompleted))
        ));

        c.start(&law_bank(), None).unwrap();
        assert!(matches!(
            c.start(&law_bank(), None),
            Err(SessionError::State(SessionStateError::AlreadyStarted))
        ));
        assert!(matches!(
            c.record_answer(&QuestionId::new("nope"), AnswerValue::Choice(0)),
            Err(SessionError::State(SessionStateError::UnknownQuestion(_)))
        ));
        assert!(matches!(
            c.record_answer(&QuestionId::new("t1"), AnswerValue::Choice(0)),
            Err(SessionError::State(SessionStateError::AnswerMismatch { .. }))
        ));

        c.finish().unwrap();
        assert!(matches!(
            c.record_answer(&QuestionId::new("t1"), AnswerValue::Boolean(true)),
            Err(SessionError::State(SessionStateError::Completed))
        ));
        assert!(c.go_next().is_err());
    }

    #[test]
    fn restart_leaves_a_fresh_session() {
        let mut c = controller();
        c.start(&law_bank(), None).unwrap();
        let first_attempt = c.attempt_id();
        c.finish().unwrap();

        c.restart().unwrap();
        assert_eq!(c.status(), SessionStatus::NotStarted);
        assert_ne!(c.attempt_id(), first_attempt);
        assert!(c.result().is_none());
        assert!(c.summary().is_err());

        c.start(&law_bank(), None).unwrap();
        assert_eq!(c.view().answered, 0);
    }

    #[test]
    fn timed_start_without_runtime_stays_not_started() {
        let mut c = controller();
        let err = c.start(&law_bank(), Some(60)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Schedule(crate::error::ScheduleError::NoRuntime)
        ));
        assert_eq!(c.status(), SessionStatus::NotStarted);

        c.start(&law_bank(), None).unwrap();
        assert_eq!(c.status(), SessionStatus::InProgress);
    }

    #[test]
    fn zero_time_limit_is_rejected() {
        let mut c = controller();
        assert!(matches!(
            c.start(&law_bank(), Some(0)),
            Err(SessionError::State(SessionStateError::InvalidTimeLimit))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_update_remaining_and_expiry_finishes() {
        let mut c = controller();
        c.start(&law_bank(), Some(3)).unwrap();
        assert_eq!(c.view().remaining_secs, Some(3));
        assert!(c.is_timer_running());

        let tick = c.next_timer_event().await.unwrap();
        assert_eq!(tick, TimerEvent::Tick(2));
        c.on_timer_event(tick).unwrap();
        assert_eq!(c.view().remaining_secs, Some(2));

        while let Some(event) = c.next_timer_event().await {
            c.on_timer_event(event).unwrap();
        }
        assert!(c.is_completed());
        assert!(c.result().is_some());
        assert!(!c.is_timer_running());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_expiry_blocks_late_answers() {
        let mut c = controller();
        c.start(&law_bank(), Some(2)).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(matches!(
            c.record_answer(&QuestionId::new("t1"), AnswerValue::Boolean(true)),
            Err(SessionError::State(SessionStateError::Completed))
        ));
        assert!(c.is_completed());
        assert_eq!(c.result().unwrap().earned_points, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_cancels_the_countdown() {
        let mut c = controller();
        c.start(&law_bank(), Some(60)).unwrap();
        c.finish().unwrap();

        assert!(!c.is_timer_running());
        assert_eq!(c.next_timer_event().await, None);
        assert_eq!(c.sync_timer().unwrap(), 0);
    }
}
