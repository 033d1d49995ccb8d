use std::sync::Arc;
use std::time::Duration;

use assess_core::model::{
    AnswerValue, AssessmentSettings, AttemptId, QuestionBank, SessionStateError,
};
use storage::repository::{AttemptRepository, AttemptRow, DraftRepository, Storage};
use tracing::{debug, info, warn};

use super::controller::SessionController;
use crate::Clock;
use crate::autosave::AutosaveService;
use crate::error::SessionError;
use crate::timer::TimerService;

/// Orchestrates session start, autosave wiring and persisted completion.
#[derive(Clone)]
pub struct AssessmentLoopService {
    clock: Clock,
    settings: AssessmentSettings,
    timer_service: TimerService,
    attempts: Arc<dyn AttemptRepository>,
    drafts: Arc<dyn DraftRepository>,
}

impl AssessmentLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: AssessmentSettings,
        attempts: Arc<dyn AttemptRepository>,
        drafts: Arc<dyn DraftRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            timer_service: TimerService::new(),
            attempts,
            drafts,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, settings: AssessmentSettings, storage: &Storage) -> Self {
        Self::new(
            clock,
            settings,
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.drafts),
        )
    }

    #[must_use]
    pub fn with_timer_service(mut self, timer_service: TimerService) -> Self {
        self.timer_service = timer_service;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    /// Start a session over `bank` with the configured time limit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session or its countdown cannot start.
    pub fn start(&self, bank: &QuestionBank) -> Result<SessionController, SessionError> {
        let mut controller = SessionController::new(self.clock, self.settings.clone())
            .with_timer_service(self.timer_service);
        controller.start(bank, self.settings.time_limit_secs())?;
        Ok(controller)
    }

    /// Start a fresh session that keeps the identity of an earlier attempt, so its
    /// saved drafts can be restored with [`Self::restore_drafts`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session or its countdown cannot start.
    pub fn resume(
        &self,
        bank: &QuestionBank,
        attempt_id: AttemptId,
    ) -> Result<SessionController, SessionError> {
        let mut controller = SessionController::resume(self.clock, self.settings.clone(), attempt_id)
            .with_timer_service(self.timer_service);
        controller.start(bank, self.settings.time_limit_secs())?;
        debug!(%attempt_id, "session resumed");
        Ok(controller)
    }

    /// Autosaver writing drafts of the controller's attempt to the draft store.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Schedule` outside a tokio runtime.
    pub fn autosave(&self, controller: &SessionController) -> Result<AutosaveService, SessionError> {
        Ok(AutosaveService::new(
            controller.attempt_id(),
            Duration::from_millis(self.settings.autosave_quiet_ms()),
            self.clock,
            Arc::clone(&self.drafts),
        )?)
    }

    /// Record saved drafts of the attempt as free-text answers, e.g. after a reload.
    /// Returns how many drafts were applied.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for storage failures or when a draft no longer fits
    /// the session.
    pub async fn restore_drafts(
        &self,
        controller: &mut SessionController,
    ) -> Result<usize, SessionError> {
        let drafts = self.drafts.list_drafts(controller.attempt_id()).await?;
        for draft in &drafts {
            controller.record_answer(&draft.question_id, AnswerValue::Text(draft.text.clone()))?;
        }
        debug!(
            attempt_id = %controller.attempt_id(),
            restored = drafts.len(),
            "drafts restored"
        );
        Ok(drafts.len())
    }

    /// Finish the session and persist its summary.
    ///
    /// Pending drafts of `autosave` are dropped and saves already in flight are
    /// awaited first so no draft outlives the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for state or persistence failures.
    pub async fn finish(
        &self,
        controller: &mut SessionController,
        autosave: Option<&AutosaveService>,
    ) -> Result<i64, SessionError> {
        if let Some(autosave) = autosave {
            autosave.cancel_all();
            autosave.wait_idle().await;
        }
        controller.finish()?;
        self.finalize_attempt(controller).await
    }

    /// Persist the summary of a completed session exactly once, then clear its drafts.
    ///
    /// Safe to retry after a storage failure.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if the session is not completed, or a storage error.
    pub async fn finalize_attempt(
        &self,
        controller: &mut SessionController,
    ) -> Result<i64, SessionError> {
        if let Some(id) = controller.attempt_row_id() {
            return Ok(id);
        }
        if !controller.is_completed() {
            return Err(SessionStateError::NotCompleted.into());
        }

        let summary = controller.summary()?;
        let id = self.attempts.append_attempt(&summary).await?;
        controller.set_attempt_row_id(id);
        info!(attempt_id = %summary.attempt_id(), row_id = id, "attempt stored");

        match self.drafts.delete_drafts(summary.attempt_id()).await {
            Ok(removed) => debug!(attempt_id = %summary.attempt_id(), removed, "drafts cleared"),
            Err(error) => warn!(
                attempt_id = %summary.attempt_id(),
                %error,
                "failed to clear drafts"
            ),
        }
        Ok(id)
    }

    /// Apply countdown events until the session completes, then persist it.
    ///
    /// Returns `None` when the session has no running countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for state or persistence failures.
    pub async fn run_until_expired(
        &self,
        controller: &mut SessionController,
    ) -> Result<Option<i64>, SessionError> {
        while !controller.is_completed() {
            let Some(event) = controller.next_timer_event().await else {
                break;
            };
            controller.on_timer_event(event)?;
        }

        if controller.is_completed() {
            Ok(Some(self.finalize_attempt(controller).await?))
        } else {
            Ok(None)
        }
    }

    /// Most recently completed attempts first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on backend failures.
    pub async fn recent_attempts(&self, limit: u32) -> Result<Vec<AttemptRow>, SessionError> {
        Ok(self.attempts.list_attempts(limit).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{QuestionDraft, QuestionId};
    use assess_core::time::fixed_clock;
    use async_trait::async_trait;
    use storage::repository::{DraftRecord, InMemoryRepository, StorageError};

    /// Draft store whose writes take two seconds to land.
    struct SlowDrafts(Arc<InMemoryRepository>);

    #[async_trait]
    impl DraftRepository for SlowDrafts {
        async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.0.save_draft(draft).await
        }

        async fn get_draft(
            &self,
            attempt_id: AttemptId,
            question_id: &QuestionId,
        ) -> Result<Option<DraftRecord>, StorageError> {
            self.0.get_draft(attempt_id, question_id).await
        }

        async fn list_drafts(&self, attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError> {
            self.0.list_drafts(attempt_id).await
        }

        async fn delete_drafts(&self, attempt_id: AttemptId) -> Result<u64, StorageError> {
            self.0.delete_drafts(attempt_id).await
        }
    }

    fn bank() -> QuestionBank {
        QuestionBank::validate(vec![
            QuestionDraft::true_false("t1", true),
            QuestionDraft::free_text("e1", 10, 15),
        ])
        .unwrap()
    }

    fn service(settings: AssessmentSettings) -> (AssessmentLoopService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let service =
            AssessmentLoopService::new(fixed_clock(), settings, repo.clone(), repo.clone());
        (service, repo)
    }

    #[tokio::test]
    async fn finalize_is_retry_safe() {
        let (service, repo) = service(AssessmentSettings::default());
        let mut controller = service.start(&bank()).unwrap();

        assert!(matches!(
            service.finalize_attempt(&mut controller).await,
            Err(SessionError::State(SessionStateError::NotCompleted))
        ));

        let id = service.finish(&mut controller, None).await.unwrap();
        assert_eq!(service.finalize_attempt(&mut controller).await.unwrap(), id);
        assert_eq!(repo.list_attempts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finishing_clears_saved_drafts() {
        let (service, repo) = service(AssessmentSettings::default());
        let mut controller = service.start(&bank()).unwrap();
        let attempt = controller.attempt_id();
        repo.save_draft(&DraftRecord::new(
            attempt,
            QuestionId::new("e1"),
            "half an essay",
            fixed_clock().now(),
        ))
        .await
        .unwrap();

        service.finish(&mut controller, None).await.unwrap();
        assert!(repo.list_drafts(attempt).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_waits_for_in_flight_draft_saves() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = AssessmentLoopService::new(
            fixed_clock(),
            AssessmentSettings::default(),
            repo.clone(),
            Arc::new(SlowDrafts(repo.clone())),
        );
        let mut controller = service.start(&bank()).unwrap();
        let attempt = controller.attempt_id();
        let autosave = service.autosave(&controller).unwrap();

        autosave.on_input(QuestionId::new("e1"), "written while finishing");
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(autosave.pending_count(), 0);
        assert!(repo.list_drafts(attempt).await.unwrap().is_empty());

        service.finish(&mut controller, Some(&autosave)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(repo.list_drafts(attempt).await.unwrap().is_empty());
        assert_eq!(repo.list_attempts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resume_keeps_the_attempt_identity() {
        let (service, repo) = service(AssessmentSettings::default());
        let attempt = AttemptId::generate();
        repo.save_draft(&DraftRecord::new(
            attempt,
            QuestionId::new("e1"),
            "z".repeat(300),
            fixed_clock().now(),
        ))
        .await
        .unwrap();

        let mut controller = service.resume(&bank(), attempt).unwrap();
        assert_eq!(controller.attempt_id(), attempt);
        assert_eq!(service.restore_drafts(&mut controller).await.unwrap(), 1);
        assert_eq!(controller.finish().unwrap().earned_points, 10);
    }

    #[tokio::test]
    async fn restore_drafts_records_text_answers() {
        let (service, repo) = service(AssessmentSettings::default());
        let mut controller = service.start(&bank()).unwrap();
        repo.save_draft(&DraftRecord::new(
            controller.attempt_id(),
            QuestionId::new("e1"),
            "y".repeat(300),
            fixed_clock().now(),
        ))
        .await
        .unwrap();

        assert_eq!(service.restore_drafts(&mut controller).await.unwrap(), 1);
        let result = controller.finish().unwrap();
        assert_eq!(result.earned_points, 10);
    }

    #[tokio::test]
    async fn untimed_sessions_do_not_wait_for_expiry() {
        let (service, _repo) = service(AssessmentSettings::default());
        let mut controller = service.start(&bank()).unwrap();
        assert_eq!(service.run_until_expired(&mut controller).await.unwrap(), None);
        assert!(!controller.is_completed());
    }
}
