//! Debounced persistence of free-text drafts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use assess_core::model::{AttemptId, QuestionId};
use storage::repository::{DraftRecord, DraftRepository};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::Clock;
use crate::error::ScheduleError;

struct Pending {
    generation: u64,
    text: String,
    token: CancellationToken,
}

#[derive(Default)]
struct PendingDrafts {
    next_generation: u64,
    entries: HashMap<QuestionId, Pending>,
}

struct Inner {
    attempt_id: AttemptId,
    quiet: Duration,
    clock: Clock,
    sink: Arc<dyn DraftRepository>,
    pending: Mutex<PendingDrafts>,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, PendingDrafts> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes the entry for `question_id` if it is still the given generation.
    fn take_if_current(&self, question_id: &QuestionId, generation: u64) -> Option<String> {
        let mut pending = self.pending();
        match pending.entries.get(question_id) {
            Some(entry) if entry.generation == generation => {
                pending.entries.remove(question_id).map(|entry| entry.text)
            }
            _ => None,
        }
    }

    fn take_all(&self) -> Vec<(QuestionId, String)> {
        let mut drained: Vec<_> = self
            .pending()
            .entries
            .drain()
            .map(|(question_id, entry)| {
                entry.token.cancel();
                (question_id, entry.text)
            })
            .collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }

    async fn persist(&self, question_id: QuestionId, text: String) -> bool {
        let draft = DraftRecord::new(self.attempt_id, question_id, text, self.clock.now());
        match self.sink.save_draft(&draft).await {
            Ok(()) => {
                debug!(
                    attempt_id = %self.attempt_id,
                    question_id = %draft.question_id,
                    chars = draft.text.chars().count(),
                    "draft saved"
                );
                true
            }
            Err(error) => {
                warn!(
                    attempt_id = %self.attempt_id,
                    question_id = %draft.question_id,
                    %error,
                    "failed to save draft"
                );
                false
            }
        }
    }
}

/// Debounces free-text input per question and writes the latest text to a
/// [`DraftRepository`] once the input has been quiet for the configured period.
///
/// Cloning yields another handle to the same pending drafts.
#[derive(Clone)]
pub struct AutosaveService {
    inner: Arc<Inner>,
    runtime: Handle,
    tasks: TaskTracker,
}

impl AutosaveService {
    /// Create an autosaver for one attempt on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::ZeroDuration` for a zero quiet period and
    /// `ScheduleError::NoRuntime` outside a tokio runtime.
    pub fn new(
        attempt_id: AttemptId,
        quiet: Duration,
        clock: Clock,
        sink: Arc<dyn DraftRepository>,
    ) -> Result<Self, ScheduleError> {
        if quiet.is_zero() {
            return Err(ScheduleError::ZeroDuration);
        }
        let runtime = Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(Inner {
                attempt_id,
                quiet,
                clock,
                sink,
                pending: Mutex::new(PendingDrafts::default()),
            }),
            runtime,
            tasks: TaskTracker::new(),
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.inner.attempt_id
    }

    #[must_use]
    pub fn quiet_period(&self) -> Duration {
        self.inner.quiet
    }

    /// Record new text for `question_id` and restart its quiet period.
    ///
    /// Any persist already scheduled for the question is cancelled; only the
    /// newest text is written.
    pub fn on_input(&self, question_id: QuestionId, text: impl Into<String>) {
        let token = CancellationToken::new();
        let generation = {
            let mut pending = self.inner.pending();
            pending.next_generation += 1;
            let generation = pending.next_generation;
            let previous = pending.entries.insert(
                question_id.clone(),
                Pending {
                    generation,
                    text: text.into(),
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.token.cancel();
            }
            generation
        };
        debug!(
            attempt_id = %self.inner.attempt_id,
            question_id = %question_id,
            generation,
            "draft save scheduled"
        );

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn_on(
            async move {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(inner.quiet) => {}
                }
                if let Some(text) = inner.take_if_current(&question_id, generation) {
                    inner.persist(question_id, text).await;
                }
            },
            &self.runtime,
        );
    }

    /// Wait until every scheduled or in-flight save has settled.
    ///
    /// Cancelled saves settle immediately, so after [`Self::cancel_all`] this only
    /// waits for writes that already reached the repository.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Persist every pending draft now. Returns how many were saved.
    pub async fn flush(&self) -> usize {
        let mut saved = 0;
        for (question_id, text) in self.inner.take_all() {
            if self.inner.persist(question_id, text).await {
                saved += 1;
            }
        }
        saved
    }

    /// Drop every pending draft without saving. Returns how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let dropped = self.inner.take_all().len();
        if dropped > 0 {
            debug!(attempt_id = %self.inner.attempt_id, dropped, "pending drafts dropped");
        }
        dropped
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending().entries.len()
    }
}

impl fmt::Debug for AutosaveService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutosaveService")
            .field("attempt_id", &self.inner.attempt_id)
            .field("quiet", &self.inner.quiet)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::time::{fixed_clock, fixed_now};
    use async_trait::async_trait;
    use storage::repository::{InMemoryRepository, StorageError};
    use tokio::time::sleep;

    /// Records every save in order.
    #[derive(Default)]
    struct RecordingDrafts {
        saves: Mutex<Vec<DraftRecord>>,
    }

    impl RecordingDrafts {
        fn saves(&self) -> Vec<DraftRecord> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DraftRepository for RecordingDrafts {
        async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError> {
            self.saves.lock().unwrap().push(draft.clone());
            Ok(())
        }

        async fn get_draft(
            &self,
            _attempt_id: AttemptId,
            _question_id: &QuestionId,
        ) -> Result<Option<DraftRecord>, StorageError> {
            Ok(None)
        }

        async fn list_drafts(&self, _attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError> {
            Ok(self.saves())
        }

        async fn delete_drafts(&self, _attempt_id: AttemptId) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    struct FailingDrafts;

    #[async_trait]
    impl DraftRepository for FailingDrafts {
        async fn save_draft(&self, _draft: &DraftRecord) -> Result<(), StorageError> {
            Err(StorageError::Connection("disk full".into()))
        }

        async fn get_draft(
            &self,
            _attempt_id: AttemptId,
            _question_id: &QuestionId,
        ) -> Result<Option<DraftRecord>, StorageError> {
            Ok(None)
        }

        async fn list_drafts(&self, _attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn delete_drafts(&self, _attempt_id: AttemptId) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    /// Recording sink whose writes take two seconds.
    #[derive(Default)]
    struct SlowDrafts(RecordingDrafts);

    #[async_trait]
    impl DraftRepository for SlowDrafts {
        async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError> {
            sleep(Duration::from_secs(2)).await;
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

    fn autosaver(sink: Arc<dyn DraftRepository>) -> AutosaveService {
        AutosaveService::new(
            AttemptId::generate(),
            Duration::from_secs(5),
            fixed_clock(),
            sink,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_input_persists_once_with_latest_text() {
        let sink = Arc::new(RecordingDrafts::default());
        let autosave = autosaver(sink.clone());
        let essay = QuestionId::new("essay");

        autosave.on_input(essay.clone(), "Consideration");
        sleep(Duration::from_secs(1)).await;
        autosave.on_input(essay.clone(), "Consideration is");
        sleep(Duration::from_secs(1)).await;
        autosave.on_input(essay.clone(), "Consideration is a bargained-for exchange");

        sleep(Duration::from_millis(4_900)).await;
        assert!(sink.saves().is_empty());
        assert_eq!(autosave.pending_count(), 1);

        sleep(Duration::from_millis(200)).await;
        let saves = sink.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].text, "Consideration is a bargained-for exchange");
        assert_eq!(saves[0].question_id, essay);
        assert_eq!(saves[0].attempt_id, autosave.attempt_id());
        assert_eq!(saves[0].saved_at, fixed_now());
        assert_eq!(autosave.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn questions_debounce_independently() {
        let sink = Arc::new(RecordingDrafts::default());
        let autosave = autosaver(sink.clone());

        autosave.on_input(QuestionId::new("a"), "first answer");
        sleep(Duration::from_secs(3)).await;
        autosave.on_input(QuestionId::new("b"), "second answer");
        sleep(Duration::from_millis(2_100)).await;

        let saves = sink.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].question_id, QuestionId::new("a"));

        sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.saves().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_pending_drafts_immediately() {
        let repo = Arc::new(InMemoryRepository::new());
        let autosave = autosaver(repo.clone());
        let essay = QuestionId::new("essay");

        autosave.on_input(essay.clone(), "draft text");
        assert_eq!(autosave.flush().await, 1);
        assert_eq!(autosave.pending_count(), 0);

        let stored = repo
            .get_draft(autosave.attempt_id(), &essay)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.text, "draft text");

        sleep(Duration::from_secs(10)).await;
        assert_eq!(repo.list_drafts(autosave.attempt_id()).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending_drafts() {
        let sink = Arc::new(RecordingDrafts::default());
        let autosave = autosaver(sink.clone());

        autosave.on_input(QuestionId::new("a"), "one");
        autosave.on_input(QuestionId::new("b"), "two");
        assert_eq!(autosave.pending_count(), 2);
        assert_eq!(autosave.cancel_all(), 2);

        sleep(Duration::from_secs(10)).await;
        assert!(sink.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_saves_are_swallowed() {
        let autosave = autosaver(Arc::new(FailingDrafts));
        autosave.on_input(QuestionId::new("essay"), "lost to the void");

        sleep(Duration::from_secs(6)).await;
        assert_eq!(autosave.pending_count(), 0);

        autosave.on_input(QuestionId::new("essay"), "again");
        assert_eq!(autosave.flush().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_covers_saves_in_flight() {
        let sink = Arc::new(SlowDrafts::default());
        let autosave = autosaver(sink.clone());

        autosave.on_input(QuestionId::new("essay"), "slow text");
        sleep(Duration::from_millis(5_100)).await;
        assert_eq!(autosave.cancel_all(), 0);
        assert!(sink.0.saves().is_empty());

        autosave.wait_idle().await;
        assert_eq!(sink.0.saves().len(), 1);

        autosave.on_input(QuestionId::new("essay"), "after idle");
        sleep(Duration::from_secs(8)).await;
        assert_eq!(sink.0.saves().len(), 2);
    }

    #[tokio::test]
    async fn zero_quiet_period_is_rejected() {
        let err = AutosaveService::new(
            AttemptId::generate(),
            Duration::ZERO,
            fixed_clock(),
            Arc::new(InMemoryRepository::new()),
        )
        .unwrap_err();
        assert_eq!(err, ScheduleError::ZeroDuration);
    }
}
