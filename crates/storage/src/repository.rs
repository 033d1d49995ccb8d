use assess_core::model::{AttemptId, AttemptSummary, QuestionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Latest autosaved text of a free-text answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub text: String,
    pub saved_at: DateTime<Utc>,
}

impl DraftRecord {
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        question_id: QuestionId,
        text: impl Into<String>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            question_id,
            text: text.into(),
            saved_at,
        }
    }
}

/// Persisted attempt summary with its storage row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRow {
    pub id: i64,
    pub summary: AttemptSummary,
}

impl AttemptRow {
    #[must_use]
    pub fn new(id: i64, summary: AttemptSummary) -> Self {
        Self { id, summary }
    }
}

/// Sink for autosaved drafts.
#[async_trait]
pub trait DraftRepository: Send + Sync {
    /// Insert or replace the draft for `(attempt_id, question_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the draft cannot be stored.
    async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError>;

    /// Fetch the draft for a question, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_draft(
        &self,
        attempt_id: AttemptId,
        question_id: &QuestionId,
    ) -> Result<Option<DraftRecord>, StorageError>;

    /// All drafts of an attempt, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_drafts(&self, attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError>;

    /// Remove all drafts of an attempt; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_drafts(&self, attempt_id: AttemptId) -> Result<u64, StorageError>;
}

/// Store of completed attempts.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append a completed attempt and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt was already stored.
    async fn append_attempt(&self, summary: &AttemptSummary) -> Result<i64, StorageError>;

    /// Fetch an attempt by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_attempt(&self, id: i64) -> Result<AttemptSummary, StorageError>;

    /// Most recently completed attempts first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts(&self, limit: u32) -> Result<Vec<AttemptRow>, StorageError>;
}

#[derive(Default)]
struct AttemptTable {
    next_id: i64,
    rows: BTreeMap<i64, AttemptSummary>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    drafts: Arc<Mutex<HashMap<(AttemptId, QuestionId), DraftRecord>>>,
    attempts: Arc<Mutex<AttemptTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: ToString>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl DraftRepository for InMemoryRepository {
    async fn save_draft(&self, draft: &DraftRecord) -> Result<(), StorageError> {
        let mut guard = self.drafts.lock().map_err(poisoned)?;
        guard.insert(
            (draft.attempt_id, draft.question_id.clone()),
            draft.clone(),
        );
        Ok(())
    }

    async fn get_draft(
        &self,
        attempt_id: AttemptId,
        question_id: &QuestionId,
    ) -> Result<Option<DraftRecord>, StorageError> {
        let guard = self.drafts.lock().map_err(poisoned)?;
        Ok(guard.get(&(attempt_id, question_id.clone())).cloned())
    }

    async fn list_drafts(&self, attempt_id: AttemptId) -> Result<Vec<DraftRecord>, StorageError> {
        let guard = self.drafts.lock().map_err(poisoned)?;
        let mut drafts: Vec<_> = guard
            .values()
            .filter(|d| d.attempt_id == attempt_id)
            .cloned()
            .collect();
        drafts.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(drafts)
    }

    async fn delete_drafts(&self, attempt_id: AttemptId) -> Result<u64, StorageError> {
        let mut guard = self.drafts.lock().map_err(poisoned)?;
        let before = guard.len();
        guard.retain(|(attempt, _), _| *attempt != attempt_id);
        Ok(u64::try_from(before - guard.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, summary: &AttemptSummary) -> Result<i64, StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        if guard
            .rows
            .values()
            .any(|s| s.attempt_id() == summary.attempt_id())
        {
            return Err(StorageError::Conflict);
        }
        guard.next_id += 1;
        let id = guard.next_id;
        guard.rows.insert(id, summary.clone());
        Ok(id)
    }

    async fn get_attempt(&self, id: i64) -> Result<AttemptSummary, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        guard.rows.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_attempts(&self, limit: u32) -> Result<Vec<AttemptRow>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut rows: Vec<_> = guard
            .rows
            .iter()
            .map(|(id, s)| AttemptRow::new(*id, s.clone()))
            .collect();
        rows.sort_by(|a, b| {
            b.summary
                .completed_at()
                .cmp(&a.summary.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub drafts: Arc<dyn DraftRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let drafts: Arc<dyn DraftRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self { drafts, attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{AnswerValue, QuestionBank, QuestionDraft, Session};
    use assess_core::time::fixed_now;
    use assess_core::{report, scoring};

    fn completed_summary(offset_secs: i64) -> AttemptSummary {
        let bank = QuestionBank::validate(vec![QuestionDraft::true_false("tf", true)]).unwrap();
        let mut session = Session::new();
        session.start(&bank, None, fixed_now()).unwrap();
        session
            .record_answer(&QuestionId::new("tf"), AnswerValue::Boolean(true), fixed_now())
            .unwrap();
        let completed_at = fixed_now() + chrono::Duration::seconds(offset_secs);
        session.complete(completed_at).unwrap();
        let scored = scoring::score_all(session.questions(), session.answers());
        let result = report::summarize(session.questions(), &scored);
        AttemptSummary::new(session.attempt_id(), fixed_now(), completed_at, None, result).unwrap()
    }

    #[tokio::test]
    async fn drafts_are_upserted_per_question() {
        let repo = InMemoryRepository::new();
        let attempt = AttemptId::generate();
        let q = QuestionId::new("essay");

        repo.save_draft(&DraftRecord::new(attempt, q.clone(), "first", fixed_now()))
            .await
            .unwrap();
        repo.save_draft(&DraftRecord::new(attempt, q.clone(), "second", fixed_now()))
            .await
            .unwrap();

        let draft = repo.get_draft(attempt, &q).await.unwrap().unwrap();
        assert_eq!(draft.text, "second");
        assert_eq!(repo.list_drafts(attempt).await.unwrap().len(), 1);

        assert_eq!(repo.delete_drafts(attempt).await.unwrap(), 1);
        assert!(repo.get_draft(attempt, &q).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attempts_are_listed_newest_first() {
        let repo = InMemoryRepository::new();
        let older = completed_summary(10);
        let newer = completed_summary(20);

        let older_id = repo.append_attempt(&older).await.unwrap();
        let newer_id = repo.append_attempt(&newer).await.unwrap();

        let rows = repo.list_attempts(10).await.unwrap();
        assert_eq!(
            rows.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![newer_id, older_id]
        );
        assert_eq!(repo.get_attempt(older_id).await.unwrap(), older);
        assert_eq!(repo.list_attempts(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_attempt_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let summary = completed_summary(5);
        repo.append_attempt(&summary).await.unwrap();
        assert!(matches!(
            repo.append_attempt(&summary).await,
            Err(StorageError::Conflict)
        ));
        assert!(matches!(
            repo.get_attempt(99).await,
            Err(StorageError::NotFound)
        ));
    }
}
