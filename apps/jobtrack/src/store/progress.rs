use chrono::Utc;
use uuid::Uuid;

use crate::errors::TrackerError;
use crate::models::{ProgressStatus, ProgressUpdate, UserQuestionProgress};
use crate::store::{EntityStore, StoreSnapshot};

/// Columns that identify a progress row.
pub const PROGRESS_KEY: [&str; 2] = ["user_id", "question_id"];

/// Per-question practice progress. Every write is an upsert on
/// (user, question), so repeating one leaves a single row.
pub struct ProgressStore {
    inner: EntityStore<UserQuestionProgress>,
}

impl ProgressStore {
    pub fn new(inner: EntityStore<UserQuestionProgress>) -> Self {
        Self { inner }
    }

    pub async fn fetch(&self) -> Result<Vec<UserQuestionProgress>, TrackerError> {
        self.inner.fetch().await
    }

    pub async fn items(&self) -> Vec<UserQuestionProgress> {
        self.inner.items().await
    }

    pub async fn snapshot(&self) -> StoreSnapshot<UserQuestionProgress> {
        self.inner.snapshot().await
    }

    pub async fn clear(&self) {
        self.inner.clear().await
    }

    pub async fn get_for(&self, question_id: Uuid) -> Option<UserQuestionProgress> {
        self.inner.find(|p| p.question_id == question_id).await
    }

    pub async fn solved_count(&self) -> usize {
        self.items()
            .await
            .iter()
            .filter(|p| p.status == ProgressStatus::Solved)
            .count()
    }

    pub async fn update_progress(
        &self,
        question_id: Uuid,
        update: ProgressUpdate,
    ) -> Result<UserQuestionProgress, TrackerError> {
        if update.times_solved < 0 {
            let err = TrackerError::Invalid("times_solved cannot be negative".to_string());
            return Err(self.inner.reject("save", err).await);
        }
        let mut payload = serde_json::to_value(&update)?;
        if let Some(map) = payload.as_object_mut() {
            map.insert("question_id".to_string(), question_id.to_string().into());
        }
        self.inner
            .upsert(
                payload,
                &PROGRESS_KEY,
                format!("progress:{question_id}"),
                "Progress updated",
            )
            .await
    }

    /// Back to "not started" with the counter and solve date cleared,
    /// whether or not a row existed.
    pub async fn reset_progress(&self, question_id: Uuid) -> Result<UserQuestionProgress, TrackerError> {
        self.update_progress(question_id, ProgressUpdate::reset()).await
    }

    /// Marks the question solved and bumps the counter from the loaded row.
    pub async fn record_solve(&self, question_id: Uuid) -> Result<UserQuestionProgress, TrackerError> {
        let previous = self
            .get_for(question_id)
            .await
            .map(|p| p.times_solved)
            .unwrap_or(0);
        self.update_progress(
            question_id,
            ProgressUpdate {
                status: ProgressStatus::Solved,
                times_solved: previous.saturating_add(1),
                last_solved_at: Some(Utc::now()),
            },
        )
        .await
    }
}
