use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Entity;
use crate::query::Direction;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ProgressStatus {
    #[default]
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "attempted")]
    Attempted,
    #[serde(rename = "solved")]
    Solved,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not started",
            ProgressStatus::Attempted => "attempted",
            ProgressStatus::Solved => "solved",
        }
    }
}

/// One row per (user, question); always written with upsert on that pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserQuestionProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub status: ProgressStatus,
    pub times_solved: i32,
    #[serde(default)]
    pub last_solved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full progress payload. `last_solved_at` is always sent, so `None` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub times_solved: i32,
    #[serde(default)]
    pub last_solved_at: Option<DateTime<Utc>>,
}

impl ProgressUpdate {
    pub fn reset() -> Self {
        Self {
            status: ProgressStatus::NotStarted,
            times_solved: 0,
            last_solved_at: None,
        }
    }
}

impl Entity for UserQuestionProgress {
    const TABLE: &'static str = "user_question_progress";
    const LABEL: &'static str = "Progress";
    const DEFAULT_ORDER: (&'static str, Direction) = ("updated_at", Direction::Desc);

    type New = ProgressUpdate;
    type Patch = ProgressUpdate;

    fn id(&self) -> Uuid {
        self.id
    }

    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn search_text(&self) -> String {
        String::new()
    }

    fn status_label(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }
}
