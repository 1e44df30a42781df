//! Row types for every table the dashboard tracks.
//!
//! Each table gets a row struct (what the service echoes), a `New*` input
//! (what a form submits) and a `*Patch` (partial update).

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::query::Direction;

pub mod application;
pub mod document;
pub mod interview;
pub mod job;
pub mod progress;
pub mod question;
pub mod task;

pub use application::{ApplicationPatch, ApplicationStatus, JobApplication, NewApplication};
pub use document::{Document, DocumentPatch, NewDocument};
pub use interview::{Interview, InterviewPatch, InterviewStatus, InterviewType, NewInterview};
pub use job::{Job, JobPatch, JobStatus, NewJob};
pub use progress::{ProgressStatus, ProgressUpdate, UserQuestionProgress};
pub use question::{
    CategoryPatch, Difficulty, NewCategory, NewQuestion, Question, QuestionCategory, QuestionPatch,
};
pub use task::{NewTask, Task, TaskPatch, TaskStatus};

/// A user-owned row in one remote table.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Singular name used in toasts and logs.
    const LABEL: &'static str;
    const DEFAULT_ORDER: (&'static str, Direction) = ("created_at", Direction::Desc);

    type New: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Patch: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn id(&self) -> Uuid;

    fn user_id(&self) -> Uuid;

    /// Text matched by the list search box.
    fn search_text(&self) -> String;

    /// Status label used by list filters, for entities that have one.
    fn status_label(&self) -> Option<&'static str> {
        None
    }
}

/// Joins the present parts of a search haystack.
pub(crate) fn haystack(parts: &[Option<&str>]) -> String {
    parts.iter().flatten().copied().collect::<Vec<_>>().join(" ")
}
