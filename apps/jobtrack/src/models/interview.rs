use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{haystack, Entity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InterviewType {
    Phone,
    Video,
    InPerson,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    #[default]
    Scheduled,
    Completed,
    Canceled,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Scheduled => "scheduled",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interview {
    pub id: Uuid,
    pub user_id: Uuid,
    pub application_id: Uuid,
    pub interview_date: DateTime<Utc>,
    pub interview_type: InterviewType,
    pub status: InterviewStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Interview {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.status == InterviewStatus::Scheduled && self.interview_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInterview {
    pub application_id: Uuid,
    pub interview_date: DateTime<Utc>,
    pub interview_type: InterviewType,
    #[serde(default)]
    pub status: InterviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InterviewPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_type: Option<InterviewType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InterviewStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for Interview {
    const TABLE: &'static str = "interviews";
    const LABEL: &'static str = "Interview";
    const DEFAULT_ORDER: (&'static str, crate::query::Direction) =
        ("interview_date", crate::query::Direction::Asc);

    type New = NewInterview;
    type Patch = InterviewPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn search_text(&self) -> String {
        haystack(&[self.location.as_deref(), self.notes.as_deref()])
    }

    fn status_label(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }
}
