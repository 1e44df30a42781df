use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{haystack, Entity};

/// Application pipeline stage. Independent of [`crate::models::JobStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    #[default]
    Applied,
    PhoneScreening,
    TechnicalInterview,
    OnsiteInterview,
    Offer,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Applied,
        ApplicationStatus::PhoneScreening,
        ApplicationStatus::TechnicalInterview,
        ApplicationStatus::OnsiteInterview,
        ApplicationStatus::Offer,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::PhoneScreening => "phone-screening",
            ApplicationStatus::TechnicalInterview => "technical-interview",
            ApplicationStatus::OnsiteInterview => "onsite-interview",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub location: Option<String>,
    pub status: ApplicationStatus,
    pub date_applied: NaiveDate,
    #[serde(default)]
    pub response_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Company, position and location are copied from the job at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub company: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
    pub date_applied: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApplicationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_applied: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for JobApplication {
    const TABLE: &'static str = "job_applications";
    const LABEL: &'static str = "Application";

    type New = NewApplication;
    type Patch = ApplicationPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn search_text(&self) -> String {
        haystack(&[
            Some(self.company.as_str()),
            Some(self.position.as_str()),
            self.location.as_deref(),
            self.notes.as_deref(),
        ])
    }

    fn status_label(&self) -> Option<&'static str> {
        Some(self.status.as_str())
    }
}
