//! Read-side projections over store snapshots: searchable, paginated table
//! pages and the dashboard summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Entity, Interview, Job, JobApplication, ProgressStatus, Task, TaskStatus, UserQuestionProgress,
};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    /// Case-insensitive substring matched against each row's search text.
    pub q: Option<String>,
    pub status: Option<String>,
    /// 1-based.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl ListParams {
    fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    fn accepts<E: Entity>(&self, row: &E) -> bool {
        let status_ok = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => true,
            Some(wanted) => row
                .status_label()
                .is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
        };
        let search_ok = match self.q.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => row
                .search_text()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        };
        status_ok && search_ok
    }
}

/// Slices `items` into one page. Pages past the end come back empty.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);
    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    Page {
        items,
        page,
        page_size,
        total,
        total_pages,
    }
}

pub fn list_page<E: Entity>(items: Vec<E>, params: &ListParams) -> Page<E> {
    let matching: Vec<E> = items.into_iter().filter(|row| params.accepts(row)).collect();
    paginate(matching, params.page.unwrap_or(1), params.page_size())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSummary {
    pub total_jobs: usize,
    pub jobs_by_status: BTreeMap<String, usize>,
    pub total_applications: usize,
    pub applications_by_status: BTreeMap<String, usize>,
    pub upcoming_interviews: Vec<Interview>,
    pub open_tasks: usize,
    pub solved_questions: usize,
    /// Share of applications that got any response, 0.0 to 1.0.
    pub response_rate: f64,
}

fn count_by<'a, E: Entity + 'a>(rows: impl Iterator<Item = &'a E>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        if let Some(label) = row.status_label() {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

pub fn compute_summary(
    jobs: &[Job],
    applications: &[JobApplication],
    interviews: &[Interview],
    tasks: &[Task],
    progress: &[UserQuestionProgress],
    now: DateTime<Utc>,
) -> DashboardSummary {
    let mut upcoming_interviews: Vec<Interview> = interviews
        .iter()
        .filter(|i| i.is_upcoming(now))
        .cloned()
        .collect();
    upcoming_interviews.sort_by_key(|i| i.interview_date);

    let responded = applications
        .iter()
        .filter(|a| a.response_date.is_some())
        .count();
    let response_rate = if applications.is_empty() {
        0.0
    } else {
        responded as f64 / applications.len() as f64
    };

    DashboardSummary {
        total_jobs: jobs.len(),
        jobs_by_status: count_by(jobs.iter()),
        total_applications: applications.len(),
        applications_by_status: count_by(applications.iter()),
        upcoming_interviews,
        open_tasks: tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .count(),
        solved_questions: progress
            .iter()
            .filter(|p| p.status == ProgressStatus::Solved)
            .count(),
        response_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationStatus, InterviewStatus, InterviewType, JobStatus};
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    fn job(company: &str, status: JobStatus) -> Job {
        Job {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            company: company.into(),
            position: "Engineer".into(),
            location: Some("Berlin".into()),
            description: None,
            url: None,
            salary: None,
            status,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn application(status: ApplicationStatus, responded: bool) -> JobApplication {
        let applied = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        JobApplication {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            job_id: None,
            company: "Acme".into(),
            position: "Engineer".into(),
            location: None,
            status,
            date_applied: applied,
            response_date: responded.then(|| applied + Duration::days(5)),
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn interview(offset_hours: i64, status: InterviewStatus, now: DateTime<Utc>) -> Interview {
        Interview {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            application_id: Uuid::new_v4(),
            interview_date: now + Duration::hours(offset_hours),
            interview_type: InterviewType::Video,
            status,
            location: None,
            notes: None,
            created_at: now,
            updated_at: None,
        }
    }

    #[test]
    fn test_search_and_status_filter() {
        let rows = vec![
            job("Acme", JobStatus::New),
            job("Globex", JobStatus::Applied),
            job("acme labs", JobStatus::Applied),
        ];
        let params = ListParams {
            q: Some("ACME".into()),
            status: Some("applied".into()),
            ..Default::default()
        };
        let page = list_page(rows.clone(), &params);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].company, "acme labs");

        let all = list_page(
            rows,
            &ListParams {
                status: Some("all".into()),
                q: Some("berlin".into()),
                ..Default::default()
            },
        );
        assert_eq!(all.total, 3);
    }

    #[test]
    fn test_paginate_bounds() {
        let page = paginate((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_pages, 3);

        let past_end = paginate((1..=5).collect::<Vec<_>>(), 4, 10);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 5);

        let clamped = paginate((1..=5).collect::<Vec<_>>(), 0, 0);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.page_size, 1);
        assert_eq!(clamped.items, vec![1]);

        let empty = paginate(Vec::<u8>::new(), 1, 10);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let jobs = vec![
            job("Acme", JobStatus::New),
            job("Globex", JobStatus::Applied),
            job("Initech", JobStatus::Applied),
        ];
        let applications = vec![
            application(ApplicationStatus::Applied, false),
            application(ApplicationStatus::Rejected, true),
            application(ApplicationStatus::Offer, true),
            application(ApplicationStatus::Applied, false),
        ];
        let interviews = vec![
            interview(48, InterviewStatus::Scheduled, now),
            interview(2, InterviewStatus::Scheduled, now),
            interview(-2, InterviewStatus::Scheduled, now),
            interview(5, InterviewStatus::Canceled, now),
        ];

        let summary = compute_summary(&jobs, &applications, &interviews, &[], &[], now);
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.jobs_by_status.get("applied"), Some(&2));
        assert_eq!(summary.applications_by_status.get("applied"), Some(&2));
        assert_eq!(summary.upcoming_interviews.len(), 2);
        assert!(summary.upcoming_interviews[0].interview_date < summary.upcoming_interviews[1].interview_date);
        assert!((summary.response_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = compute_summary(&[], &[], &[], &[], &[], Utc::now());
        assert_eq!(summary.response_rate, 0.0);
        assert!(summary.jobs_by_status.is_empty());
    }
}
