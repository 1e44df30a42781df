use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::auth::{AuthBackend, AuthStore};
use crate::errors::TrackerError;
use crate::models::{
    Document, Entity, Interview, Job, JobApplication, Question, QuestionCategory, Task,
};
use crate::notify::{NotificationQueue, Notifier};
use crate::remote::RemoteService;
use crate::store::{EntityStore, ProgressStore};
use crate::views::{compute_summary, DashboardSummary};

/// Every store of the app, built once at start-up and shared by reference.
pub struct Tracker {
    pub auth: AuthStore,
    pub jobs: EntityStore<Job>,
    pub applications: EntityStore<JobApplication>,
    pub interviews: EntityStore<Interview>,
    pub tasks: EntityStore<Task>,
    pub questions: EntityStore<Question>,
    pub categories: EntityStore<QuestionCategory>,
    pub documents: EntityStore<Document>,
    pub progress: ProgressStore,
}

impl Tracker {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        auth_backend: Arc<dyn AuthBackend>,
        notifier: Notifier,
    ) -> Self {
        let auth = AuthStore::new(auth_backend, notifier.clone());
        let rx = auth.subscribe();
        macro_rules! store {
            () => {
                EntityStore::new(remote.clone(), rx.clone(), notifier.clone())
            };
        }

        Self {
            jobs: store!(),
            applications: store!(),
            interviews: store!(),
            tasks: store!(),
            questions: store!(),
            categories: store!(),
            documents: store!(),
            progress: ProgressStore::new(store!()),
            auth,
        }
    }

    /// Signs out and drops every cached row.
    pub async fn sign_out(&self) -> Result<(), TrackerError> {
        let outcome = self.auth.sign_out().await;
        self.jobs.clear().await;
        self.applications.clear().await;
        self.interviews.clear().await;
        self.tasks.clear().await;
        self.questions.clear().await;
        self.categories.clear().await;
        self.documents.clear().await;
        self.progress.clear().await;
        info!("Cleared cached rows");
        outcome
    }

    /// Refreshes the stores the dashboard reads, then summarises them.
    pub async fn summary(&self) -> Result<DashboardSummary, TrackerError> {
        let (jobs, applications, interviews, tasks, progress) = tokio::try_join!(
            self.jobs.fetch(),
            self.applications.fetch(),
            self.interviews.fetch(),
            self.tasks.fetch(),
            self.progress.fetch(),
        )?;
        Ok(compute_summary(
            &jobs,
            &applications,
            &interviews,
            &tasks,
            &progress,
            Utc::now(),
        ))
    }
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub notifications: Arc<Mutex<NotificationQueue>>,
}

impl AppState {
    pub fn new(tracker: Tracker, notifications: NotificationQueue) -> Self {
        Self {
            tracker: Arc::new(tracker),
            notifications: Arc::new(Mutex::new(notifications)),
        }
    }
}

/// Picks the store an entity type lives in, so routes can stay generic.
pub trait StoreFor: Entity {
    fn store(tracker: &Tracker) -> &EntityStore<Self>;
}

macro_rules! store_for {
    ($($entity:ty => $field:ident),* $(,)?) => {
        $(impl StoreFor for $entity {
            fn store(tracker: &Tracker) -> &EntityStore<Self> {
                &tracker.$field
            }
        })*
    };
}

store_for! {
    Job => jobs,
    JobApplication => applications,
    Interview => interviews,
    Task => tasks,
    Question => questions,
    QuestionCategory => categories,
    Document => documents,
}
