//! Per-table state containers.
//!
//! An [`EntityStore`] owns the in-memory list for one table plus its
//! loading/error flags, and is the only path its rows take to and from the
//! remote service. The local list changes only after the service confirms a
//! write, and it is replaced with whatever rows the service echoes back.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{AuthState, Session};
use crate::errors::{report, TrackerError};
use crate::models::Entity;
use crate::notify::Notifier;
use crate::query::{Filter, Query};
use crate::remote::RemoteService;

mod inflight;
pub mod progress;

use inflight::InFlight;
pub use progress::ProgressStore;

struct StoreState<E> {
    items: Vec<E>,
    loading: bool,
    error: Option<String>,
}

impl<E> Default for StoreState<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

/// Point-in-time copy of a store, as handed to a view.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot<E> {
    pub items: Vec<E>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct EntityStore<E: Entity> {
    remote: Arc<dyn RemoteService>,
    auth: watch::Receiver<AuthState>,
    notifier: Notifier,
    state: RwLock<StoreState<E>>,
    in_flight: InFlight,
    silent: bool,
}

fn decode_rows<E: Entity>(rows: Vec<Value>) -> Result<Vec<E>, TrackerError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(TrackerError::from))
        .collect()
}

/// Filters every id-scoped write carries.
fn owned_row(id: Uuid, user_id: Uuid) -> [Filter; 2] {
    [Filter::eq("id", id), Filter::eq("user_id", user_id)]
}

/// Replaces the row with the same id, or appends it.
fn put_local<E: Entity>(items: &mut Vec<E>, row: E) {
    match items.iter_mut().find(|e| e.id() == row.id()) {
        Some(slot) => *slot = row,
        None => items.push(row),
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        auth: watch::Receiver<AuthState>,
        notifier: Notifier,
    ) -> Self {
        Self {
            remote,
            auth,
            notifier,
            state: RwLock::new(StoreState::default()),
            in_flight: InFlight::default(),
            silent: false,
        }
    }

    /// Failures are still logged and recorded, but raise no toasts.
    pub fn silenced(mut self) -> Self {
        self.silent = true;
        self
    }

    fn label(&self) -> String {
        E::LABEL.to_lowercase()
    }

    fn session(&self) -> Result<Session, TrackerError> {
        self.auth
            .borrow()
            .session
            .clone()
            .ok_or(TrackerError::NotAuthenticated)
    }

    fn record(&self, state: &mut StoreState<E>, action: &str, err: TrackerError) -> TrackerError {
        let classified = report(
            &err,
            &self.notifier,
            &format!("{action} {}", self.label()),
            self.silent,
        );
        if !matches!(err, TrackerError::InFlight(_)) {
            state.error = Some(classified.message);
        }
        err
    }

    /// Fails an operation before it reaches the service, through the same
    /// reporting path as a remote failure.
    pub(crate) async fn reject(&self, action: &str, err: TrackerError) -> TrackerError {
        let mut state = self.state.write().await;
        self.record(&mut state, action, err)
    }

    fn succeeded(&self, message: String) {
        if !self.silent {
            self.notifier.success(message);
        }
    }

    async fn select(&self, session: &Session, query: Query) -> Result<Vec<E>, TrackerError> {
        let query = if query.is_scoped() {
            query.and(Filter::eq("user_id", session.user.id))
        } else {
            query
        };
        let rows = self
            .remote
            .select(E::TABLE, &query, &session.access_token)
            .await?;
        decode_rows(rows)
    }

    async fn load(&self) -> Result<Vec<E>, TrackerError> {
        let session = self.session()?;
        let (column, direction) = E::DEFAULT_ORDER;
        self.select(&session, Query::default().or_order_by(column, direction))
            .await
    }

    /// Replaces the list with the signed-in user's rows.
    pub async fn fetch(&self) -> Result<Vec<E>, TrackerError> {
        self.state.write().await.loading = true;
        let outcome = self.load().await;

        let mut state = self.state.write().await;
        state.loading = false;
        match outcome {
            Ok(items) => {
                debug!("Loaded {} rows from {}", items.len(), E::TABLE);
                state.items = items.clone();
                state.error = None;
                Ok(items)
            }
            Err(err) => Err(self.record(&mut state, "load", err)),
        }
    }

    async fn run_query(&self, query: Query) -> Result<Vec<E>, TrackerError> {
        let session = self.session()?;
        self.select(&session, query).await
    }

    /// Ad hoc read. Leaves the list and the store error untouched.
    pub async fn query(&self, query: Query) -> Result<Vec<E>, TrackerError> {
        self.run_query(query).await.map_err(|err| {
            report(
                &err,
                &self.notifier,
                &format!("query {}", E::TABLE),
                self.silent,
            );
            err
        })
    }

    async fn insert(&self, input: &E::New) -> Result<Vec<E>, TrackerError> {
        let session = self.session()?;
        let mut payload = serde_json::to_value(input)?;
        stamp(&mut payload, "user_id", session.user.id);

        let _guard = self
            .in_flight
            .acquire(format!("create:{payload}"), &format!("Creating this {}", self.label()))?;
        let rows = self
            .remote
            .insert(E::TABLE, vec![payload], &session.access_token)
            .await?;
        let rows: Vec<E> = decode_rows(rows)?;
        if rows.is_empty() {
            return Err(TrackerError::NoRowReturned(format!("new {}", self.label())));
        }
        Ok(rows)
    }

    /// Inserts a row owned by the signed-in user. The list only grows once
    /// the service has echoed the new row.
    pub async fn create(&self, input: &E::New) -> Result<E, TrackerError> {
        let outcome = self.insert(input).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(rows) => {
                let first = rows[0].clone();
                for row in rows {
                    put_local(&mut state.items, row);
                }
                state.error = None;
                info!("Created {} {}", E::TABLE, first.id());
                self.succeeded(format!("{} created", E::LABEL));
                Ok(first)
            }
            Err(err) => Err(self.record(&mut state, "create", err)),
        }
    }

    async fn patch_remote(&self, id: Uuid, patch: &E::Patch) -> Result<E, TrackerError> {
        let session = self.session()?;
        let body = serde_json::to_value(patch)?;

        let _guard = self
            .in_flight
            .acquire(format!("update:{id}"), &format!("Updating this {}", self.label()))?;
        let rows = self
            .remote
            .update(
                E::TABLE,
                &owned_row(id, session.user.id),
                body,
                &session.access_token,
            )
            .await?;
        decode_rows::<E>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::NoRowReturned(format!("{} {id}", self.label())))
    }

    /// Partial update. The local entry becomes the row the service returned,
    /// not the patch that was sent.
    pub async fn update(&self, id: Uuid, patch: &E::Patch) -> Result<E, TrackerError> {
        let outcome = self.patch_remote(id, patch).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(row) => {
                if let Some(slot) = state.items.iter_mut().find(|e| e.id() == id) {
                    *slot = row.clone();
                }
                state.error = None;
                info!("Updated {} {}", E::TABLE, id);
                self.succeeded(format!("{} updated", E::LABEL));
                Ok(row)
            }
            Err(err) => Err(self.record(&mut state, "update", err)),
        }
    }

    async fn delete_remote(&self, id: Uuid) -> Result<(), TrackerError> {
        let session = self.session()?;
        let _guard = self
            .in_flight
            .acquire(format!("delete:{id}"), &format!("Deleting this {}", self.label()))?;
        self.remote
            .delete(E::TABLE, &owned_row(id, session.user.id), &session.access_token)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), TrackerError> {
        let outcome = self.delete_remote(id).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(()) => {
                state.items.retain(|e| e.id() != id);
                state.error = None;
                info!("Deleted {} {}", E::TABLE, id);
                self.succeeded(format!("{} deleted", E::LABEL));
                Ok(())
            }
            Err(err) => Err(self.record(&mut state, "delete", err)),
        }
    }

    async fn upsert_remote(
        &self,
        mut payload: Value,
        on_conflict: &[&str],
        in_flight_key: String,
    ) -> Result<E, TrackerError> {
        let session = self.session()?;
        stamp(&mut payload, "user_id", session.user.id);

        let _guard = self
            .in_flight
            .acquire(in_flight_key, &format!("Saving this {}", self.label()))?;
        let rows = self
            .remote
            .upsert(E::TABLE, vec![payload], on_conflict, &session.access_token)
            .await?;
        decode_rows::<E>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::NoRowReturned(format!("saved {}", self.label())))
    }

    /// Insert-or-update keyed by `on_conflict`; the echoed row replaces the
    /// local one with the same id or is appended.
    pub(crate) async fn upsert(
        &self,
        payload: Value,
        on_conflict: &[&str],
        in_flight_key: String,
        done: &str,
    ) -> Result<E, TrackerError> {
        let outcome = self.upsert_remote(payload, on_conflict, in_flight_key).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(row) => {
                info!("Upserted {} {}", E::TABLE, row.id());
                put_local(&mut state.items, row.clone());
                state.error = None;
                self.succeeded(done.to_string());
                Ok(row)
            }
            Err(err) => Err(self.record(&mut state, "save", err)),
        }
    }

    pub async fn items(&self) -> Vec<E> {
        self.state.read().await.items.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<E> {
        self.state
            .read()
            .await
            .items
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    pub(crate) async fn find(&self, pred: impl Fn(&E) -> bool) -> Option<E> {
        self.state.read().await.items.iter().find(|e| pred(e)).cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn snapshot(&self) -> StoreSnapshot<E> {
        let state = self.state.read().await;
        StoreSnapshot {
            items: state.items.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    /// Drops every cached row, e.g. on sign-out.
    pub async fn clear(&self) {
        *self.state.write().await = StoreState::default();
    }
}

fn stamp(payload: &mut Value, column: &str, id: Uuid) {
    if let Value::Object(map) = payload {
        map.insert(column.to_string(), Value::String(id.to_string()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::AuthStore;
    use crate::errors::{classify, ErrorKind};
    use crate::models::{Job, JobPatch, JobStatus, NewJob};
    use crate::notify::{channel, NotificationKind, NotificationQueue, ToastDurations};
    use crate::query::Direction;
    use crate::remote::{MemoryRemote, RemoteError};
    use async_trait::async_trait;

    /// Yields once before every call, so concurrent futures interleave.
    pub(crate) struct YieldingRemote(pub Arc<MemoryRemote>);

    #[async_trait]
    impl RemoteService for YieldingRemote {
        async fn select(&self, t: &str, q: &Query, tok: &str) -> Result<Vec<Value>, RemoteError> {
            tokio::task::yield_now().await;
            self.0.select(t, q, tok).await
        }
        async fn insert(&self, t: &str, r: Vec<Value>, tok: &str) -> Result<Vec<Value>, RemoteError> {
            tokio::task::yield_now().await;
            self.0.insert(t, r, tok).await
        }
        async fn update(
            &self,
            t: &str,
            f: &[Filter],
            p: Value,
            tok: &str,
        ) -> Result<Vec<Value>, RemoteError> {
            tokio::task::yield_now().await;
            self.0.update(t, f, p, tok).await
        }
        async fn upsert(
            &self,
            t: &str,
            r: Vec<Value>,
            c: &[&str],
            tok: &str,
        ) -> Result<Vec<Value>, RemoteError> {
            tokio::task::yield_now().await;
            self.0.upsert(t, r, c, tok).await
        }
        async fn delete(&self, t: &str, f: &[Filter], tok: &str) -> Result<Vec<Value>, RemoteError> {
            tokio::task::yield_now().await;
            self.0.delete(t, f, tok).await
        }
    }

    pub(crate) struct Harness {
        pub remote: Arc<MemoryRemote>,
        pub auth: AuthStore,
        pub notifier: Notifier,
        pub queue: NotificationQueue,
    }

    impl Harness {
        pub(crate) async fn signed_in() -> Self {
            let remote = Arc::new(MemoryRemote::new());
            let (notifier, mut queue) = channel(ToastDurations::default());
            let auth = AuthStore::new(remote.clone(), notifier.clone());
            auth.sign_up("ada@example.com", "hunter22").await.unwrap();
            queue.drain();
            Self {
                remote,
                auth,
                notifier,
                queue,
            }
        }

        pub(crate) fn store<E: Entity>(&self) -> EntityStore<E> {
            EntityStore::new(self.remote.clone(), self.auth.subscribe(), self.notifier.clone())
        }
    }

    fn acme() -> NewJob {
        NewJob {
            company: "Acme".into(),
            position: "Engineer".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_appends_server_echo_once() {
        let mut h = Harness::signed_in().await;
        let jobs = h.store::<Job>();

        let created = jobs.create(&acme()).await.unwrap();
        let items = jobs.items().await;
        assert_eq!(items.iter().filter(|j| j.id == created.id).count(), 1);

        let stored: Job = serde_json::from_value(h.remote.rows("jobs")[0].clone()).unwrap();
        assert_eq!(items[0], stored);
        assert_eq!(stored.user_id, h.auth.current().user().unwrap().id);
        assert_eq!(h.queue.drain()[0].kind, NotificationKind::Success);
    }

    #[tokio::test]
    async fn test_update_takes_server_row_not_patch() {
        let h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let created = jobs.create(&acme()).await.unwrap();

        let patch = JobPatch {
            status: Some(JobStatus::Applied),
            ..Default::default()
        };
        let updated = jobs.update(created.id, &patch).await.unwrap();
        assert_eq!(updated.status, JobStatus::Applied);
        // `updated_at` is stamped by the service, never sent by the client.
        assert!(updated.updated_at.is_some());
        assert_eq!(jobs.get(created.id).await, Some(updated));
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let a = jobs.create(&acme()).await.unwrap();
        let b = jobs
            .create(&NewJob {
                company: "Globex".into(),
                ..acme()
            })
            .await
            .unwrap();

        jobs.delete(a.id).await.unwrap();
        let ids: Vec<_> = jobs.items().await.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![b.id]);
        assert_eq!(h.remote.rows("jobs").len(), 1);
    }

    #[tokio::test]
    async fn test_signed_out_operations_fail_fast_without_calls() {
        let mut h = Harness::signed_in().await;
        h.auth.sign_out().await.unwrap();
        h.queue.drain();
        let jobs = h.store::<Job>();
        let before = h.remote.calls();

        let errs = vec![
            jobs.fetch().await.unwrap_err(),
            jobs.create(&acme()).await.unwrap_err(),
            jobs.update(Uuid::new_v4(), &JobPatch::default()).await.unwrap_err(),
            jobs.delete(Uuid::new_v4()).await.unwrap_err(),
            jobs.query(Query::default()).await.unwrap_err(),
        ];
        for err in &errs {
            assert_eq!(classify(err).kind, ErrorKind::Authentication);
        }
        assert_eq!(h.remote.calls(), before);
        assert!(jobs.error().await.is_some());
        assert_eq!(h.queue.drain().len(), errs.len());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_list_and_sets_error() {
        let mut h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let created = jobs.create(&acme()).await.unwrap();
        h.queue.drain();

        h.remote
            .fail_next(RemoteError::api(403, Some("42501"), "permission denied"));
        let patch = JobPatch {
            company: Some("Initech".into()),
            ..Default::default()
        };
        let err = jobs.update(created.id, &patch).await.unwrap_err();
        assert_eq!(classify(&err).kind, ErrorKind::Authorization);
        assert_eq!(jobs.get(created.id).await.unwrap().company, "Acme");
        assert_eq!(
            jobs.error().await.as_deref(),
            Some("You don't have permission to perform this action.")
        );
        let toasts = h.queue.drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, NotificationKind::Error);

        // The next success clears the error.
        jobs.fetch().await.unwrap();
        assert!(jobs.error().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_create_leaves_list_and_sets_error() {
        let mut h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let existing = jobs.create(&acme()).await.unwrap();
        h.queue.drain();
        let calls = h.remote.calls();

        h.remote
            .fail_next(RemoteError::api(409, Some("23505"), "duplicate key value"));
        let err = jobs
            .create(&NewJob {
                company: "Globex".into(),
                ..acme()
            })
            .await
            .unwrap_err();

        assert_eq!(classify(&err).kind, ErrorKind::Validation);
        assert_eq!(h.remote.calls(), calls + 1);
        assert_eq!(jobs.items().await, vec![existing]);
        assert_eq!(h.remote.rows("jobs").len(), 1);
        assert_eq!(jobs.error().await.as_deref(), Some("This record already exists."));
        let toasts = h.queue.drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, NotificationKind::Error);
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_list_and_sets_error() {
        let mut h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let created = jobs.create(&acme()).await.unwrap();
        h.queue.drain();

        h.remote
            .fail_next(RemoteError::api(403, Some("42501"), "permission denied"));
        let err = jobs.delete(created.id).await.unwrap_err();

        assert_eq!(classify(&err).kind, ErrorKind::Authorization);
        assert_eq!(jobs.items().await, vec![created]);
        assert_eq!(h.remote.rows("jobs").len(), 1);
        assert_eq!(
            jobs.error().await.as_deref(),
            Some("You don't have permission to perform this action.")
        );
        let toasts = h.queue.drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, NotificationKind::Error);
    }

    #[tokio::test]
    async fn test_update_of_unknown_row_is_not_found() {
        let h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        let err = jobs
            .update(Uuid::new_v4(), &JobPatch::default())
            .await
            .unwrap_err();
        assert_eq!(classify(&err).kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fetch_is_scoped_to_owner() {
        let h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        jobs.create(&acme()).await.unwrap();

        let other = h.remote.register_user("bob@example.com");
        h.remote
            .insert(
                "jobs",
                vec![serde_json::json!({
                    "user_id": other.user.id,
                    "company": "Hooli",
                    "position": "PM",
                    "status": "new"
                })],
                &other.access_token,
            )
            .await
            .unwrap();

        let fresh = h.store::<Job>();
        let loaded = fresh.fetch().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].company, "Acme");
        assert!(!fresh.is_loading().await);
    }

    #[tokio::test]
    async fn test_query_reads_without_touching_list() {
        let h = Harness::signed_in().await;
        let jobs = h.store::<Job>();
        for company in ["Acme", "Globex", "Initech"] {
            jobs.create(&NewJob {
                company: company.into(),
                ..acme()
            })
            .await
            .unwrap();
        }
        let before = jobs.items().await;

        let q = Query::builder()
            .filter(Filter::neq("company", "Globex"))
            .order_by("company", Direction::Desc)
            .limit(1)
            .build()
            .unwrap();
        let got = jobs.query(q).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].company, "Initech");
        assert_eq!(jobs.items().await, before);
    }

    #[tokio::test]
    async fn test_double_submission_makes_one_call() {
        let h = Harness::signed_in().await;
        let remote: Arc<dyn RemoteService> = Arc::new(YieldingRemote(h.remote.clone()));
        let jobs: EntityStore<Job> = EntityStore::new(remote, h.auth.subscribe(), h.notifier.clone());
        let input = acme();
        let before = h.remote.calls();

        let (first, second) = tokio::join!(jobs.create(&input), jobs.create(&input));
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(TrackerError::InFlight(_)))));
        assert_eq!(h.remote.calls() - before, 1);
        assert_eq!(jobs.items().await.len(), 1);
        assert!(jobs.error().await.is_none());

        // Sequential resubmission is allowed once the first call has finished.
        jobs.create(&input).await.unwrap();
        assert_eq!(jobs.items().await.len(), 2);
    }

    #[tokio::test]
    async fn test_silenced_store_raises_no_toasts() {
        let mut h = Harness::signed_in().await;
        let jobs = h.store::<Job>().silenced();
        jobs.create(&acme()).await.unwrap();
        h.remote.fail_next(RemoteError::Unavailable("offline".into()));
        assert!(jobs.fetch().await.is_err());
        assert!(h.queue.drain().is_empty());
        assert!(jobs.error().await.is_some());
    }
}
