//! In-process stand-in for the hosted data and auth services.
//!
//! Behaves like the real service where the stores can observe it: assigns ids
//! and timestamps, stamps `updated_at` on writes, enforces row ownership from
//! the bearer token and unique constraints, and echoes mutated rows.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::{AuthBackend, OAuthProvider, Session, SignUpOutcome, User};
use crate::query::{Direction, Filter, FilterOp, FilterValue, Query};
use crate::remote::{RemoteError, RemoteService};

struct Account {
    password: String,
    user: User,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, User>,
    failures: VecDeque<RemoteError>,
}

#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of service calls received so far, data and auth alike.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Rejects inserts that collide on `columns` within `table` (code 23505).
    pub fn add_unique_constraint(&self, table: &str, columns: &[&str]) {
        self.lock()
            .unique
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
    }

    /// The next call fails with `err` instead of running.
    pub fn fail_next(&self, err: RemoteError) {
        self.lock().failures.push_back(err);
    }

    /// Every row in `table`, ignoring ownership.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Creates a passwordless account (as an OAuth provider would) and
    /// returns a live session for it.
    pub fn register_user(&self, email: &str) -> Session {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.issue_session(&mut self.lock(), user)
    }

    pub fn revoke_all_sessions(&self) {
        self.lock().sessions.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn issue_session(&self, inner: &mut Inner, user: User) -> Session {
        let access_token = format!("mem-{}", Uuid::new_v4().simple());
        inner.sessions.insert(access_token.clone(), user.clone());
        Session {
            access_token,
            refresh_token: Some(format!("mem-refresh-{}", Uuid::new_v4().simple())),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            user,
        }
    }

    /// Counts the call, pops an injected failure, then hands over the state.
    fn begin(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RemoteError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.lock();
        match inner.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(inner),
        }
    }

    fn owner(inner: &Inner, access_token: &str) -> Result<Uuid, RemoteError> {
        inner
            .sessions
            .get(access_token)
            .map(|u| u.id)
            .ok_or_else(|| RemoteError::api(401, Some("PGRST301"), "JWT expired"))
    }
}

static NULL: Value = Value::Null;

fn owned_by(row: &Value, owner: Uuid) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(owner.to_string().as_str())
}

fn check_owner(row: &Value, owner: Uuid) -> Result<(), RemoteError> {
    if owned_by(row, owner) {
        Ok(())
    } else {
        Err(RemoteError::api(
            403,
            Some("42501"),
            "new row violates row-level security policy",
        ))
    }
}

fn as_object(row: Value) -> Result<Map<String, Value>, RemoteError> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::api(
            400,
            Some("PGRST102"),
            format!("expected a JSON object, got {other}"),
        )),
    }
}

fn key_of(row: &Value, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_to_filter(field: &Value, value: &FilterValue) -> Option<Ordering> {
    match (field, value) {
        (Value::Null, _) => None,
        (Value::Number(n), FilterValue::Int(i)) => n.as_f64()?.partial_cmp(&(*i as f64)),
        (Value::Number(n), FilterValue::Float(x)) => n.as_f64()?.partial_cmp(x),
        (Value::Number(n), FilterValue::Text(s)) => n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::Bool(b), FilterValue::Bool(c)) => Some(b.cmp(c)),
        (Value::Bool(b), FilterValue::Text(s)) => Some(b.to_string().as_str().cmp(s.as_str())),
        (Value::String(s), v) => Some(s.as_str().cmp(v.to_string().as_str())),
        _ => None,
    }
}

/// `%` and `*` match any run of characters, `_` a single one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '%' || pattern[p] == '*') {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%' || *c == '*')
}

fn row_matches(row: &Value, filter: &Filter) -> bool {
    let field = row.get(&filter.column).unwrap_or(&NULL);
    let ord = || compare_to_filter(field, &filter.value);
    match filter.op {
        FilterOp::Eq => ord() == Some(Ordering::Equal),
        FilterOp::Neq => ord() != Some(Ordering::Equal),
        FilterOp::Gt => ord() == Some(Ordering::Greater),
        FilterOp::Gte => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => ord() == Some(Ordering::Less),
        FilterOp::Lte => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like => field
            .as_str()
            .is_some_and(|s| like(s, &filter.value.to_string())),
        FilterOp::ILike => field.as_str().is_some_and(|s| {
            like(&s.to_lowercase(), &filter.value.to_string().to_lowercase())
        }),
        FilterOp::Is => match &filter.value {
            FilterValue::Null => field.is_null(),
            FilterValue::Bool(b) => field.as_bool() == Some(*b),
            _ => false,
        },
        FilterOp::In => match &filter.value {
            FilterValue::List(items) => items
                .iter()
                .any(|item| compare_to_filter(field, item) == Some(Ordering::Equal)),
            _ => false,
        },
    }
}

fn violates_unique(inner: &Inner, table: &str, rows: &[Value], candidate: &Value) -> bool {
    let Some(constraints) = inner.unique.get(table) else {
        return false;
    };
    constraints.iter().any(|columns| {
        let key = key_of(candidate, columns);
        rows.iter().any(|r| key_of(r, columns) == key)
    })
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let inner = self.begin()?;
        let owner = Self::owner(&inner, access_token)?;

        let mut rows: Vec<Value> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| owned_by(r, owner))
                    .filter(|r| query.filters().iter().all(|f| row_matches(r, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            for order in query.order() {
                let ord = compare_values(
                    a.get(&order.column).unwrap_or(&NULL),
                    b.get(&order.column).unwrap_or(&NULL),
                );
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let offset = query.offset().unwrap_or(0) as usize;
        let limit = query.limit().map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.begin()?;
        let owner = Self::owner(&inner, access_token)?;
        let now = Value::String(Utc::now().to_rfc3339());

        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            check_owner(&row, owner)?;
            let mut map = as_object(row)?;
            map.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            map.entry("created_at").or_insert_with(|| now.clone());
            map.entry("updated_at").or_insert_with(|| now.clone());
            prepared.push(Value::Object(map));
        }

        let existing = inner.tables.get(table).cloned().unwrap_or_default();
        for (i, row) in prepared.iter().enumerate() {
            if violates_unique(&inner, table, &existing, row)
                || violates_unique(&inner, table, &prepared[..i], row)
            {
                return Err(RemoteError::api(
                    409,
                    Some("23505"),
                    format!("duplicate key value violates unique constraint on {table}"),
                ));
            }
        }

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(prepared.iter().cloned());
        Ok(prepared)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.begin()?;
        let owner = Self::owner(&inner, access_token)?;
        let patch = as_object(patch)?;
        let now = Value::String(Utc::now().to_rfc3339());

        let mut echoed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows
                .iter_mut()
                .filter(|r| owned_by(r, owner) && filters.iter().all(|f| row_matches(r, f)))
            {
                if let Value::Object(map) = &mut *row {
                    for (k, v) in &patch {
                        map.insert(k.clone(), v.clone());
                    }
                    map.insert("updated_at".to_string(), now.clone());
                }
                echoed.push(row.clone());
            }
        }
        Ok(echoed)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.begin()?;
        let owner = Self::owner(&inner, access_token)?;
        let columns: Vec<String> = on_conflict.iter().map(|c| c.to_string()).collect();
        let now = Value::String(Utc::now().to_rfc3339());

        let mut echoed = Vec::with_capacity(rows.len());
        for row in rows {
            check_owner(&row, owner)?;
            let incoming = as_object(row)?;
            let key = key_of(&Value::Object(incoming.clone()), &columns);
            let table_rows = inner.tables.entry(table.to_string()).or_default();

            match table_rows.iter_mut().find(|r| key_of(r, &columns) == key) {
                Some(existing) => {
                    if let Value::Object(map) = &mut *existing {
                        for (k, v) in incoming {
                            map.insert(k, v);
                        }
                        map.insert("updated_at".to_string(), now.clone());
                    }
                    echoed.push(existing.clone());
                }
                None => {
                    let mut map = incoming;
                    map.entry("id")
                        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                    map.entry("created_at").or_insert_with(|| now.clone());
                    map.insert("updated_at".to_string(), now.clone());
                    let row = Value::Object(map);
                    table_rows.push(row.clone());
                    echoed.push(row);
                }
            }
        }
        Ok(echoed)
    }

    async fn delete(
        &self,
        table: &str,
        filters: &[Filter],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.begin()?;
        let owner = Self::owner(&inner, access_token)?;

        let mut removed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|r| {
                let hit = owned_by(r, owner) && filters.iter().all(|f| row_matches(r, f));
                if hit {
                    removed.push(r.clone());
                }
                !hit
            });
        }
        Ok(removed)
    }
}

#[async_trait]
impl AuthBackend for MemoryRemote {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, RemoteError> {
        let mut inner = self.begin()?;
        if inner.accounts.contains_key(email) {
            return Err(RemoteError::api(
                422,
                Some("user_already_exists"),
                "User already registered",
            ));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        Ok(SignUpOutcome::SignedIn(self.issue_session(&mut inner, user)))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let mut inner = self.begin()?;
        let user = match inner.accounts.get(email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => {
                return Err(RemoteError::api(
                    400,
                    Some("invalid_grant"),
                    "Invalid login credentials",
                ))
            }
        };
        Ok(self.issue_session(&mut inner, user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), RemoteError> {
        let mut inner = self.begin()?;
        inner.sessions.remove(access_token);
        Ok(())
    }

    async fn reset_password(
        &self,
        _email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<(), RemoteError> {
        // Unknown addresses succeed too, so the reply never reveals which accounts exist.
        self.begin().map(|_| ())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, RemoteError> {
        let inner = self.begin()?;
        inner
            .sessions
            .get(access_token)
            .cloned()
            .ok_or_else(|| RemoteError::api(401, Some("bad_jwt"), "invalid JWT"))
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!("memory://authorize?provider={provider}&redirect_to={redirect_to}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> (MemoryRemote, Session) {
        let remote = MemoryRemote::new();
        let session = remote.register_user("ada@example.com");
        (remote, session)
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like("Acme Corp", "Acme%"));
        assert!(like("Acme Corp", "*Corp"));
        assert!(like("Acme", "A_me"));
        assert!(!like("Acme", "Ac"));
        assert!(like("", "%"));
    }

    #[tokio::test]
    async fn test_select_applies_filters_order_and_range() {
        let (remote, session) = seeded();
        let uid = session.user.id.to_string();
        let rows: Vec<Value> = [("b", 2), ("a", 1), ("c", 3)]
            .iter()
            .map(|(name, rank)| json!({"user_id": uid, "name": name, "rank": rank}))
            .collect();
        remote.insert("items", rows, &session.access_token).await.unwrap();

        let q = Query::builder()
            .filter(Filter::gte("rank", 2))
            .order_by("name", Direction::Desc)
            .build()
            .unwrap();
        let got = remote.select("items", &q, &session.access_token).await.unwrap();
        let names: Vec<_> = got.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["c", "b"]);

        let q = Query::builder()
            .order_by("rank", Direction::Asc)
            .range(1, 1)
            .build()
            .unwrap();
        let got = remote.select("items", &q, &session.access_token).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["name"], "b");
    }

    #[tokio::test]
    async fn test_rows_are_isolated_per_owner() {
        let (remote, ada) = seeded();
        let bob = remote.register_user("bob@example.com");
        remote
            .insert("items", vec![json!({"user_id": ada.user.id, "name": "mine"})], &ada.access_token)
            .await
            .unwrap();

        let all = Query::default();
        assert!(remote.select("items", &all, &bob.access_token).await.unwrap().is_empty());

        let err = remote
            .insert("items", vec![json!({"user_id": ada.user.id, "name": "spoof"})], &bob.access_token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("42501"));

        let err = remote.select("items", &all, "bogus").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_unique_constraint_and_upsert() {
        let (remote, session) = seeded();
        remote.add_unique_constraint("pairs", &["user_id", "key"]);
        let row = json!({"user_id": session.user.id, "key": "k", "n": 1});
        remote.insert("pairs", vec![row.clone()], &session.access_token).await.unwrap();
        let err = remote
            .insert("pairs", vec![row], &session.access_token)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("23505"));

        let echoed = remote
            .upsert(
                "pairs",
                vec![json!({"user_id": session.user.id, "key": "k", "n": 2})],
                &["user_id", "key"],
                &session.access_token,
            )
            .await
            .unwrap();
        assert_eq!(echoed[0]["n"], 2);
        assert_eq!(remote.rows("pairs").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let (remote, session) = seeded();
        remote.fail_next(RemoteError::Unavailable("offline".into()));
        let q = Query::default();
        assert!(remote.select("items", &q, &session.access_token).await.is_err());
        assert!(remote.select("items", &q, &session.access_token).await.is_ok());
        assert_eq!(remote.calls(), 2);
    }
}
