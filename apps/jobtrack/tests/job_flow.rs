use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use jobtrack::errors::{classify, ErrorKind};
use jobtrack::models::{JobPatch, JobStatus, NewJob};
use jobtrack::notify::{channel, NotificationKind, ToastDurations};
use jobtrack::query::{Filter, Query};
use jobtrack::remote::MemoryRemote;
use jobtrack::routes::build_router;
use jobtrack::state::{AppState, Tracker};
use serde_json::{json, Value};
use tower::ServiceExt;

fn tracker() -> (Arc<MemoryRemote>, Tracker, jobtrack::notify::NotificationQueue) {
    let remote = Arc::new(MemoryRemote::new());
    let (notifier, queue) = channel(ToastDurations::default());
    let tracker = Tracker::new(remote.clone(), remote.clone(), notifier);
    (remote, tracker, queue)
}

#[tokio::test]
async fn job_lifecycle_against_the_store() {
    let (remote, tracker, mut queue) = tracker();
    tracker
        .auth
        .sign_up("ada@example.com", "hunter22")
        .await
        .expect("sign up");

    let created = tracker
        .jobs
        .create(&NewJob {
            company: "Acme".into(),
            position: "Engineer".into(),
            status: JobStatus::New,
            ..Default::default()
        })
        .await
        .expect("create");

    let fetched = tracker.jobs.fetch().await.expect("fetch");
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, created.id);
    assert_eq!(fetched[0].company, "Acme");
    assert_eq!(fetched[0].status, JobStatus::New);

    let updated = tracker
        .jobs
        .update(
            created.id,
            &JobPatch {
                status: Some(JobStatus::Applied),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.status, JobStatus::Applied);

    let applied = tracker
        .jobs
        .query(
            Query::builder()
                .filter(Filter::eq("status", "applied"))
                .build()
                .expect("query"),
        )
        .await
        .expect("query");
    assert_eq!(applied.len(), 1);

    tracker.jobs.delete(created.id).await.expect("delete");
    assert!(tracker.jobs.get(created.id).await.is_none());
    assert!(tracker.jobs.fetch().await.expect("refetch").is_empty());
    assert!(remote.rows("jobs").is_empty());

    let messages: Vec<String> = queue
        .drain()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Success)
        .map(|n| n.message)
        .collect();
    assert!(messages.contains(&"Job created".to_string()));
    assert!(messages.contains(&"Job updated".to_string()));
    assert!(messages.contains(&"Job deleted".to_string()));
}

#[tokio::test]
async fn expired_session_surfaces_as_authentication_error() {
    let (remote, tracker, _queue) = tracker();
    tracker
        .auth
        .sign_up("ada@example.com", "hunter22")
        .await
        .expect("sign up");
    remote.revoke_all_sessions();

    let err = tracker.tasks.fetch().await.unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::Authentication);
    assert!(tracker.tasks.error().await.is_some());
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn http_api_drives_the_stores() {
    let (_remote, tracker, queue) = tracker();
    let app = build_router(AppState::new(tracker, queue));

    let (status, body) = call(&app, "GET", "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("UNAUTHENTICATED"));

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/auth/sign-up",
        Some(json!({"email": "ada@example.com", "password": "hunter22"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, session) = call(&app, "GET", "/api/v1/auth/session", None).await;
    assert_eq!(session["phase"], json!("authenticated"));
    assert_eq!(session["has_session"], json!(true));

    for company in ["Acme", "Globex", "Initech"] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/jobs",
            Some(json!({"company": company, "position": "Engineer"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = call(&app, "GET", "/api/v1/jobs?q=glob&page=1&page_size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], json!(1));
    let id = page["items"][0]["id"].as_str().expect("id").to_string();

    let (status, job) = call(
        &app,
        "PATCH",
        &format!("/api/v1/jobs/{id}"),
        Some(json!({"status": "interviewing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], json!("interviewing"));

    let (_, page) = call(&app, "GET", "/api/v1/jobs?status=interviewing", None).await;
    assert_eq!(page["total"], json!(1));

    let question = "0b8f5a58-8d7e-4c8e-9a52-3f3c2b1d9e77";
    let (status, progress) = call(
        &app,
        "POST",
        &format!("/api/v1/progress/{question}/solve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["status"], json!("solved"));
    let (_, progress) = call(
        &app,
        "POST",
        &format!("/api/v1/progress/{question}/reset"),
        None,
    )
    .await;
    assert_eq!(progress["status"], json!("not started"));
    assert_eq!(progress["times_solved"], json!(0));
    assert_eq!(progress["last_solved_at"], Value::Null);

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/v1/progress/{question}"),
        Some(json!({"status": "attempted", "times_solved": -1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    let (status, summary) = call(&app, "GET", "/api/v1/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_jobs"], json!(3));
    assert_eq!(summary["jobs_by_status"]["interviewing"], json!(1));
    assert_eq!(summary["solved_questions"], json!(0));

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, "DELETE", &format!("/api/v1/jobs/{id}"), None).await;
    // Deleting an already-gone row is not an error.
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (_, toasts) = call(&app, "GET", "/api/v1/notifications", None).await;
    let toasts = toasts.as_array().expect("array");
    assert!(toasts.iter().any(|t| t["message"] == json!("Job deleted")));
    assert!(toasts.iter().any(|t| t["kind"] == json!("error")));

    let (_, again) = call(&app, "GET", "/api/v1/notifications", None).await;
    assert_eq!(again, json!([]));

    let (status, _) = call(&app, "POST", "/api/v1/auth/sign-out", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", "/api/v1/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_oauth_provider_is_rejected() {
    let (_remote, tracker, queue) = tracker();
    let app = build_router(AppState::new(tracker, queue));

    let (status, body) = call(
        &app,
        "GET",
        "/api/v1/auth/oauth/github?redirect_to=http://localhost:3000/cb",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().expect("url").contains("provider=github"));

    let (status, body) = call(
        &app,
        "GET",
        "/api/v1/auth/oauth/myspace?redirect_to=http://localhost:3000/cb",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}
