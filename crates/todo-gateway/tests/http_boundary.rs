// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway behaviour driven through the router with `oneshot`.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use todo_config::ServerConfig;
use todo_error::AppCode;
use todo_gateway::{AppState, PROBLEM_JSON, build_app, build_validator};
use todo_rpc::PANIC_DETAIL;
use todo_service::InMemoryStore;
use todo_telemetry::Boundary;
use todo_validate::{FieldValue, RuleSpec, TASK, Validator, standard_constraints};
use tower::ServiceExt;

/// The standard rules plus a title rule that panics on `explode`.
fn validator() -> Validator {
    let mut sets = standard_constraints();
    for set in sets.iter_mut().filter(|s| s.message == TASK) {
        for field in set.fields.iter_mut().filter(|f| f.field == "title") {
            field.rules.push(RuleSpec::Custom {
                id: "task.title.tripwire".into(),
            });
        }
    }
    let base = Validator::empty().with_rule("task.title.tripwire", |value| {
        if *value == FieldValue::Text("explode") {
            panic!("tripwire hit");
        }
        None
    });
    sets.into_iter()
        .try_fold(base, Validator::with_schema)
        .unwrap()
}

fn state() -> Arc<AppState> {
    Arc::new(AppState::in_process(
        &ServerConfig::default(),
        validator(),
        Arc::new(InMemoryStore::new()),
    ))
}

fn app(state: &Arc<AppState>) -> Router {
    build_app(Arc::clone(state))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, "Bearer alice");
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

// ── 1. Proxied path ─────────────────────────────────────────────────

#[tokio::test]
async fn create_get_and_delete() {
    let state = state();
    let (status, _, created) = send(
        app(&state),
        request(Method::POST, "/v1/tasks", Some(json!({"title": "Ship it"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["created_by"], "alice");
    let name = created["name"].as_str().unwrap().to_string();
    let id = name.trim_start_matches("tasks/");

    let (status, _, fetched) =
        send(app(&state), request(Method::GET, &format!("/v1/tasks/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Ship it");

    let (status, _, out) =
        send(app(&state), request(Method::DELETE, &format!("/v1/tasks/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(out["message"].as_str().unwrap().contains(&name));
}

#[tokio::test]
async fn unknown_task_is_a_404_problem() {
    let state = state();
    let (status, headers, body) =
        send(app(&state), request(Method::GET, "/v1/tasks/zz", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CONTENT_TYPE], PROBLEM_JSON);
    assert_eq!(body["status"], 404);
    assert_eq!(body["title"], "Resource Not Found");
    assert_eq!(body["type"], "https://api.example.com/errors/resource-not-found");
    assert_eq!(body["instance"], "/v1/tasks/zz");
    assert!(body["detail"].as_str().unwrap().contains("zz"));
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn inbound_trace_id_wins() {
    let state = state();
    let mut req = request(Method::GET, "/v1/tasks/zz", None);
    req.headers_mut().insert("x-trace-id", "abc".parse().unwrap());
    let (_, headers, body) = send(app(&state), req).await;
    assert_eq!(body["traceId"], "abc");
    assert_eq!(headers["x-trace-id"], "abc");
}

#[tokio::test]
async fn duplicate_title_is_a_409_problem() {
    let state = state();
    let body = json!({"title": "once"});
    send(app(&state), request(Method::POST, "/v1/tasks", Some(body.clone()))).await;
    let (status, _, problem) =
        send(app(&state), request(Method::POST, "/v1/tasks", Some(body))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(problem["title"], "Resource Conflict");
}

#[tokio::test]
async fn validation_problem_lists_violations_in_order() {
    let state = state();
    let (status, _, problem) = send(
        app(&state),
        request(
            Method::POST,
            "/v1/tasks",
            Some(json!({"title": "", "tags": ["Bad Tag", "ok", "ok"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<_> = problem["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["field"].as_str().unwrap(), e["code"].as_str().unwrap()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("title", "REQUIRED_FIELD"),
            ("tags[0]", "INVALID_TAG_FORMAT"),
            ("tags[2]", "DUPLICATE_TAG"),
        ]
    );
}

#[tokio::test]
async fn update_then_list() {
    let state = state();
    let (_, _, created) = send(
        app(&state),
        request(Method::POST, "/v1/tasks", Some(json!({"title": "draft"}))),
    )
    .await;
    let id = created["name"].as_str().unwrap().trim_start_matches("tasks/").to_string();

    let (status, _, updated) = send(
        app(&state),
        request(
            Method::PATCH,
            &format!("/v1/tasks/{id}"),
            Some(json!({
                "task": {"title": "final", "priority": "HIGH"},
                "update_mask": {"paths": ["title"]},
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "final");
    assert_eq!(updated["priority"], created["priority"]);

    let (status, _, page) =
        send(app(&state), request(Method::GET, "/v1/tasks?page_size=10", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_size"], 1);
    assert_eq!(page["tasks"][0]["title"], "final");
}

#[tokio::test]
async fn bad_filter_is_a_validation_problem() {
    let state = state();
    let (status, _, problem) = send(
        app(&state),
        request(Method::GET, "/v1/tasks?filter=colour%3Dred", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem["errors"][0]["field"], "filter");
}

#[tokio::test]
async fn batch_partial_success() {
    let state = state();
    let (status, _, out) = send(
        app(&state),
        request(
            Method::POST,
            "/v1/tasks/batch",
            Some(json!({"requests": [
                {"task": {"title": "one"}},
                {"task": {"title": ""}},
                {"task": {"title": "three"}},
                null,
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(out["failed_count"], 2);
    let indices: Vec<_> = out["failures"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![1, 3]);
}

#[tokio::test]
async fn malformed_credentials_are_a_401_problem() {
    let state = state();
    let mut req = request(Method::GET, "/v1/tasks/abc", None);
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
    let (status, _, problem) = send(app(&state), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem["title"], "Authentication Failed");
}

// ── 2. Direct path ──────────────────────────────────────────────────

#[tokio::test]
async fn validate_route_renders_without_an_rpc_hop() {
    let state = state();
    let (status, headers, problem) = send(
        app(&state),
        request(Method::POST, "/v1/tasks/validate", Some(json!({"title": ""}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(headers[header::CONTENT_TYPE], PROBLEM_JSON);
    assert_eq!(problem["errors"][0]["code"], "REQUIRED_FIELD");
    assert_eq!(problem["instance"], "/v1/tasks/validate");

    let snap = state.counters.snapshot();
    assert_eq!(
        snap.errors["POST /v1/tasks/validate"][&AppCode::ValidationFailed],
        1
    );
}

#[tokio::test]
async fn valid_task_passes_the_validate_route() {
    let state = state();
    let (status, _, body) = send(
        app(&state),
        request(Method::POST, "/v1/tasks/validate", Some(json!({"title": "fine"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn empty_batch_fails_batch_validation() {
    let state = state();
    let (status, _, problem) = send(
        app(&state),
        request(Method::POST, "/v1/tasks/batch/validate", Some(json!({"requests": []}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem["errors"][0]["code"], "EMPTY_BATCH");
}

#[tokio::test]
async fn malformed_json_is_a_validation_problem() {
    let state = state();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/v1/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, problem) = send(app(&state), req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem["errors"][0]["field"], "body");
}

#[tokio::test]
async fn unknown_route_is_a_404_problem() {
    let state = state();
    let (status, headers, problem) =
        send(app(&state), request(Method::GET, "/v2/nothing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CONTENT_TYPE], PROBLEM_JSON);
    assert_eq!(problem["instance"], "/v2/nothing");
}

#[tokio::test]
async fn unsupported_method_on_known_route_is_a_problem() {
    let state = state();
    let (status, headers, problem) = send(
        app(&state),
        request(Method::PUT, "/v1/tasks/zz", Some(json!({"title": "x"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CONTENT_TYPE], PROBLEM_JSON);
    assert_eq!(problem["status"], 404);
    assert_eq!(problem["instance"], "/v1/tasks/zz");
    assert!(problem["detail"].as_str().unwrap().contains("PUT /v1/tasks/zz"));
    assert!(headers.contains_key("x-trace-id"));
}

// ── 3. Panic containment ────────────────────────────────────────────

#[tokio::test]
async fn direct_path_panic_is_contained() {
    let state = state();
    let mut req = request(
        Method::POST,
        "/v1/tasks/validate",
        Some(json!({"title": "explode"})),
    );
    req.headers_mut().insert("x-trace-id", "p-1".parse().unwrap());
    let (status, _, problem) = send(app(&state), req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(problem["detail"], PANIC_DETAIL);
    assert_eq!(problem["traceId"], "p-1");
    assert_eq!(state.counters.snapshot().panics_at(Boundary::Http), 1);

    let (status, _, _) = send(
        app(&state),
        request(Method::POST, "/v1/tasks", Some(json!({"title": "after"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rpc_side_panic_is_contained() {
    let state = state();
    let (status, _, problem) = send(
        app(&state),
        request(Method::POST, "/v1/tasks", Some(json!({"title": "explode"}))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(problem["detail"], PANIC_DETAIL);
    let snap = state.counters.snapshot();
    assert_eq!(snap.panics_at(Boundary::Rpc), 1);
    assert_eq!(snap.panics_at(Boundary::Http), 0);
}

// ── 4. Operational routes and startup ───────────────────────────────

#[tokio::test]
async fn health_and_metrics() {
    let state = state();
    let (status, _, health) = send(app(&state), request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    send(app(&state), request(Method::GET, "/v1/tasks/zz", None)).await;
    let (status, _, metrics) = send(app(&state), request(Method::GET, "/metrics", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total_errors"], 1);
    assert_eq!(metrics["errors"]["GetTask"]["RESOURCE_NOT_FOUND"], 1);
}

#[test]
fn constraints_file_replaces_the_task_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("constraints.toml");
    std::fs::write(
        &path,
        r#"
        [[constraint_set]]
        message = "todo.v1.Task"
        fields = [{ field = "title", rules = [{ kind = "min_len", min = 5 }] }]
        "#,
    )
    .unwrap();
    let config = ServerConfig {
        constraints_file: Some(path),
        ..ServerConfig::default()
    };

    let validator = build_validator(&config).unwrap();
    let err = validator
        .validate_task(&todo_core::Task::titled("abc"))
        .unwrap();
    assert_eq!(err.field_violations()[0].code, AppCode::TooShort);
}

#[test]
fn unreadable_constraints_file_is_an_error() {
    let config = ServerConfig {
        constraints_file: Some("/definitely/not/here.toml".into()),
        ..ServerConfig::default()
    };
    assert!(build_validator(&config).is_err());
}
