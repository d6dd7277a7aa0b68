// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP routes.
//!
//! Task routes forward to the RPC surface; their errors come back as
//! statuses and are rendered on the proxied path. The validate routes, body
//! and query rejections and unknown routes fail in the gateway itself and
//! are rendered on the direct path.

use axum::{
    Json,
    extract::{
        FromRequestParts, Path as AxPath, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use todo_core::{
    BatchCreateTasksRequest, BatchCreateTasksResponse, CreateTaskRequest, DeleteTaskRequest,
    DeleteTaskResponse, GetTaskRequest, ListTasksRequest, ListTasksResponse, Task,
    UpdateTaskRequest, task_name,
};
use todo_error::{AppError, new_trace_id};
use todo_rpc::{AUTHORIZATION, TRACE_ID};
use todo_telemetry::ErrorSnapshot;
use tonic::metadata::AsciiMetadataValue;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::TraceContext;

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// What an HTTP request forwards into RPC metadata.
#[derive(Debug, Clone)]
pub struct CallContext {
    trace_id: String,
    authorization: Option<String>,
}

impl CallContext {
    /// Wrap `message` in an RPC request carrying the trace id and the
    /// caller's credentials.
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut req = tonic::Request::new(message);
        let metadata = req.metadata_mut();
        if let Ok(v) = self.trace_id.parse::<AsciiMetadataValue>() {
            metadata.insert(TRACE_ID, v);
        }
        if let Some(Ok(v)) = self
            .authorization
            .as_deref()
            .map(str::parse::<AsciiMetadataValue>)
        {
            metadata.insert(AUTHORIZATION, v);
        }
        req
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = parts
            .extensions
            .get::<TraceContext>()
            .map_or_else(new_trace_id, |t| t.trace_id.clone());
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            trace_id,
            authorization,
        })
    }
}

// ---------------------------------------------------------------------------
// Task routes (proxied)
// ---------------------------------------------------------------------------

pub(crate) async fn create_task(
    State(state): State<Arc<AppState>>,
    call: CallContext,
    body: Result<Json<Task>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(task) = body?;
    let created = state
        .rpc
        .create_task(call.request(CreateTaskRequest::new(task)))
        .await?
        .into_inner();
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn list_tasks(
    State(state): State<Arc<AppState>>,
    call: CallContext,
    query: Result<Query<ListTasksRequest>, QueryRejection>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let Query(req) = query?;
    let page = state.rpc.list_tasks(call.request(req)).await?.into_inner();
    Ok(Json(page))
}

pub(crate) async fn get_task(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    call: CallContext,
) -> Result<Json<Task>, ApiError> {
    let req = GetTaskRequest {
        name: task_name(&id),
    };
    let task = state.rpc.get_task(call.request(req)).await?.into_inner();
    Ok(Json(task))
}

pub(crate) async fn update_task(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    call: CallContext,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(mut req) = body?;
    if let Some(task) = req.task.as_mut() {
        task.name = task_name(&id);
    }
    let task = state.rpc.update_task(call.request(req)).await?.into_inner();
    Ok(Json(task))
}

pub(crate) async fn delete_task(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    call: CallContext,
) -> Result<Json<DeleteTaskResponse>, ApiError> {
    let req = DeleteTaskRequest {
        name: task_name(&id),
    };
    let out = state.rpc.delete_task(call.request(req)).await?.into_inner();
    Ok(Json(out))
}

pub(crate) async fn batch_create_tasks(
    State(state): State<Arc<AppState>>,
    call: CallContext,
    body: Result<Json<BatchCreateTasksRequest>, JsonRejection>,
) -> Result<Json<BatchCreateTasksResponse>, ApiError> {
    let Json(req) = body?;
    let out = state
        .rpc
        .batch_create_tasks(call.request(req))
        .await?
        .into_inner();
    Ok(Json(out))
}

// ---------------------------------------------------------------------------
// Validation routes (direct)
// ---------------------------------------------------------------------------

pub(crate) async fn validate_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Task>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(task) = body?;
    if let Some(err) = state.validator.validate_task(&task) {
        return Err(err.into());
    }
    Ok(Json(json!({ "valid": true })))
}

pub(crate) async fn validate_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchCreateTasksRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    if let Some(err) = state.validator.validate_batch(&req) {
        return Err(err.into());
    }
    Ok(Json(json!({ "valid": true, "items": req.requests.len() })))
}

// ---------------------------------------------------------------------------
// Operational routes
// ---------------------------------------------------------------------------

pub(crate) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": Utc::now().to_rfc3339(),
    }))
}

pub(crate) async fn metrics(State(state): State<Arc<AppState>>) -> Json<ErrorSnapshot> {
    Json(state.counters.snapshot())
}

pub(crate) async fn route_not_found(uri: axum::http::Uri) -> ApiError {
    AppError::not_found("Route", uri.path()).into()
}

/// Known path, unsupported method. The taxonomy has no 405 row, so this is
/// reported as a missing route with the method in the detail.
pub(crate) async fn method_not_allowed(
    method: axum::http::Method,
    uri: axum::http::Uri,
) -> ApiError {
    AppError::not_found("Route", &format!("{method} {}", uri.path())).into()
}
