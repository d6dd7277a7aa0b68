// SPDX-License-Identifier: MIT OR Apache-2.0
//! RFC 7807 problem documents.

use axum::{
    Json,
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use todo_error::{AppError, FieldViolation, new_trace_id};

use crate::middleware::TraceContext;

/// Media type of every error body.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Header carrying the request's trace id, in and out.
pub const TRACE_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemFieldError {
    /// Field path.
    pub field: String,
    /// Field-level application code.
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
}

impl From<&FieldViolation> for ProblemFieldError {
    fn from(v: &FieldViolation) -> Self {
        Self {
            field: v.field.clone(),
            code: v.code.as_str().to_string(),
            message: v.description.clone(),
        }
    }
}

/// Problem document rendered for every failed HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// `{base}/{slug}` URL identifying the error category.
    #[serde(rename = "type")]
    pub type_url: String,
    /// Short category label.
    pub title: String,
    /// HTTP status.
    pub status: u16,
    /// Human-readable explanation.
    pub detail: String,
    /// Request path.
    pub instance: String,
    /// Correlation id, also sent as `X-Trace-ID`.
    pub trace_id: String,
    /// Time the error was raised.
    pub timestamp: DateTime<Utc>,
    /// Field violations; omitted unless this is a validation problem.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ProblemFieldError>,
    /// Auxiliary data such as retry guidance; omitted when empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl ProblemDetails {
    /// Build the document for `err`, resolving its `type` under `base_url`.
    pub fn from_error(err: &AppError, base_url: &str) -> Self {
        Self {
            type_url: format!("{}/{}", base_url.trim_end_matches('/'), err.code().slug()),
            title: err.title().to_string(),
            status: err.http_status(),
            detail: err.detail().to_string(),
            instance: err.instance().unwrap_or_default().to_string(),
            trace_id: err.trace_id().unwrap_or_default().to_string(),
            timestamp: err.timestamp(),
            errors: err.field_violations().iter().map(Into::into).collect(),
            extensions: err.extensions().clone(),
        }
    }
}

/// Full HTTP response for `err`: status, problem body and headers.
///
/// `err` is expected to carry the request's trace id and path already.
pub fn problem_response(err: &AppError, base_url: &str) -> Response {
    let problem = ProblemDetails::from_error(err, base_url);
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut resp = (status, Json(&problem)).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
    if let Ok(v) = HeaderValue::from_str(&problem.trace_id) {
        headers.insert(TRACE_HEADER, v);
    }
    if let Some(policy) = err.retry_policy() {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(policy.retry_after_seconds));
    }
    resp
}

// ---------------------------------------------------------------------------
// ProblemScope
// ---------------------------------------------------------------------------

/// What the renderer needs to know about the request being answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemScope {
    /// Trace id of the request.
    pub trace_id: String,
    /// Request path, used as the problem `instance`.
    pub instance: String,
    /// `METHOD /matched/route`, used as the metrics label.
    pub route: String,
}

impl ProblemScope {
    /// Capture the scope of `req` before it is handed to the next layer.
    pub fn of(req: &Request) -> Self {
        let trace_id = req
            .extensions()
            .get::<TraceContext>()
            .map_or_else(new_trace_id, |t| t.trace_id.clone());
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or("unmatched", MatchedPath::as_str);
        Self {
            trace_id,
            instance: req.uri().path().to_string(),
            route: format!("{} {}", req.method(), route),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_error::AppCode;

    #[test]
    fn type_url_uses_the_slug() {
        let err = AppError::not_found("Task", "zz");
        let p = ProblemDetails::from_error(&err, "https://errors.example.com/");
        assert_eq!(p.type_url, "https://errors.example.com/resource-not-found");
        assert_eq!(p.status, 404);
        assert_eq!(p.title, "Resource Not Found");
    }

    #[test]
    fn errors_and_extensions_are_omitted_when_empty() {
        let err = AppError::conflict("task", "taken")
            .with_trace_id("t")
            .with_instance("/v1/tasks");
        let body = serde_json::to_value(ProblemDetails::from_error(&err, "https://x")).unwrap();
        let obj = body.as_object().unwrap();
        assert!(!obj.contains_key("errors"));
        assert!(!obj.contains_key("extensions"));
        assert_eq!(obj["traceId"], "t");
        assert_eq!(obj["instance"], "/v1/tasks");
        assert_eq!(obj["type"], "https://x/resource-conflict");
    }

    #[test]
    fn violations_become_errors() {
        let err = AppError::validation_failed(vec![FieldViolation::new(
            "title",
            AppCode::RequiredField,
            "value is required",
        )]);
        let body = serde_json::to_value(ProblemDetails::from_error(&err, "https://x")).unwrap();
        assert_eq!(
            body["errors"],
            serde_json::json!([{
                "field": "title",
                "code": "REQUIRED_FIELD",
                "message": "value is required",
            }])
        );
    }

    #[test]
    fn response_headers() {
        let err = AppError::service_unavailable("down").with_trace_id("abc");
        let resp = problem_response(&err, "https://x");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        assert_eq!(resp.headers()[TRACE_HEADER], "abc");
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
    }
}
