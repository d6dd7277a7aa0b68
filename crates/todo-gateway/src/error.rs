// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler errors and their deferred rendering.
//!
//! Handlers return [`ApiError`]. Its [`IntoResponse`] impl does not write a
//! body; it parks the error in the response extensions and the
//! [`render_problems`](crate::middleware::render_problems) layer, which knows
//! the trace id, path and problem base URL, turns it into a problem document.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use todo_error::{AppCode, AppError, FieldViolation, TransportCode};
use todo_telemetry::{ErrorSink, observe};

use crate::problem::ProblemScope;

/// Everything an HTTP handler may fail with.
pub enum ApiError {
    /// Raised by the gateway itself (direct path).
    App(AppError),
    /// Returned by the RPC server (proxied path).
    Rpc(tonic::Status),
}

impl ApiError {
    /// HTTP status this error will be rendered with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::App(err) => err.http_status(),
            Self::Rpc(status) => TransportCode::from_grpc(status.code())
                .map_or(500, TransportCode::http_status),
        }
    }

    /// Resolve into the error to render, stamped with `scope`'s trace id
    /// and path.
    ///
    /// Direct-path errors log their cause here and are reported to `sink`.
    /// Proxied errors were already counted by the RPC server; a status
    /// without usable detail degrades to a generic internal error.
    pub fn resolve(self, scope: &ProblemScope, sink: &dyn ErrorSink) -> AppError {
        match self {
            Self::App(err) => {
                let err = err
                    .with_trace_id(scope.trace_id.as_str())
                    .with_instance(scope.instance.as_str());
                err.log_cause();
                observe(sink, &scope.route, &err);
                err
            }
            Self::Rpc(status) => AppError::from_status_or_internal(&status)
                .with_trace_id(scope.trace_id.as_str())
                .with_instance(scope.instance.as_str()),
        }
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App(e) => f.debug_tuple("App").field(e).finish(),
            Self::Rpc(s) => f
                .debug_struct("Rpc")
                .field("code", &s.code())
                .field("message", &s.message())
                .finish(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App(e) => write!(f, "{e}"),
            Self::Rpc(s) => write!(f, "{:?}: {}", s.code(), s.message()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<tonic::Status> for ApiError {
    fn from(status: tonic::Status) -> Self {
        Self::Rpc(status)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::App(AppError::validation_failed(vec![FieldViolation::new(
            "body",
            AppCode::InvalidValue,
            rejection.body_text(),
        )]))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::App(AppError::validation_failed(vec![FieldViolation::new(
            "query",
            AppCode::InvalidValue,
            rejection.body_text(),
        )]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut resp = status.into_response();
        resp.extensions_mut().insert(PendingProblem::new(self));
        resp
    }
}

// ---------------------------------------------------------------------------
// PendingProblem
// ---------------------------------------------------------------------------

/// An [`ApiError`] waiting in the response extensions to be rendered.
#[derive(Clone)]
pub struct PendingProblem(Arc<Mutex<Option<ApiError>>>);

impl PendingProblem {
    fn new(err: ApiError) -> Self {
        Self(Arc::new(Mutex::new(Some(err))))
    }

    /// Take the error out; later calls return `None`.
    pub fn take(&self) -> Option<ApiError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl fmt::Debug for PendingProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingProblem").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_telemetry::ErrorCounters;

    fn scope() -> ProblemScope {
        ProblemScope {
            trace_id: "abc".into(),
            instance: "/v1/tasks/zz".into(),
            route: "GET /v1/tasks/{id}".into(),
        }
    }

    #[test]
    fn proxied_status_is_restamped() {
        let status = AppError::not_found("Task", "zz")
            .with_trace_id("from-rpc")
            .to_wire_status();
        let sink = ErrorCounters::new();
        let err = ApiError::from(status).resolve(&scope(), &sink);

        assert_eq!(err.code(), AppCode::ResourceNotFound);
        assert_eq!(err.trace_id(), Some("abc"));
        assert_eq!(err.instance(), Some("/v1/tasks/zz"));
        assert_eq!(sink.snapshot().total_errors, 0);
    }

    #[test]
    fn status_without_detail_degrades_to_internal() {
        let sink = ErrorCounters::new();
        let err = ApiError::from(tonic::Status::unavailable("backend gone")).resolve(&scope(), &sink);
        assert_eq!(err.code(), AppCode::InternalError);
        assert_eq!(err.detail(), "backend gone");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn direct_errors_are_observed_under_the_route() {
        let sink = ErrorCounters::new();
        let err = ApiError::from(AppError::required_field("title", "value is required"))
            .resolve(&scope(), &sink);
        assert_eq!(err.trace_id(), Some("abc"));
        let snap = sink.snapshot();
        assert_eq!(snap.errors["GET /v1/tasks/{id}"][&AppCode::ValidationFailed], 1);
        assert_eq!(snap.validation["title"][&AppCode::RequiredField], 1);
    }

    #[test]
    fn into_response_parks_the_error() {
        let resp = ApiError::from(AppError::conflict("task", "taken")).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let pending = resp.extensions().get::<PendingProblem>().unwrap();
        assert!(pending.take().is_some());
        assert!(pending.take().is_none());
    }

    #[test]
    fn rpc_status_maps_through_the_transport_table() {
        let err = ApiError::from(tonic::Status::permission_denied("no"));
        assert_eq!(err.http_status(), 403);
        let err = ApiError::from(tonic::Status::new(tonic::Code::DataLoss, "x"));
        assert_eq!(err.http_status(), 500);
    }
}
