// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the gateway.
//!
//! Outermost first: [`trace_context`], [`RequestLogger`], CORS,
//! [`recover_panics`], [`render_problems`].

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use todo_error::{AppError, new_trace_id};
use todo_rpc::PANIC_DETAIL;
use todo_telemetry::{Boundary, panic_message};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tracing::{error, info};

use crate::AppState;
use crate::error::{ApiError, PendingProblem};
use crate::problem::{ProblemScope, TRACE_HEADER, problem_response};

// ---------------------------------------------------------------------------
// Trace context
// ---------------------------------------------------------------------------

/// Trace id of the current request, available as an Axum extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// Inbound `X-Trace-ID`, or a generated one.
    pub trace_id: String,
}

/// Adopt the inbound `X-Trace-ID` (or generate one), expose it as a
/// [`TraceContext`] extension and echo it on the response.
pub async fn trace_context(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(new_trace_id, str::to_string);
    req.extensions_mut().insert(TraceContext {
        trace_id: trace_id.clone(),
    });

    let mut resp = next.run(req).await;
    if let Ok(v) = HeaderValue::from_str(&trace_id) {
        resp.headers_mut().insert(TRACE_HEADER, v);
    }
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Logs method, path, status code, duration and trace id for each request.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible handler function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let trace_id = req
            .extensions()
            .get::<TraceContext>()
            .map(|t| t.trace_id.clone())
            .unwrap_or_default();
        let start = Instant::now();

        let resp = next.run(req).await;

        info!(
            http.method = %method,
            http.path = %path,
            http.status = resp.status().as_u16(),
            http.duration_ms = start.elapsed().as_millis() as u64,
            trace_id = %trace_id,
            "request completed"
        );

        resp
    }
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// CORS layer for `origins`; permissive when the list is empty.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            TRACE_HEADER,
        ]))
        .expose_headers(ExposeHeaders::list([TRACE_HEADER, header::RETRY_AFTER]))
}

// ---------------------------------------------------------------------------
// Problem rendering
// ---------------------------------------------------------------------------

/// Render an [`ApiError`] left in the response extensions as a problem
/// document.
pub async fn render_problems(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let scope = ProblemScope::of(&req);
    let mut resp = next.run(req).await;

    let Some(pending) = resp.extensions_mut().remove::<PendingProblem>() else {
        return resp;
    };
    match pending.take() {
        Some(err) => {
            let err = err.resolve(&scope, state.sink.as_ref());
            problem_response(&err, &state.problem_base_url)
        }
        None => resp,
    }
}

// ---------------------------------------------------------------------------
// Panic guard
// ---------------------------------------------------------------------------

/// Contain a panic raised anywhere below this layer.
///
/// The panic is logged and reported to the sink, and the client receives a
/// generic `INTERNAL_ERROR` problem. The server keeps serving.
pub async fn recover_panics(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let scope = ProblemScope::of(&req);
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            error!(
                boundary = %Boundary::Http,
                route = %scope.route,
                trace_id = %scope.trace_id,
                panic = %panic_message(payload.as_ref()),
                "panic recovered"
            );
            state.sink.record_panic(Boundary::Http);
            let err = ApiError::from(AppError::internal(PANIC_DETAIL))
                .resolve(&scope, state.sink.as_ref());
            problem_response(&err, &state.problem_base_url)
        }
    }
}
