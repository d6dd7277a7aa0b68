// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP gateway of the Task API.
//!
//! Maps REST routes onto the RPC surface and renders every failure as an
//! RFC 7807 problem document (`application/problem+json`).
//!
//! - Proxied path: the RPC status is decoded back into an
//!   [`AppError`](todo_error::AppError) and re-stamped with the HTTP
//!   request's trace id and path.
//! - Direct path: errors raised in the gateway itself (validate routes,
//!   malformed bodies, unknown routes) are rendered without an RPC hop.
//! - Panics below the [`recover_panics`](middleware::recover_panics) layer
//!   become a generic internal problem.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod middleware;
pub mod problem;
mod routes;

use anyhow::Context as _;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::fmt;
use std::sync::Arc;
use todo_config::ServerConfig;
use todo_rpc::{LoopbackChannel, RpcServer, TaskRpc};
use todo_service::{Store, TaskService};
use todo_telemetry::{ErrorCounters, ErrorSink, FanoutSink, TracingSink};
use todo_validate::{ConstraintFile, Validator};

pub use error::{ApiError, PendingProblem};
pub use middleware::{RequestLogger, TraceContext, cors_layer};
pub use problem::{
    PROBLEM_JSON, ProblemDetails, ProblemFieldError, ProblemScope, TRACE_HEADER, problem_response,
};
pub use routes::CallContext;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared state of the gateway.
pub struct AppState {
    /// Client of the RPC surface.
    pub rpc: Arc<dyn TaskRpc>,
    /// Validator used by the direct-path validate routes.
    pub validator: Arc<Validator>,
    /// Receives every error and contained panic.
    pub sink: Arc<dyn ErrorSink>,
    /// In-memory counters exposed by `GET /metrics`.
    pub counters: ErrorCounters,
    /// Base of problem `type` URLs.
    pub problem_base_url: String,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("problem_base_url", &self.problem_base_url)
            .field("cors_origins", &self.cors_origins)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the whole stack in one process: `store` behind a
    /// [`TaskService`], served by an [`RpcServer`] and reached through a
    /// [`LoopbackChannel`].
    ///
    /// Both boundaries report to the same sink, which logs through
    /// [`TracingSink`] and counts into [`counters`](Self::counters).
    pub fn in_process(config: &ServerConfig, validator: Validator, store: Arc<dyn Store>) -> Self {
        let validator = Arc::new(validator);
        let counters = ErrorCounters::new();
        let sink: Arc<dyn ErrorSink> = Arc::new(
            FanoutSink::new()
                .with(Arc::new(TracingSink))
                .with(Arc::new(counters.clone())),
        );

        let service = TaskService::new(store, Arc::clone(&validator))
            .with_page_sizes(config.default_page_size, config.max_page_size);
        let server = RpcServer::new(service, Arc::clone(&sink));

        Self {
            rpc: Arc::new(LoopbackChannel::new(Arc::new(server))),
            validator,
            sink,
            counters,
            problem_base_url: config.problem_base_url.clone(),
            cors_origins: config.cors_origins.clone(),
        }
    }
}

/// Build the validator for `config`.
///
/// Sets from `constraints_file` replace the built-in set for the same
/// message; messages the file does not mention keep their built-in rules.
pub fn build_validator(config: &ServerConfig) -> anyhow::Result<Validator> {
    let validator = Validator::standard().context("build standard constraints")?;
    let Some(path) = &config.constraints_file else {
        return Ok(validator);
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read constraints file {}", path.display()))?;
    let file = ConstraintFile::from_toml(&content)
        .with_context(|| format!("parse constraints file {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        sets = file.sets.len(),
        "loaded constraint sets"
    );
    file.sets
        .into_iter()
        .try_fold(validator, Validator::with_schema)
        .context("install constraint sets")
}

/// Build the Axum router with all gateway routes and middleware.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route(
            "/v1/tasks",
            post(routes::create_task).get(routes::list_tasks),
        )
        .route("/v1/tasks/batch", post(routes::batch_create_tasks))
        .route("/v1/tasks/validate", post(routes::validate_task))
        .route("/v1/tasks/batch/validate", post(routes::validate_batch))
        .route(
            "/v1/tasks/{id}",
            get(routes::get_task)
                .patch(routes::update_task)
                .delete(routes::delete_task),
        )
        .fallback(routes::route_not_found)
        .method_not_allowed_fallback(routes::method_not_allowed)
        .layer(from_fn_with_state(
            Arc::clone(&state),
            middleware::render_problems,
        ))
        .layer(from_fn_with_state(
            Arc::clone(&state),
            middleware::recover_panics,
        ))
        .layer(cors)
        .layer(from_fn(RequestLogger::layer))
        .layer(from_fn(middleware::trace_context))
        .with_state(state)
}
