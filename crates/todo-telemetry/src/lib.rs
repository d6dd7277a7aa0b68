// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observability hooks called by the error-translation core.
//!
//! The core only calls the three [`ErrorSink`] hooks; what they do is up to
//! the implementation. [`TracingSink`] logs, [`ErrorCounters`] keeps
//! in-memory totals for the `/metrics` endpoint, and [`FanoutSink`]
//! forwards to several sinks at once.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use todo_error::{AppCode, AppError};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

/// Transport boundary a panic was contained at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// RPC server.
    Rpc,
    /// HTTP gateway.
    Http,
}

impl Boundary {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// ErrorSink
// ---------------------------------------------------------------------------

/// Hooks called whenever an error is produced or a panic is contained.
pub trait ErrorSink: Send + Sync {
    /// One error returned from `method`.
    fn increment_error(&self, method: &str, code: AppCode, http_status: u16);

    /// One field violation returned from `method`.
    fn record_validation_error(&self, method: &str, field: &str, code: AppCode);

    /// One panic contained at `boundary`.
    fn record_panic(&self, boundary: Boundary);
}

/// Report `err` to `sink`: one error count plus one entry per violation.
pub fn observe(sink: &dyn ErrorSink, method: &str, err: &AppError) {
    sink.increment_error(method, err.code(), err.http_status());
    for v in err.field_violations() {
        sink.record_validation_error(method, &v.field, v.code);
    }
}

/// Sink that writes every hook call to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn increment_error(&self, method: &str, code: AppCode, http_status: u16) {
        info!(
            method,
            error.code = %code,
            http.status = http_status,
            "request_error"
        );
    }

    fn record_validation_error(&self, method: &str, field: &str, code: AppCode) {
        info!(method, field, error.code = %code, "validation_error");
    }

    fn record_panic(&self, boundary: Boundary) {
        warn!(boundary = %boundary, "panic_recovered");
    }
}

// ---------------------------------------------------------------------------
// ErrorCounters
// ---------------------------------------------------------------------------

/// Point-in-time copy of [`ErrorCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    /// Total errors across all methods.
    pub total_errors: u64,
    /// Errors keyed by `method` then code.
    pub errors: BTreeMap<String, BTreeMap<AppCode, u64>>,
    /// Errors keyed by HTTP status.
    pub by_status: BTreeMap<u16, u64>,
    /// Field violations keyed by [`field_pattern`] then code.
    pub validation: BTreeMap<String, BTreeMap<AppCode, u64>>,
    /// Contained panics keyed by boundary.
    pub panics: BTreeMap<Boundary, u64>,
}

impl ErrorSnapshot {
    /// Errors with `code` across all methods.
    pub fn count_for(&self, code: AppCode) -> u64 {
        self.errors
            .values()
            .filter_map(|by_code| by_code.get(&code))
            .sum()
    }

    /// Panics contained at `boundary`.
    pub fn panics_at(&self, boundary: Boundary) -> u64 {
        self.panics.get(&boundary).copied().unwrap_or(0)
    }
}

/// Field path with list indices dropped: `requests[3].task.tags[0]` becomes
/// `requests[].task.tags[]`.
///
/// Indices come from the client, so counters key on the pattern to keep the
/// key set bounded by the schema.
pub fn field_pattern(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut in_index = false;
    for c in field.chars() {
        match c {
            '[' => {
                in_index = true;
                out.push(c);
            }
            ']' => {
                in_index = false;
                out.push(c);
            }
            _ if in_index && c.is_ascii_digit() => {}
            _ => out.push(c),
        }
    }
    out
}

/// Thread-safe in-memory error counters.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounters {
    inner: Arc<Mutex<ErrorSnapshot>>,
}

impl ErrorCounters {
    /// Create a new, empty set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut ErrorSnapshot) -> R) -> R {
        let mut data = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data)
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> ErrorSnapshot {
        self.with(|s| s.clone())
    }

    /// Reset every counter.
    pub fn clear(&self) {
        self.with(|s| *s = ErrorSnapshot::default());
    }
}

impl ErrorSink for ErrorCounters {
    fn increment_error(&self, method: &str, code: AppCode, http_status: u16) {
        self.with(|s| {
            s.total_errors += 1;
            *s.errors
                .entry(method.to_string())
                .or_default()
                .entry(code)
                .or_insert(0) += 1;
            *s.by_status.entry(http_status).or_insert(0) += 1;
        });
    }

    fn record_validation_error(&self, _method: &str, field: &str, code: AppCode) {
        let key = field_pattern(field);
        self.with(|s| {
            *s.validation
                .entry(key)
                .or_default()
                .entry(code)
                .or_insert(0) += 1;
        });
    }

    fn record_panic(&self, boundary: Boundary) {
        self.with(|s| *s.panics.entry(boundary).or_insert(0) += 1);
    }
}

// ---------------------------------------------------------------------------
// FanoutSink
// ---------------------------------------------------------------------------

/// Forwards every hook to each wrapped sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ErrorSink>>,
}

impl FanoutSink {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl ErrorSink for FanoutSink {
    fn increment_error(&self, method: &str, code: AppCode, http_status: u16) {
        for s in &self.sinks {
            s.increment_error(method, code, http_status);
        }
    }

    fn record_validation_error(&self, method: &str, field: &str, code: AppCode) {
        for s in &self.sinks {
            s.record_validation_error(method, field, code);
        }
    }

    fn record_panic(&self, boundary: Boundary) {
        for s in &self.sinks {
            s.record_panic(boundary);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
