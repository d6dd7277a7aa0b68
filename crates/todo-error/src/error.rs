// SPDX-License-Identifier: MIT OR Apache-2.0
//! The canonical [`AppError`] value and its typed constructors.

use crate::code::{AppCode, ErrorGroup, TransportCode};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Extension key under which a [`RetryPolicy`] is stored.
pub const RETRY_EXTENSION: &str = "retry";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// FieldViolation
// ---------------------------------------------------------------------------

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldViolation {
    /// Dotted / indexed field path, e.g. `requests[2].task.title`.
    pub field: String,
    /// Field-level code such as [`AppCode::TooLong`].
    pub code: AppCode,
    /// Human-readable explanation.
    pub description: String,
}

impl FieldViolation {
    /// Create a new violation.
    pub fn new(field: impl Into<String>, code: AppCode, description: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            description: description.into(),
        }
    }

    /// Copy of this violation with `prefix` prepended to its field path.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            field: format!("{prefix}{}", self.field),
            code: self.code,
            description: self.description.clone(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.code, self.description)
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Backoff strategy suggested to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay between attempts.
    Fixed,
    /// Delay doubles after each attempt.
    Exponential,
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Strategy.
    pub kind: BackoffKind,
    /// Base interval in milliseconds.
    pub interval_ms: u64,
}

/// Advisory retry guidance attached to retryable errors.
///
/// The server never retries on the client's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Always `true` for policies attached to an error.
    pub retryable: bool,
    /// Seconds the client should wait before the first retry.
    pub retry_after_seconds: u64,
    /// Upper bound on retries.
    pub max_retries: u32,
    /// Backoff between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Exponential backoff starting at `retry_after_seconds`.
    pub fn exponential(retry_after_seconds: u64, max_retries: u32) -> Self {
        Self {
            retryable: true,
            retry_after_seconds,
            max_retries,
            backoff: Backoff {
                kind: BackoffKind::Exponential,
                interval_ms: retry_after_seconds.saturating_mul(1000),
            },
        }
    }

    /// Fixed backoff of `retry_after_seconds`.
    pub fn fixed(retry_after_seconds: u64, max_retries: u32) -> Self {
        Self {
            retryable: true,
            retry_after_seconds,
            max_retries,
            backoff: Backoff {
                kind: BackoffKind::Fixed,
                interval_ms: retry_after_seconds.saturating_mul(1000),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, 3)
    }
}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// The canonical error value.
///
/// Constructed once at the raising site through one of the typed
/// constructors, each of which fixes the [`AppCode`] and therefore the
/// [`TransportCode`]. The optional internal cause is kept for server-side
/// logging and never leaves the process.
///
/// ```
/// use todo_error::{AppCode, AppError, TransportCode};
///
/// let err = AppError::not_found("Task", "zz").with_trace_id("abc");
/// assert_eq!(err.code(), AppCode::ResourceNotFound);
/// assert_eq!(err.transport_code(), TransportCode::NotFound);
/// assert!(err.detail().contains("zz"));
/// ```
pub struct AppError {
    pub(crate) code: AppCode,
    pub(crate) title: String,
    pub(crate) detail: String,
    pub(crate) field_violations: Vec<FieldViolation>,
    pub(crate) trace_id: Option<String>,
    pub(crate) instance: Option<String>,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) extensions: BTreeMap<String, serde_json::Value>,
    pub(crate) cause: Option<BoxError>,
}

fn validation_detail(count: usize) -> String {
    if count == 1 {
        "The request contains 1 validation error".to_string()
    } else {
        format!("The request contains {count} validation errors")
    }
}

impl AppError {
    fn new(code: AppCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            title: code.title().to_string(),
            detail: detail.into(),
            field_violations: Vec::new(),
            trace_id: None,
            instance: None,
            timestamp: Utc::now(),
            extensions: BTreeMap::new(),
            cause: None,
        }
    }

    // -- constructors -------------------------------------------------------

    /// Bundle `violations` into a single validation error.
    ///
    /// An empty list is replaced by one request-level violation so the
    /// "violations present iff validation code" invariant holds.
    pub fn validation_failed(violations: Vec<FieldViolation>) -> Self {
        let violations = if violations.is_empty() {
            vec![FieldViolation::new(
                "request",
                AppCode::InvalidValue,
                "request is invalid",
            )]
        } else {
            violations
        };
        let mut err = Self::new(AppCode::ValidationFailed, validation_detail(violations.len()));
        err.field_violations = violations;
        err
    }

    /// `Some(validation_failed(..))` when `violations` is non-empty.
    pub fn from_violations(violations: Vec<FieldViolation>) -> Option<Self> {
        if violations.is_empty() {
            None
        } else {
            Some(Self::validation_failed(violations))
        }
    }

    /// Single-violation validation error for a missing field.
    pub fn required_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::validation_failed(vec![FieldViolation::new(
            field,
            AppCode::RequiredField,
            message,
        )])
    }

    /// The resource `kind` with identifier `id` does not exist.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(
            AppCode::ResourceNotFound,
            format!("{kind} with ID '{id}' was not found."),
        )
    }

    /// Creating `kind` conflicts with existing state.
    pub fn conflict(kind: &str, reason: &str) -> Self {
        Self::new(
            AppCode::ResourceConflict,
            format!("Conflict creating {kind}: {reason}"),
        )
    }

    /// The caller may not perform `action` on `kind`.
    pub fn permission_denied(kind: &str, action: &str) -> Self {
        Self::new(
            AppCode::PermissionDenied,
            format!("You don't have permission to {action} {kind}"),
        )
    }

    /// The caller could not be authenticated.
    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::new(AppCode::AuthenticationFailed, reason)
    }

    /// The caller exceeded a rate limit; retry after `retry_after_seconds`.
    pub fn rate_limit_exceeded(retry_after_seconds: u64) -> Self {
        Self::new(
            AppCode::RateLimitExceeded,
            format!("Rate limit exceeded, retry after {retry_after_seconds} seconds"),
        )
        .with_retry_policy(RetryPolicy::fixed(retry_after_seconds, 1))
    }

    /// A dependency is temporarily unavailable. Carries the default retry policy.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(AppCode::ServiceUnavailable, message).with_retry_policy(RetryPolicy::default())
    }

    /// Unexpected internal failure. Attach the underlying error with
    /// [`with_cause`](Self::with_cause).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppCode::InternalError, message)
    }

    // -- builders -----------------------------------------------------------

    /// Attach the internal cause. Logged at translation time only.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Set the correlation id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set the request path this error belongs to.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Attach retry guidance. Ignored for non-retryable codes.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        if !self.code.is_retryable() {
            tracing::warn!(
                error.code = %self.code,
                "retry policy ignored on non-retryable error"
            );
            return self;
        }
        if let Ok(value) = serde_json::to_value(policy) {
            self.extensions.insert(RETRY_EXTENSION.to_string(), value);
        }
        self
    }

    // -- accessors ----------------------------------------------------------

    /// Application code.
    pub fn code(&self) -> AppCode {
        self.code
    }

    /// Transport category, derived from [`code`](Self::code).
    pub fn transport_code(&self) -> TransportCode {
        self.code.transport_code()
    }

    /// HTTP status, derived from [`transport_code`](Self::transport_code).
    pub fn http_status(&self) -> u16 {
        self.transport_code().http_status()
    }

    /// Shorthand for `self.code().group()`.
    pub fn group(&self) -> ErrorGroup {
        self.code.group()
    }

    /// Short category label.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Human-readable explanation.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Ordered field violations; empty unless this is a validation error.
    pub fn field_violations(&self) -> &[FieldViolation] {
        &self.field_violations
    }

    /// Correlation id, if one has been set.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Request path, if one has been set.
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Time the error was raised.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Auxiliary structured data; only populated on retryable codes.
    pub fn extensions(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extensions
    }

    /// The attached retry policy, if any.
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.extensions
            .get(RETRY_EXTENSION)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// `true` when an internal cause is attached.
    pub fn has_cause(&self) -> bool {
        self.cause.is_some()
    }

    /// Violations re-rooted under `prefix`, e.g. `requests[2].task.`.
    ///
    /// Used when aggregating item errors into a batch result; `self` is left
    /// untouched.
    pub fn nested_violations(&self, prefix: &str) -> Vec<FieldViolation> {
        self.field_violations
            .iter()
            .map(|v| v.prefixed(prefix))
            .collect()
    }

    /// Write the internal cause (if any) to the server log.
    ///
    /// Called by the transport translators when the error is converted to
    /// its wire form; callers rendering an error themselves must call it
    /// exactly once.
    pub fn log_cause(&self) {
        if let Some(cause) = &self.cause {
            tracing::error!(
                error.code = %self.code,
                trace_id = self.trace_id.as_deref().unwrap_or(""),
                cause = %cause,
                "{}",
                self.title
            );
        }
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("AppError");
        d.field("code", &self.code);
        d.field("transport_code", &self.transport_code());
        d.field("detail", &self.detail);
        if !self.field_violations.is_empty() {
            d.field("field_violations", &self.field_violations);
        }
        if let Some(ref trace_id) = self.trace_id {
            d.field("trace_id", trace_id);
        }
        if let Some(ref cause) = self.cause {
            d.field("cause", &cause.to_string());
        }
        d.finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.as_str(), self.title, self.detail)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_detail_counts_violations() {
        let err = AppError::validation_failed(vec![
            FieldViolation::new("title", AppCode::RequiredField, "title is required"),
            FieldViolation::new("description", AppCode::TooLong, "too long"),
        ]);
        assert_eq!(err.code(), AppCode::ValidationFailed);
        assert_eq!(err.detail(), "The request contains 2 validation errors");
        assert_eq!(err.field_violations().len(), 2);
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn empty_violation_list_still_has_a_violation() {
        let err = AppError::validation_failed(Vec::new());
        assert_eq!(err.field_violations().len(), 1);
        assert!(AppError::from_violations(Vec::new()).is_none());
    }

    #[test]
    fn required_field_is_single_violation() {
        let err = AppError::required_field("task", "task is required");
        assert_eq!(err.code(), AppCode::ValidationFailed);
        assert_eq!(err.field_violations()[0].code, AppCode::RequiredField);
        assert_eq!(err.field_violations()[0].field, "task");
        assert_eq!(err.detail(), "The request contains 1 validation error");
    }

    #[test]
    fn single_violation_detail_matches_required_field() {
        let bundled = AppError::validation_failed(vec![FieldViolation::new(
            "task",
            AppCode::RequiredField,
            "task is required",
        )]);
        let required = AppError::required_field("task", "task is required");
        assert_eq!(bundled.detail(), required.detail());
    }

    #[test]
    fn constructor_details() {
        assert_eq!(
            AppError::not_found("Task", "zz").detail(),
            "Task with ID 'zz' was not found."
        );
        assert_eq!(
            AppError::conflict("task", "title already exists").detail(),
            "Conflict creating task: title already exists"
        );
        assert_eq!(
            AppError::permission_denied("task", "delete").detail(),
            "You don't have permission to delete task"
        );
    }

    #[test]
    fn only_retryable_codes_keep_extensions() {
        let err = AppError::service_unavailable("store down");
        assert_eq!(err.retry_policy(), Some(RetryPolicy::default()));

        let err = AppError::not_found("Task", "1").with_retry_policy(RetryPolicy::default());
        assert!(err.extensions().is_empty());

        let err = AppError::rate_limit_exceeded(7);
        assert_eq!(err.retry_policy().unwrap().retry_after_seconds, 7);
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn non_validation_errors_have_no_violations() {
        for err in [
            AppError::not_found("Task", "1"),
            AppError::conflict("task", "x"),
            AppError::permission_denied("task", "read"),
            AppError::authentication_failed("missing token"),
            AppError::service_unavailable("down"),
            AppError::internal("boom"),
        ] {
            assert!(err.field_violations().is_empty());
            assert!(!err.code().is_validation());
        }
    }

    #[test]
    fn nested_violations_prefix_paths() {
        let err = AppError::required_field("title", "title is required");
        let nested = err.nested_violations("requests[2].task.");
        assert_eq!(nested[0].field, "requests[2].task.title");
        assert_eq!(err.field_violations()[0].field, "title");
    }

    #[test]
    fn cause_is_source_but_not_displayed() {
        let io = std::io::Error::other("disk on fire");
        let err = AppError::internal("An unexpected error occurred").with_cause(io);
        assert!(err.has_cause());
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.to_string().contains("disk on fire"));
    }

    #[test]
    fn display_format() {
        let err = AppError::not_found("Task", "zz");
        assert_eq!(
            err.to_string(),
            "[RESOURCE_NOT_FOUND] Resource Not Found: Task with ID 'zz' was not found."
        );
    }
}
