// SPDX-License-Identifier: MIT OR Apache-2.0
//! The single point where handler errors become wire statuses.

use std::fmt;
use todo_error::AppError;
use todo_telemetry::{ErrorSink, observe};
use tracing::error;

/// Detail of the error synthesized for anything that is not an [`AppError`].
pub const UNEXPECTED_DETAIL: &str = "An unexpected error occurred";

/// Everything an RPC handler may fail with.
pub enum HandlerError {
    /// A categorized application error.
    App(AppError),
    /// A status produced elsewhere; forwarded unchanged.
    Status(tonic::Status),
    /// Anything else.
    Unexpected(anyhow::Error),
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<tonic::Status> for HandlerError {
    fn from(status: tonic::Status) -> Self {
        Self::Status(status)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected(err)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App(e) => f.debug_tuple("App").field(e).finish(),
            Self::Status(s) => f
                .debug_struct("Status")
                .field("code", &s.code())
                .field("message", &s.message())
                .finish(),
            Self::Unexpected(e) => f.debug_tuple("Unexpected").field(&format_args!("{e:#}")).finish(),
        }
    }
}

/// Convert a handler error into the status returned to the caller.
///
/// [`AppError`]s are reported to `sink` and converted with
/// [`AppError::to_wire_status`], which logs the internal cause and assigns a
/// trace id if none was set. Native statuses pass through untouched.
/// Anything else becomes an `INTERNAL_ERROR` carrying the original error as
/// its cause.
pub fn translate(method: &str, err: HandlerError, sink: &dyn ErrorSink) -> tonic::Status {
    match err {
        HandlerError::App(app) => {
            observe(sink, method, &app);
            app.to_wire_status()
        }
        HandlerError::Status(status) => {
            if let Ok(app) = AppError::from_status(&status) {
                observe(sink, method, &app);
            }
            status
        }
        HandlerError::Unexpected(cause) => {
            error!(method, "unexpected handler error");
            let app = AppError::internal(UNEXPECTED_DETAIL).with_cause(cause);
            observe(sink, method, &app);
            app.to_wire_status()
        }
    }
}
