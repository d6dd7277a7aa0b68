// SPDX-License-Identifier: MIT OR Apache-2.0
//! Panic containment at the RPC boundary.

use crate::translate::{HandlerError, translate};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use todo_error::AppError;
use todo_telemetry::{Boundary, ErrorSink, panic_message};
use tracing::error;

/// Detail of the error returned when a handler panicked.
pub const PANIC_DETAIL: &str = "An unexpected error occurred. Please try again later.";

/// Run one handler call, translating its error and containing any panic.
///
/// A panic is logged, reported to `sink` and answered with a generic
/// `INTERNAL_ERROR` status; it never propagates to the caller.
pub async fn guarded<T, F>(
    method: &str,
    trace_id: &str,
    sink: &dyn ErrorSink,
    handler: F,
) -> Result<T, tonic::Status>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(translate(method, err, sink)),
        Err(payload) => {
            error!(
                boundary = %Boundary::Rpc,
                method,
                trace_id,
                panic = %panic_message(payload.as_ref()),
                "panic recovered"
            );
            sink.record_panic(Boundary::Rpc);
            let mut err = AppError::internal(PANIC_DETAIL);
            if !trace_id.is_empty() {
                err = err.with_trace_id(trace_id);
            }
            Err(translate(method, err.into(), sink))
        }
    }
}
