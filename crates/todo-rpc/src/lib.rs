// SPDX-License-Identifier: MIT OR Apache-2.0
//! RPC boundary of the Task API.
//!
//! - [`translate`] is the single interception point converting a
//!   [`HandlerError`] into a `tonic::Status` exactly once.
//! - [`guarded`] wraps every call so panics are contained and answered with
//!   a generic internal status.
//! - [`RpcServer`] implements [`TaskRpc`] over a
//!   [`TaskService`](todo_service::TaskService).
//! - [`LoopbackChannel`] is an in-process client that re-serializes statuses
//!   through gRPC trailers on every call.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod guard;
mod loopback;
mod server;
mod translate;

pub use guard::{PANIC_DETAIL, guarded};
pub use loopback::{LoopbackChannel, reserialize};
pub use server::{
    AUTHORIZATION, RpcServer, SERVICE_NAME, TRACE_ID, TaskRpc, methods, request_context,
    trace_id_from,
};
pub use translate::{HandlerError, UNEXPECTED_DETAIL, translate};
