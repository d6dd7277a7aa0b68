// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error model for the Task API.
//!
//! Every error raised by business logic is an [`AppError`]: a stable
//! [`AppCode`] (which fixes the coarse [`TransportCode`] and HTTP status),
//! a title, a human-readable detail, ordered [`FieldViolation`]s for
//! validation failures, correlation metadata and, for retryable codes only,
//! a [`RetryPolicy`] extension.
//!
//! The [`wire`] module projects an error onto a `tonic::Status` with typed
//! binary details and back again; the HTTP gateway renders the same value as
//! `application/problem+json`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod code;
mod error;
pub mod wire;

pub use code::{AppCode, ErrorGroup, TransportCode, UnknownCode};
pub use error::{
    AppError, Backoff, BackoffKind, FieldViolation, RETRY_EXTENSION, RetryPolicy,
};
pub use wire::{WireError, new_trace_id};
