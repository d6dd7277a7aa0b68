// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task service for the Task API.
//!
//! [`TaskService`] holds the business logic behind every RPC. It validates
//! with an injected [`Validator`](todo_validate::Validator), persists through
//! a [`Store`], and maps every [`StoreError`] onto an
//! [`AppError`](todo_error::AppError) at its boundary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod query;
mod service;
mod store;

pub use query::{QueryError, TaskFilter, TaskOrder};
pub use service::{
    ALL_BATCH_FAILED, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, STORE_UNAVAILABLE, TaskService,
    UNEXPECTED_FAILURE,
};
pub use store::{InMemoryStore, ListQuery, Store, StoreError, TaskPage};
