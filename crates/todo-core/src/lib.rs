// SPDX-License-Identifier: MIT OR Apache-2.0
//! todo-core
//!
//! The task entity, the request/response messages of the task service and
//! the per-request [`RequestContext`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod context;
mod task;

pub use api::{
    BatchCreateTasksRequest, BatchCreateTasksResponse, BatchFailure, CreateTaskRequest,
    DeleteTaskRequest, DeleteTaskResponse, FieldMask, GetTaskRequest, ListTasksRequest,
    ListTasksResponse, UPDATABLE_PATHS, UpdateTaskRequest,
};
pub use context::{ADMIN, ANONYMOUS, RequestContext};
pub use task::{Priority, TASK_NAME_PREFIX, Task, TaskStatus, UnknownVariant, task_id, task_name};
