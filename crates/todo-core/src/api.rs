// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request and response messages for the task service.

use crate::task::Task;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use todo_error::{AppCode, FieldViolation};

/// Fields of [`Task`] a client may change through `UpdateTask`.
pub const UPDATABLE_PATHS: [&str; 6] = [
    "title",
    "description",
    "status",
    "priority",
    "due_date",
    "tags",
];

/// Explicit set of field paths a partial update may modify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FieldMask {
    /// Field paths, e.g. `["title", "tags"]`.
    pub paths: Vec<String>,
}

impl FieldMask {
    /// Mask over the given paths.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// `true` when no paths are listed.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths that are not in [`UPDATABLE_PATHS`], in mask order.
    pub fn unknown_paths(&self) -> Vec<&str> {
        self.paths
            .iter()
            .map(String::as_str)
            .filter(|p| !UPDATABLE_PATHS.contains(p))
            .collect()
    }

    /// Copy every masked field from `source` into `target`.
    ///
    /// Unknown paths are skipped; check [`unknown_paths`](Self::unknown_paths)
    /// first.
    pub fn apply(&self, target: &mut Task, source: &Task) {
        for path in &self.paths {
            match path.as_str() {
                "title" => target.title = source.title.clone(),
                "description" => target.description = source.description.clone(),
                "status" => target.status = source.status,
                "priority" => target.priority = source.priority,
                "due_date" => target.due_date = source.due_date,
                "tags" => target.tags = source.tags.clone(),
                _ => {}
            }
        }
    }
}

/// `CreateTask` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CreateTaskRequest {
    /// Task to create; required.
    pub task: Option<Task>,
}

impl CreateTaskRequest {
    /// Wrap `task`.
    pub fn new(task: Task) -> Self {
        Self { task: Some(task) }
    }
}

/// `GetTask` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GetTaskRequest {
    /// `tasks/{id}`.
    pub name: String,
}

/// `ListTasks` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ListTasksRequest {
    /// Page size; 0 selects the server default.
    pub page_size: i32,
    /// Opaque token from a previous response.
    pub page_token: String,
    /// `key=value AND key=value` over `status`, `priority`, `created_by`.
    pub filter: String,
    /// `title` (default), `create_time`, `-create_time` or `due_date`.
    pub order_by: String,
}

/// `ListTasks` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListTasksResponse {
    /// One page of tasks.
    pub tasks: Vec<Task>,
    /// Token for the next page; empty on the last page.
    pub next_page_token: String,
    /// Number of tasks matching the filter across all pages.
    pub total_size: i32,
}

/// `UpdateTask` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UpdateTaskRequest {
    /// Carries the name of the task and the new field values.
    pub task: Option<Task>,
    /// Fields to overwrite; required and non-empty.
    pub update_mask: Option<FieldMask>,
}

/// `DeleteTask` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DeleteTaskRequest {
    /// `tasks/{id}`.
    pub name: String,
}

/// `DeleteTask` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeleteTaskResponse {
    /// Confirmation message.
    pub message: String,
}

/// `BatchCreateTasks` request. Items may be `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BatchCreateTasksRequest {
    /// Individual create requests.
    pub requests: Vec<Option<CreateTaskRequest>>,
}

impl BatchCreateTasksRequest {
    /// Batch over `tasks`; `None` entries become `null` items.
    pub fn from_tasks<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = Option<Task>>,
    {
        Self {
            requests: tasks
                .into_iter()
                .map(|t| t.map(CreateTaskRequest::new))
                .collect(),
        }
    }
}

/// Why one batch item was not created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchFailure {
    /// Index of the item in the request.
    pub index: usize,
    /// Application code of the item error.
    pub code: AppCode,
    /// Error detail.
    pub message: String,
    /// Item violations, already prefixed with `requests[i].`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_violations: Vec<FieldViolation>,
}

/// `BatchCreateTasks` response: the successful subset plus failure metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchCreateTasksResponse {
    /// Created tasks, in request order.
    pub tasks: Vec<Task>,
    /// Number of items that were not created.
    pub failed_count: usize,
    /// One descriptor per failed item.
    pub failures: Vec<BatchFailure>,
}
