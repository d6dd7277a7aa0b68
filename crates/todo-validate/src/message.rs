// SPDX-License-Identifier: MIT OR Apache-2.0
//! Field access for validated messages.

use chrono::{DateTime, Utc};
use todo_core::{DeleteTaskRequest, GetTaskRequest, ListTasksRequest, Task};

/// Message name of [`Task`].
pub const TASK: &str = "todo.v1.Task";
/// Message name of [`GetTaskRequest`].
pub const GET_TASK_REQUEST: &str = "todo.v1.GetTaskRequest";
/// Message name of [`DeleteTaskRequest`].
pub const DELETE_TASK_REQUEST: &str = "todo.v1.DeleteTaskRequest";
/// Message name of [`ListTasksRequest`].
pub const LIST_TASKS_REQUEST: &str = "todo.v1.ListTasksRequest";

/// The value of one field as seen by the rules.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// Field is not set (or not known to the message).
    Absent,
    /// String field.
    Text(&'a str),
    /// Integer field.
    Int(i64),
    /// Timestamp field.
    Time(DateTime<Utc>),
    /// Repeated string field.
    List(&'a [String]),
}

impl FieldValue<'_> {
    /// `true` when the value counts as "not provided".
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(s) => s.is_empty(),
            Self::Int(n) => *n == 0,
            Self::Time(_) => false,
            Self::List(items) => items.is_empty(),
        }
    }
}

/// A message the validator can check against a [`ConstraintSet`](crate::ConstraintSet).
pub trait Validatable {
    /// Fully-qualified message name the constraint set is keyed by.
    const MESSAGE: &'static str;

    /// Look up a field by path.
    fn field(&self, path: &str) -> FieldValue<'_>;
}

impl Validatable for Task {
    const MESSAGE: &'static str = TASK;

    fn field(&self, path: &str) -> FieldValue<'_> {
        match path {
            "name" => FieldValue::Text(&self.name),
            "title" => FieldValue::Text(&self.title),
            "description" => FieldValue::Text(&self.description),
            "due_date" => self.due_date.map_or(FieldValue::Absent, FieldValue::Time),
            "tags" => FieldValue::List(&self.tags),
            "created_by" => FieldValue::Text(&self.created_by),
            _ => FieldValue::Absent,
        }
    }
}

impl Validatable for GetTaskRequest {
    const MESSAGE: &'static str = GET_TASK_REQUEST;

    fn field(&self, path: &str) -> FieldValue<'_> {
        match path {
            "name" => FieldValue::Text(&self.name),
            _ => FieldValue::Absent,
        }
    }
}

impl Validatable for DeleteTaskRequest {
    const MESSAGE: &'static str = DELETE_TASK_REQUEST;

    fn field(&self, path: &str) -> FieldValue<'_> {
        match path {
            "name" => FieldValue::Text(&self.name),
            _ => FieldValue::Absent,
        }
    }
}

impl Validatable for ListTasksRequest {
    const MESSAGE: &'static str = LIST_TASKS_REQUEST;

    fn field(&self, path: &str) -> FieldValue<'_> {
        match path {
            "page_size" => FieldValue::Int(i64::from(self.page_size)),
            "page_token" => FieldValue::Text(&self.page_token),
            "filter" => FieldValue::Text(&self.filter),
            "order_by" => FieldValue::Text(&self.order_by),
            _ => FieldValue::Absent,
        }
    }
}
