// SPDX-License-Identifier: MIT OR Apache-2.0
//! The task entity.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource-name prefix for tasks (`tasks/{id}`).
pub const TASK_NAME_PREFIX: &str = "tasks/";

/// Lifecycle state of a task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not set; replaced by [`TaskStatus::Pending`] on create.
    #[default]
    Unspecified,
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl TaskStatus {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    /// Accepts both `COMPLETED` and `STATUS_COMPLETED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix("STATUS_").unwrap_or(s);
        [
            Self::Unspecified,
            Self::Pending,
            Self::InProgress,
            Self::Completed,
            Self::Cancelled,
        ]
        .into_iter()
        .find(|v| v.as_str() == bare)
        .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Task priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Not set; replaced by [`Priority::Medium`] on create.
    #[default]
    Unspecified,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
}

impl Priority {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    /// Accepts both `HIGH` and `PRIORITY_HIGH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix("PRIORITY_").unwrap_or(s);
        [
            Self::Unspecified,
            Self::Low,
            Self::Medium,
            Self::High,
            Self::Critical,
        ]
        .into_iter()
        .find(|v| v.as_str() == bare)
        .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Returned when parsing an unknown enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

/// A unit of work owned by a principal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Task {
    /// Resource name, `tasks/{id}`. Assigned by the server.
    pub name: String,
    /// Short title; unique across tasks.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Priority.
    pub priority: Priority,
    /// Optional deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Lowercase labels.
    pub tags: Vec<String>,
    /// Set by the server on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    /// Set by the server on every write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    /// Principal that created the task.
    pub created_by: String,
}

impl Task {
    /// Convenience constructor for a task with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// The id part of [`name`](Self::name), if well formed.
    pub fn id(&self) -> Option<&str> {
        task_id(&self.name)
    }
}

/// Extract `{id}` from `tasks/{id}`.
///
/// Returns `None` unless `name` has exactly two non-empty segments and the
/// first is `tasks`.
pub fn task_id(name: &str) -> Option<&str> {
    let id = name.strip_prefix(TASK_NAME_PREFIX)?;
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

/// Build `tasks/{id}`.
pub fn task_name(id: &str) -> String {
    format!("{TASK_NAME_PREFIX}{id}")
}
