// SPDX-License-Identifier: MIT OR Apache-2.0
//! `ListTasks` filter and ordering.

use std::cmp::Ordering;
use std::str::FromStr;
use todo_core::{Priority, Task, TaskStatus};

/// Why a filter or ordering expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A clause is not of the form `key=value`.
    #[error("invalid filter expression: {0}")]
    Expression(String),
    /// The key is not filterable.
    #[error("unknown filter field: {0}")]
    UnknownField(String),
    /// The value does not name a variant of the field's enum.
    #[error("invalid value '{value}' for {field}")]
    InvalidValue {
        /// Filter key.
        field: String,
        /// Rejected value.
        value: String,
    },
    /// `order_by` is not one of the supported orderings.
    #[error("unsupported order_by '{0}'")]
    UnknownOrder(String),
}

/// Parsed `key=value AND key=value` filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Match on status.
    pub status: Option<TaskStatus>,
    /// Match on priority.
    pub priority: Option<Priority>,
    /// Match on creator.
    pub created_by: Option<String>,
}

impl TaskFilter {
    /// `true` when `task` satisfies every clause.
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.priority.is_none_or(|p| task.priority == p)
            && self
                .created_by
                .as_deref()
                .is_none_or(|c| task.created_by == c)
    }
}

impl FromStr for TaskFilter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filter = TaskFilter::default();
        if s.trim().is_empty() {
            return Ok(filter);
        }
        for clause in s.split(" AND ") {
            let Some((key, value)) = clause.trim().split_once('=') else {
                return Err(QueryError::Expression(clause.trim().to_string()));
            };
            let key = key.trim();
            let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
            if value.contains('=') {
                return Err(QueryError::Expression(clause.trim().to_string()));
            }
            let invalid = || QueryError::InvalidValue {
                field: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "status" => filter.status = Some(value.parse().map_err(|_| invalid())?),
                "priority" => filter.priority = Some(value.parse().map_err(|_| invalid())?),
                "created_by" => filter.created_by = Some(value.to_string()),
                other => return Err(QueryError::UnknownField(other.to_string())),
            }
        }
        Ok(filter)
    }
}

/// Result ordering for `ListTasks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    /// Alphabetical by title.
    #[default]
    Title,
    /// Oldest first.
    CreateTime,
    /// Newest first.
    CreateTimeDesc,
    /// Earliest deadline first; tasks without one last.
    DueDate,
}

impl TaskOrder {
    /// Compare two tasks. Ties are broken by name so paging is stable.
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let primary = match self {
            Self::Title => a.title.cmp(&b.title),
            Self::CreateTime => a.create_time.cmp(&b.create_time),
            Self::CreateTimeDesc => b.create_time.cmp(&a.create_time),
            Self::DueDate => match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.name.cmp(&b.name))
    }
}

impl FromStr for TaskOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "title" => Ok(Self::Title),
            "create_time" => Ok(Self::CreateTime),
            "-create_time" => Ok(Self::CreateTimeDesc),
            "due_date" => Ok(Self::DueDate),
            other => Err(QueryError::UnknownOrder(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let f: TaskFilter = "".parse().unwrap();
        assert_eq!(f, TaskFilter::default());
        assert!(f.matches(&Task::titled("x")));
    }

    #[test]
    fn conjunction_of_clauses() {
        let f: TaskFilter = "status=COMPLETED AND priority='HIGH' AND created_by=alice"
            .parse()
            .unwrap();
        assert_eq!(f.status, Some(TaskStatus::Completed));
        assert_eq!(f.priority, Some(Priority::High));
        assert_eq!(f.created_by.as_deref(), Some("alice"));

        let mut task = Task::titled("x");
        task.status = TaskStatus::Completed;
        task.priority = Priority::High;
        task.created_by = "alice".into();
        assert!(f.matches(&task));
        task.created_by = "bob".into();
        assert!(!f.matches(&task));
    }

    #[test]
    fn rejected_filters() {
        assert!(matches!(
            "status".parse::<TaskFilter>(),
            Err(QueryError::Expression(_))
        ));
        assert!(matches!(
            "owner=me".parse::<TaskFilter>(),
            Err(QueryError::UnknownField(f)) if f == "owner"
        ));
        assert!(matches!(
            "status=SLEEPING".parse::<TaskFilter>(),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn due_date_order_puts_missing_last() {
        let mut a = Task::titled("a");
        a.due_date = Some(chrono::Utc::now());
        let b = Task::titled("b");
        assert_eq!(TaskOrder::DueDate.compare(&a, &b), Ordering::Less);
        assert_eq!(TaskOrder::DueDate.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn order_parsing() {
        assert_eq!("".parse::<TaskOrder>().unwrap(), TaskOrder::Title);
        assert_eq!(
            "-create_time".parse::<TaskOrder>().unwrap(),
            TaskOrder::CreateTimeDesc
        );
        assert!("priority".parse::<TaskOrder>().is_err());
    }
}
