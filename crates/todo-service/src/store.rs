// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task storage collaborator.

use crate::query::{TaskFilter, TaskOrder};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use todo_core::{ADMIN, Task, task_id};
use tokio::sync::RwLock;

/// Every outcome a store call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No task with this id.
    #[error("task not found: {0}")]
    NotFound(String),
    /// The id or the title is already taken.
    #[error("task already exists: {0}")]
    AlreadyExists(String),
    /// The backing store could not be reached.
    #[error("store connection failed: {0}")]
    ConnectionFailure(String),
}

/// One `ListTasks` query as seen by the store.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Clauses every returned task satisfies.
    pub filter: TaskFilter,
    /// Result ordering.
    pub order: TaskOrder,
    /// Maximum tasks in the page.
    pub page_size: usize,
    /// Id of the last task of the previous page; empty for the first page.
    pub page_token: String,
    /// Caller; non-admin callers only see their own tasks.
    pub principal: String,
}

/// One page of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    /// Tasks in the page.
    pub tasks: Vec<Task>,
    /// Token for the next page; empty on the last page.
    pub next_page_token: String,
    /// Tasks matching the query across all pages.
    pub total_size: usize,
}

/// Persistence for tasks, keyed by id with a unique title index.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new task. Fails with `AlreadyExists` on an id or title clash.
    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    /// Fetch by id.
    async fn get(&self, id: &str) -> Result<Task, StoreError>;

    /// Fetch by exact title.
    async fn find_by_title(&self, title: &str) -> Result<Option<Task>, StoreError>;

    /// Replace an existing task.
    async fn update(&self, task: Task) -> Result<Task, StoreError>;

    /// Remove by id.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Filter, order and page.
    async fn list(&self, query: &ListQuery) -> Result<TaskPage, StoreError>;
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    tasks: HashMap<String, Task>,
    titles: HashMap<String, String>,
}

/// Process-local [`Store`].
///
/// Clones share state. [`set_available`](Self::set_available) simulates a
/// lost connection.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryStore {
    /// Empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability. While unavailable every call fails with
    /// [`StoreError::ConnectionFailure`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    /// `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::ConnectionFailure(
                "in-memory store is offline".into(),
            ))
        }
    }
}

fn id_of(task: &Task) -> String {
    task_id(&task.name).unwrap_or(&task.name).to_string()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.check()?;
        let id = id_of(&task);
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        if state.titles.contains_key(&task.title) {
            return Err(StoreError::AlreadyExists(task.title.clone()));
        }
        state.titles.insert(task.title.clone(), id.clone());
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        state
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<Task>, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .titles
            .get(title)
            .and_then(|id| state.tasks.get(id))
            .cloned())
    }

    async fn update(&self, task: Task) -> Result<Task, StoreError> {
        self.check()?;
        let id = id_of(&task);
        let mut state = self.state.write().await;
        let Some(old_title) = state.tasks.get(&id).map(|t| t.title.clone()) else {
            return Err(StoreError::NotFound(id));
        };
        if old_title != task.title {
            if let Some(owner) = state.titles.get(&task.title) {
                if *owner != id {
                    return Err(StoreError::AlreadyExists(task.title.clone()));
                }
            }
            state.titles.remove(&old_title);
            state.titles.insert(task.title.clone(), id.clone());
        }
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        state.titles.remove(&task.title);
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> Result<TaskPage, StoreError> {
        self.check()?;
        let state = self.state.read().await;
        let mut matching: Vec<&Task> = state
            .tasks
            .values()
            .filter(|t| query.principal == ADMIN || t.created_by == query.principal)
            .filter(|t| query.filter.matches(t))
            .collect();
        matching.sort_by(|a, b| query.order.compare(a, b));

        let start = if query.page_token.is_empty() {
            0
        } else {
            matching
                .iter()
                .position(|t| id_of(t) == query.page_token)
                .map(|i| i + 1)
                .ok_or_else(|| StoreError::NotFound(query.page_token.clone()))?
        };
        let end = (start + query.page_size).min(matching.len());
        let next_page_token = if end < matching.len() && end > start {
            id_of(matching[end - 1])
        } else {
            String::new()
        };

        Ok(TaskPage {
            tasks: matching[start..end].iter().map(|t| (*t).clone()).collect(),
            next_page_token,
            total_size: matching.len(),
        })
    }
}
