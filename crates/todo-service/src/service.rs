// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task business logic.

use crate::query::{TaskFilter, TaskOrder};
use crate::store::{ListQuery, Store, StoreError};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use todo_core::{
    BatchCreateTasksRequest, BatchCreateTasksResponse, BatchFailure, CreateTaskRequest,
    DeleteTaskRequest, DeleteTaskResponse, GetTaskRequest, ListTasksRequest, ListTasksResponse,
    Priority, RequestContext, Task, TaskStatus, UpdateTaskRequest, task_id, task_name,
};
use todo_error::{AppCode, AppError, FieldViolation};
use todo_validate::Validator;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Detail of the error returned when the store cannot be reached.
pub const STORE_UNAVAILABLE: &str = "Unable to connect to the database. Please try again later.";

/// Detail of the error returned for unexpected store failures.
pub const UNEXPECTED_FAILURE: &str = "An unexpected error occurred while processing your request";

/// Detail of the error returned when every batch item failed for a
/// non-validation reason.
pub const ALL_BATCH_FAILED: &str = "All batch operations failed";

/// Page size used when a request asks for 0.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Page size requests are clamped to.
pub const MAX_PAGE_SIZE: u32 = 1000;

type Result<T> = std::result::Result<T, AppError>;

/// Store failure that the calling operation has no specific mapping for.
fn store_failure(err: StoreError) -> AppError {
    match err {
        StoreError::ConnectionFailure(_) => {
            AppError::service_unavailable(STORE_UNAVAILABLE).with_cause(err)
        }
        StoreError::NotFound(_) | StoreError::AlreadyExists(_) => {
            AppError::internal(UNEXPECTED_FAILURE).with_cause(err)
        }
    }
}

fn title_taken() -> AppError {
    AppError::conflict("task", "A task with this title already exists")
}

/// CRUD and batch operations over tasks.
///
/// Every error is stamped with the request's trace id before it is returned.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn Store>,
    validator: Arc<Validator>,
    default_page_size: u32,
    max_page_size: u32,
}

impl fmt::Debug for TaskService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskService")
            .field("validator", &self.validator)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}

impl TaskService {
    /// Service over `store`, validating with `validator`.
    pub fn new(store: Arc<dyn Store>, validator: Arc<Validator>) -> Self {
        Self {
            store,
            validator,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Override the `ListTasks` page sizing.
    #[must_use]
    pub fn with_page_sizes(mut self, default: u32, max: u32) -> Self {
        self.max_page_size = max.max(1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }

    /// The injected validator.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    fn page_size(&self, requested: i32) -> usize {
        let size = u32::try_from(requested)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(self.default_page_size);
        size.min(self.max_page_size) as usize
    }

    // -- CreateTask ---------------------------------------------------------

    /// Create a task owned by the caller.
    ///
    /// Unset status and priority default to `PENDING` and `MEDIUM`.
    pub async fn create_task(&self, ctx: &RequestContext, req: CreateTaskRequest) -> Result<Task> {
        self.create(ctx, req)
            .await
            .map_err(|e| stamp(e, ctx))
    }

    async fn create(&self, ctx: &RequestContext, req: CreateTaskRequest) -> Result<Task> {
        let Some(input) = req.task else {
            return Err(AppError::required_field("task", "Task object is required"));
        };
        if let Some(err) = self.validator.validate_task(&input) {
            return Err(err);
        }
        self.insert(ctx, input).await
    }

    /// Insert an already validated task.
    async fn insert(&self, ctx: &RequestContext, input: Task) -> Result<Task> {
        if self
            .store
            .find_by_title(&input.title)
            .await
            .map_err(store_failure)?
            .is_some()
        {
            return Err(title_taken());
        }

        let now = Utc::now();
        let task = Task {
            name: task_name(&Uuid::new_v4().to_string()),
            status: match input.status {
                TaskStatus::Unspecified => TaskStatus::Pending,
                s => s,
            },
            priority: match input.priority {
                Priority::Unspecified => Priority::Medium,
                p => p,
            },
            create_time: Some(now),
            update_time: Some(now),
            created_by: ctx.principal.clone(),
            ..input
        };

        match self.store.create(task).await {
            Ok(task) => {
                info!(task.name = %task.name, principal = %ctx.principal, "task created");
                Ok(task)
            }
            Err(StoreError::AlreadyExists(_)) => Err(title_taken()),
            Err(e) => Err(store_failure(e)),
        }
    }

    // -- GetTask ------------------------------------------------------------

    /// Fetch a task the caller may read.
    pub async fn get_task(&self, ctx: &RequestContext, req: GetTaskRequest) -> Result<Task> {
        self.get(ctx, &req).await.map_err(|e| stamp(e, ctx))
    }

    async fn get(&self, ctx: &RequestContext, req: &GetTaskRequest) -> Result<Task> {
        if let Some(err) = self.validator.validate_request(req) {
            return Err(err);
        }
        let id = task_id(&req.name).ok_or_else(|| {
            AppError::required_field("name", "Task name must be in format 'tasks/{id}'")
        })?;
        let task = self.load(id).await?;
        if !ctx.can_access(&task) {
            return Err(AppError::permission_denied("task", "read"));
        }
        Ok(task)
    }

    async fn load(&self, id: &str) -> Result<Task> {
        match self.store.get(id).await {
            Ok(task) => Ok(task),
            Err(StoreError::NotFound(_)) => Err(AppError::not_found("Task", id)),
            Err(e) => Err(store_failure(e)),
        }
    }

    // -- ListTasks ----------------------------------------------------------

    /// One page of the caller's tasks.
    pub async fn list_tasks(
        &self,
        ctx: &RequestContext,
        req: ListTasksRequest,
    ) -> Result<ListTasksResponse> {
        self.list(ctx, &req).await.map_err(|e| stamp(e, ctx))
    }

    async fn list(&self, ctx: &RequestContext, req: &ListTasksRequest) -> Result<ListTasksResponse> {
        if let Some(err) = self.validator.validate_request(req) {
            return Err(err);
        }
        let filter = req.filter.parse::<TaskFilter>().map_err(|e| {
            AppError::validation_failed(vec![FieldViolation::new(
                "filter",
                AppCode::InvalidValue,
                format!("Failed to parse filter: {e}"),
            )])
        })?;
        let order = req.order_by.parse::<TaskOrder>().map_err(|e| {
            AppError::validation_failed(vec![FieldViolation::new(
                "order_by",
                AppCode::InvalidValue,
                e.to_string(),
            )])
        })?;

        let query = ListQuery {
            filter,
            order,
            page_size: self.page_size(req.page_size),
            page_token: req.page_token.clone(),
            principal: ctx.principal.clone(),
        };
        debug!(page_size = query.page_size, filter = %req.filter, "listing tasks");

        let page = match self.store.list(&query).await {
            Ok(page) => page,
            Err(StoreError::NotFound(_)) => {
                return Err(AppError::validation_failed(vec![FieldViolation::new(
                    "page_token",
                    AppCode::InvalidValue,
                    "page token does not refer to a listed task",
                )]));
            }
            Err(e) => return Err(store_failure(e)),
        };

        Ok(ListTasksResponse {
            tasks: page.tasks,
            next_page_token: page.next_page_token,
            total_size: i32::try_from(page.total_size).unwrap_or(i32::MAX),
        })
    }

    // -- UpdateTask ---------------------------------------------------------

    /// Overwrite the masked fields of an existing task.
    pub async fn update_task(&self, ctx: &RequestContext, req: UpdateTaskRequest) -> Result<Task> {
        self.update(ctx, req).await.map_err(|e| stamp(e, ctx))
    }

    async fn update(&self, ctx: &RequestContext, req: UpdateTaskRequest) -> Result<Task> {
        let Some(patch) = req.task else {
            return Err(AppError::required_field("task", "Task object is required"));
        };
        let mask = match req.update_mask {
            Some(mask) if !mask.is_empty() => mask,
            _ => {
                return Err(AppError::required_field(
                    "update_mask",
                    "Update mask must specify which fields to update",
                ));
            }
        };
        let unknown: Vec<FieldViolation> = mask
            .unknown_paths()
            .into_iter()
            .map(|p| {
                FieldViolation::new(
                    "update_mask",
                    AppCode::InvalidValue,
                    format!("Field '{p}' cannot be updated"),
                )
            })
            .collect();
        if let Some(err) = AppError::from_violations(unknown) {
            return Err(err);
        }
        let id = task_id(&patch.name)
            .ok_or_else(|| AppError::required_field("task.name", "Invalid task name format"))?;

        let existing = self.load(id).await?;
        if !ctx.can_access(&existing) {
            return Err(AppError::permission_denied("task", "update"));
        }

        let mut updated = existing.clone();
        mask.apply(&mut updated, &patch);
        updated.update_time = Some(Utc::now());
        if let Some(err) = self.validator.validate_task(&updated) {
            return Err(err);
        }

        if updated.title != existing.title {
            let holder = self
                .store
                .find_by_title(&updated.title)
                .await
                .map_err(store_failure)?;
            if holder.is_some_and(|t| t.name != updated.name) {
                return Err(title_taken());
            }
        }

        match self.store.update(updated).await {
            Ok(task) => {
                info!(task.name = %task.name, paths = ?mask.paths, "task updated");
                Ok(task)
            }
            Err(StoreError::NotFound(_)) => Err(AppError::not_found("Task", id)),
            Err(StoreError::AlreadyExists(_)) => Err(title_taken()),
            Err(e) => Err(store_failure(e)),
        }
    }

    // -- DeleteTask ---------------------------------------------------------

    /// Delete a task the caller owns.
    pub async fn delete_task(
        &self,
        ctx: &RequestContext,
        req: DeleteTaskRequest,
    ) -> Result<DeleteTaskResponse> {
        self.delete(ctx, &req).await.map_err(|e| stamp(e, ctx))
    }

    async fn delete(&self, ctx: &RequestContext, req: &DeleteTaskRequest) -> Result<DeleteTaskResponse> {
        if let Some(err) = self.validator.validate_request(req) {
            return Err(err);
        }
        let id = task_id(&req.name)
            .ok_or_else(|| AppError::required_field("name", "Invalid task name format"))?;
        let existing = self.load(id).await?;
        if !ctx.can_access(&existing) {
            return Err(AppError::permission_denied("task", "delete"));
        }
        match self.store.delete(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(AppError::not_found("Task", id)),
            Err(e) => return Err(store_failure(e)),
        }
        info!(task.name = %req.name, "task deleted");
        Ok(DeleteTaskResponse {
            message: format!("Task {} deleted successfully", req.name),
        })
    }

    // -- BatchCreateTasks ---------------------------------------------------

    /// Create every valid item; report the rest as failures.
    ///
    /// Batch-level violations (empty or oversized batch) fail the whole
    /// call. Otherwise the call only fails when no item was created: with
    /// the aggregated validation error if every item failed validation, or
    /// with [`ALL_BATCH_FAILED`].
    pub async fn batch_create_tasks(
        &self,
        ctx: &RequestContext,
        req: BatchCreateTasksRequest,
    ) -> Result<BatchCreateTasksResponse> {
        self.batch_create(ctx, req)
            .await
            .map_err(|e| stamp(e, ctx))
    }

    async fn batch_create(
        &self,
        ctx: &RequestContext,
        req: BatchCreateTasksRequest,
    ) -> Result<BatchCreateTasksResponse> {
        let report = self.validator.inspect_batch(&req);
        if !report.batch_violations().is_empty() {
            return Err(AppError::validation_failed(report.violations()));
        }

        let mut response = BatchCreateTasksResponse::default();
        for (index, item) in req.requests.into_iter().enumerate() {
            let violations = report.item_violations(index);
            if !violations.is_empty() {
                let err = AppError::validation_failed(violations);
                response.failures.push(BatchFailure {
                    index,
                    code: err.code(),
                    message: err.detail().to_string(),
                    field_violations: err.field_violations().to_vec(),
                });
                continue;
            }
            // A clean report implies a task is present.
            let Some(task) = item.and_then(|r| r.task) else {
                continue;
            };
            match self.insert(ctx, task).await {
                Ok(task) => response.tasks.push(task),
                Err(err) => {
                    err.log_cause();
                    response.failures.push(BatchFailure {
                        index,
                        code: err.code(),
                        message: err.detail().to_string(),
                        field_violations: err.nested_violations(&format!("requests[{index}].")),
                    });
                }
            }
        }
        response.failed_count = response.failures.len();

        if response.tasks.is_empty() && !response.failures.is_empty() {
            let all_validation = response
                .failures
                .iter()
                .all(|f| f.code == AppCode::ValidationFailed);
            return Err(if all_validation {
                AppError::validation_failed(report.violations())
            } else {
                AppError::internal(ALL_BATCH_FAILED)
            });
        }
        if response.failed_count > 0 {
            warn!(
                created = response.tasks.len(),
                failed = response.failed_count,
                "batch partially failed"
            );
        }
        Ok(response)
    }
}

fn stamp(err: AppError, ctx: &RequestContext) -> AppError {
    if ctx.trace_id.is_empty() {
        err
    } else {
        err.with_trace_id(ctx.trace_id.clone())
    }
}
