// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `todo.v1.TodoService` RPC surface.

use crate::guard::guarded;
use crate::translate::HandlerError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use todo_core::{
    BatchCreateTasksRequest, BatchCreateTasksResponse, CreateTaskRequest, DeleteTaskRequest,
    DeleteTaskResponse, GetTaskRequest, ListTasksRequest, ListTasksResponse, RequestContext, Task,
    UpdateTaskRequest,
};
use todo_error::{AppError, new_trace_id};
use todo_service::TaskService;
use todo_telemetry::ErrorSink;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::info;

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "todo.v1.TodoService";

/// Metadata key carrying the caller's credentials.
pub const AUTHORIZATION: &str = "authorization";

/// Metadata key a caller may use to pin the trace id.
pub const TRACE_ID: &str = "x-trace-id";

/// RPC method names.
pub mod methods {
    /// `CreateTask`.
    pub const CREATE_TASK: &str = "CreateTask";
    /// `GetTask`.
    pub const GET_TASK: &str = "GetTask";
    /// `ListTasks`.
    pub const LIST_TASKS: &str = "ListTasks";
    /// `UpdateTask`.
    pub const UPDATE_TASK: &str = "UpdateTask";
    /// `DeleteTask`.
    pub const DELETE_TASK: &str = "DeleteTask";
    /// `BatchCreateTasks`.
    pub const BATCH_CREATE_TASKS: &str = "BatchCreateTasks";
}

/// Client and server view of `todo.v1.TodoService`.
#[async_trait]
pub trait TaskRpc: Send + Sync {
    /// Create one task.
    async fn create_task(&self, request: Request<CreateTaskRequest>)
    -> Result<Response<Task>, Status>;

    /// Fetch one task.
    async fn get_task(&self, request: Request<GetTaskRequest>) -> Result<Response<Task>, Status>;

    /// List the caller's tasks.
    async fn list_tasks(
        &self,
        request: Request<ListTasksRequest>,
    ) -> Result<Response<ListTasksResponse>, Status>;

    /// Partially update one task.
    async fn update_task(&self, request: Request<UpdateTaskRequest>)
    -> Result<Response<Task>, Status>;

    /// Delete one task.
    async fn delete_task(
        &self,
        request: Request<DeleteTaskRequest>,
    ) -> Result<Response<DeleteTaskResponse>, Status>;

    /// Create several tasks with partial success.
    async fn batch_create_tasks(
        &self,
        request: Request<BatchCreateTasksRequest>,
    ) -> Result<Response<BatchCreateTasksResponse>, Status>;
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Trace id pinned by the caller, or a fresh one.
pub fn trace_id_from(metadata: &MetadataMap) -> String {
    metadata
        .get(TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(new_trace_id, str::to_string)
}

/// Build the request context from `authorization: Bearer <principal>`.
///
/// Missing credentials yield the anonymous principal; malformed ones are
/// an `AUTHENTICATION_FAILED` error.
pub fn request_context(metadata: &MetadataMap, trace_id: &str) -> Result<RequestContext, AppError> {
    let Some(value) = metadata.get(AUTHORIZATION) else {
        return Ok(RequestContext::anonymous(trace_id));
    };
    let principal = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            AppError::authentication_failed("Authorization must use the form 'Bearer <token>'")
                .with_trace_id(trace_id)
        })?;
    Ok(RequestContext::new(principal, trace_id))
}

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// Server side of [`TaskRpc`] over a [`TaskService`].
///
/// Every call runs inside [`guarded`], so handler errors are translated
/// exactly once and panics never escape.
#[derive(Clone)]
pub struct RpcServer {
    service: TaskService,
    sink: Arc<dyn ErrorSink>,
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl RpcServer {
    /// Serve `service`, reporting errors to `sink`.
    pub fn new(service: TaskService, sink: Arc<dyn ErrorSink>) -> Self {
        Self { service, sink }
    }

    async fn call<Req, Resp, F, Fut>(
        &self,
        method: &'static str,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<Resp>, Status>
    where
        F: FnOnce(TaskService, RequestContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, AppError>>,
    {
        let started = Instant::now();
        let (metadata, _, message) = request.into_parts();
        let trace_id = trace_id_from(&metadata);

        let run = async {
            let ctx = request_context(&metadata, &trace_id)?;
            let out = handler(self.service.clone(), ctx, message).await?;
            Ok::<Resp, HandlerError>(out)
        };
        let result = guarded(method, &trace_id, self.sink.as_ref(), run).await;

        let code = match &result {
            Ok(_) => tonic::Code::Ok,
            Err(status) => status.code(),
        };
        info!(
            rpc.service = SERVICE_NAME,
            rpc.method = method,
            rpc.code = ?code,
            duration_ms = started.elapsed().as_millis() as u64,
            trace_id = %trace_id,
            "rpc"
        );
        result.map(Response::new)
    }
}

#[async_trait]
impl TaskRpc for RpcServer {
    async fn create_task(
        &self,
        request: Request<CreateTaskRequest>,
    ) -> Result<Response<Task>, Status> {
        self.call(methods::CREATE_TASK, request, |svc, ctx, req| async move {
            svc.create_task(&ctx, req).await
        })
        .await
    }

    async fn get_task(&self, request: Request<GetTaskRequest>) -> Result<Response<Task>, Status> {
        self.call(methods::GET_TASK, request, |svc, ctx, req| async move {
            svc.get_task(&ctx, req).await
        })
        .await
    }

    async fn list_tasks(
        &self,
        request: Request<ListTasksRequest>,
    ) -> Result<Response<ListTasksResponse>, Status> {
        self.call(methods::LIST_TASKS, request, |svc, ctx, req| async move {
            svc.list_tasks(&ctx, req).await
        })
        .await
    }

    async fn update_task(
        &self,
        request: Request<UpdateTaskRequest>,
    ) -> Result<Response<Task>, Status> {
        self.call(methods::UPDATE_TASK, request, |svc, ctx, req| async move {
            svc.update_task(&ctx, req).await
        })
        .await
    }

    async fn delete_task(
        &self,
        request: Request<DeleteTaskRequest>,
    ) -> Result<Response<DeleteTaskResponse>, Status> {
        self.call(methods::DELETE_TASK, request, |svc, ctx, req| async move {
            svc.delete_task(&ctx, req).await
        })
        .await
    }

    async fn batch_create_tasks(
        &self,
        request: Request<BatchCreateTasksRequest>,
    ) -> Result<Response<BatchCreateTasksResponse>, Status> {
        self.call(methods::BATCH_CREATE_TASKS, request, |svc, ctx, req| async move {
            svc.batch_create_tasks(&ctx, req).await
        })
        .await
    }
}
