// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process RPC channel.
//!
//! Each call runs on its own task, and error statuses are encoded to gRPC
//! trailers (`grpc-status`, `grpc-message`, `grpc-status-details-bin`) and
//! decoded again, so the caller sees exactly what a network hop delivers.

use crate::server::TaskRpc;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use todo_core::{
    BatchCreateTasksRequest, BatchCreateTasksResponse, CreateTaskRequest, DeleteTaskRequest,
    DeleteTaskResponse, GetTaskRequest, ListTasksRequest, ListTasksResponse, Task,
    UpdateTaskRequest,
};
use tonic::codegen::http::HeaderMap;
use tonic::{Request, Response, Status};
use tracing::error;

/// Encode `status` to trailers and decode it back.
pub fn reserialize(status: Status) -> Status {
    let mut headers = HeaderMap::new();
    if let Err(encode_err) = status.add_header(&mut headers) {
        return encode_err;
    }
    Status::from_header_map(&headers).unwrap_or_else(|| Status::unknown("status lost in transit"))
}

/// Client over a [`TaskRpc`] server in the same process.
#[derive(Clone)]
pub struct LoopbackChannel {
    server: Arc<dyn TaskRpc>,
}

impl fmt::Debug for LoopbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackChannel").finish_non_exhaustive()
    }
}

impl LoopbackChannel {
    /// Channel to `server`.
    pub fn new(server: Arc<dyn TaskRpc>) -> Self {
        Self { server }
    }

    async fn hop<Req, Resp, F, Fut>(
        &self,
        request: Request<Req>,
        call: F,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: FnOnce(Arc<dyn TaskRpc>, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
    {
        let task = tokio::spawn(call(Arc::clone(&self.server), request));
        match task.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(status)) => Err(reserialize(status)),
            Err(join) => {
                error!(error = %join, "loopback call did not complete");
                Err(Status::internal("call did not complete"))
            }
        }
    }
}

#[async_trait]
impl TaskRpc for LoopbackChannel {
    async fn create_task(
        &self,
        request: Request<CreateTaskRequest>,
    ) -> Result<Response<Task>, Status> {
        self.hop(request, |s, r| async move { s.create_task(r).await })
            .await
    }

    async fn get_task(&self, request: Request<GetTaskRequest>) -> Result<Response<Task>, Status> {
        self.hop(request, |s, r| async move { s.get_task(r).await })
            .await
    }

    async fn list_tasks(
        &self,
        request: Request<ListTasksRequest>,
    ) -> Result<Response<ListTasksResponse>, Status> {
        self.hop(request, |s, r| async move { s.list_tasks(r).await })
            .await
    }

    async fn update_task(
        &self,
        request: Request<UpdateTaskRequest>,
    ) -> Result<Response<Task>, Status> {
        self.hop(request, |s, r| async move { s.update_task(r).await })
            .await
    }

    async fn delete_task(
        &self,
        request: Request<DeleteTaskRequest>,
    ) -> Result<Response<DeleteTaskResponse>, Status> {
        self.hop(request, |s, r| async move { s.delete_task(r).await })
            .await
    }

    async fn batch_create_tasks(
        &self,
        request: Request<BatchCreateTasksRequest>,
    ) -> Result<Response<BatchCreateTasksResponse>, Status> {
        self.hop(request, |s, r| async move { s.batch_create_tasks(r).await })
            .await
    }
}
