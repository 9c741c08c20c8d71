use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use recon_dispatcher::SchedulerService;

use crate::handlers::{
    health::health_check,
    tasks::{create_task, get_task, stop_task, submit_task, submit_task_batch},
    worker_protocol::{check_task, heartbeat, update_task},
    workers::{list_workers, send_control},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SchedulerService>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // Worker协议
        .route("/api/v1/worker/task/check", post(check_task))
        .route("/api/v1/worker/task/update", post(update_task))
        .route("/api/v1/worker/heartbeat", post(heartbeat))
        // 任务管理
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/submit", post(submit_task))
        .route("/api/v1/tasks/submit/batch", post(submit_task_batch))
        .route("/api/v1/tasks/{workspace}/{task_id}", get(get_task))
        .route("/api/v1/tasks/{workspace}/{task_id}/stop", post(stop_task))
        // Worker管理
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/{name}/control", post(send_control))
        .with_state(state)
}
