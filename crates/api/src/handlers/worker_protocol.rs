use axum::{extract::State, Json};
use recon_core::models::{CompletionReport, HeartbeatRequest, PollRequest};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// Worker轮询认领任务，没有可用任务时 `found` 为false
pub async fn check_task(
    State(state): State<AppState>,
    Json(request): Json<PollRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if request.worker_name.trim().is_empty() {
        return Err(ApiError::bad_request("workerName不能为空"));
    }
    let result = state.service.poll(&request.worker_name).await?;
    Ok(success(result))
}

/// Worker上报执行状态
pub async fn update_task(
    State(state): State<AppState>,
    Json(report): Json<CompletionReport>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if report.task_id.trim().is_empty() {
        return Err(ApiError::bad_request("taskId不能为空"));
    }
    let outcome = state.service.report(&report).await?;
    Ok(success(outcome))
}

/// Worker心跳，响应中携带待执行的控制指令
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if request.worker_name.trim().is_empty() {
        return Err(ApiError::bad_request("workerName不能为空"));
    }
    let response = state.service.heartbeat(&request).await?;
    Ok(success(response))
}
