use axum::{
    extract::{Path, State},
    Json,
};
use recon_core::models::{CreateMainTaskRequest, SubmitRequest};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, ApiResponse},
    routes::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTaskResponse {
    pub task_id: String,
    /// 主任务是否由本次请求置为 `STOPPED`
    pub stopped: bool,
}

/// 创建主任务
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateMainTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let task = state.service.create_main_task(request).await?;
    Ok(created(task))
}

/// 提交子任务或单单元任务到队列
pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if request.task_id.trim().is_empty() {
        return Err(ApiError::bad_request("taskId不能为空"));
    }
    let descriptor = state.service.submit(request).await?;
    Ok(created(descriptor))
}

/// 批量提交，同优先级内按数组顺序出队
pub async fn submit_task_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<SubmitRequest>>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let descriptors = state.service.submit_batch(requests).await?;
    Ok(created(descriptors))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path((workspace, task_id)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let task = state.service.get_main_task(&workspace, &task_id).await?;
    Ok(success(task))
}

/// 停止任务，队列中的相关任务会在下次轮询时被丢弃
pub async fn stop_task(
    State(state): State<AppState>,
    Path((workspace, task_id)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let stopped = state.service.stop_task(&workspace, &task_id).await?;
    let message = if stopped {
        "任务已停止"
    } else {
        "已设置停止标记，主任务不存在或已结束"
    };
    Ok(ApiResponse::success_with_message(
        StopTaskResponse { task_id, stopped },
        message,
    ))
}
