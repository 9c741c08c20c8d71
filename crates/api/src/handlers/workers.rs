use axum::{
    extract::{Path, State},
    Json,
};
use recon_core::models::ControlCommand;

use crate::{
    error::{ApiError, ApiResult},
    response::{success, ApiResponse},
    routes::AppState,
};

/// 获取已注册的Worker及其在线状态
pub async fn list_workers(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workers = state.service.list_workers().await?;
    Ok(success(workers))
}

/// 向Worker邮箱写入控制指令，覆盖尚未取走的旧指令
pub async fn send_control(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(command): Json<ControlCommand>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if command.is_empty() {
        return Err(ApiError::bad_request("控制指令为空"));
    }
    state.service.send_control(&name, command).await?;
    Ok(ApiResponse::success_empty_with_message("控制指令已下发"))
}
