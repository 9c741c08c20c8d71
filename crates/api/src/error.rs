use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recon_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("内部服务器错误: {0}")]
    Internal(String),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = match &self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { task_id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 {task_id} 不存在"),
                "TASK_NOT_FOUND",
                vec![
                    "请检查工作空间和任务ID是否正确".to_string(),
                    "任务需先通过 POST /api/v1/tasks 创建".to_string(),
                ],
            ),
            ApiError::Scheduler(SchedulerError::WorkerNotFound { name }) => (
                StatusCode::NOT_FOUND,
                format!("Worker {name} 不存在"),
                "WORKER_NOT_FOUND",
                vec!["使用 GET /api/v1/workers 查看已注册的Worker".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("任务参数无效: {msg}"),
                "INVALID_TASK_PARAMS",
                vec!["请检查请求参数是否完整".to_string()],
            ),
            ApiError::Scheduler(err) if err.is_retryable() => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.user_message(),
                "STORE_UNAVAILABLE",
                vec![
                    "存储或网络暂时不可用，请稍后重试".to_string(),
                    "查看 GET /health 检查服务状态".to_string(),
                ],
            ),
            ApiError::Scheduler(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec!["如果问题持续存在，请联系系统管理员".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![format!("错误详情: {msg}")],
            ),
        };

        if status.is_server_error() {
            error!(error = %self, "请求处理失败");
        }

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_maps_to_404() {
        let error: ApiError = SchedulerError::task_not_found("t1").into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_params_maps_to_400() {
        let error: ApiError = SchedulerError::invalid_params("taskId不能为空").into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::bad_request("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_failure_maps_to_503() {
        let error: ApiError = SchedulerError::store("connection refused").into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_other_errors_map_to_500() {
        let error: ApiError = SchedulerError::Internal("boom".to_string()).into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
