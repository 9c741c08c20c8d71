use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    // 队列长度只作参考，存储不可用时不影响健康检查本身
    let queue_len = state.service.queue_len().await.ok();

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "recon-scheduler",
        "version": env!("CARGO_PKG_VERSION"),
        "queueLength": queue_len
    }))
}
