//! # Recon API
//!
//! 调度服务的HTTP接口层，基于Axum构建。
//!
//! 包含两类接口：
//!
//! - Worker协议：轮询认领任务、上报执行结果、心跳
//! - 管理接口：创建主任务、提交子任务、停止任务、查看Worker、下发控制指令
//!
//! 所有成功响应使用统一的 [`response::ApiResponse`] 包装，错误由
//! [`error::ApiError`] 转换为带错误类型和建议的JSON。
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recon_api::create_app;
//! # fn example(service: Arc<recon_dispatcher::SchedulerService>) {
//! let app = create_app(service, true);
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use recon_dispatcher::SchedulerService;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(service: Arc<SchedulerService>, cors_enabled: bool) -> Router {
    let app = create_routes(AppState { service }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}
