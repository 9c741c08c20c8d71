use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use recon_api::create_app;
use recon_core::config::AppConfig;
use recon_dispatcher::{SchedulerDeps, SchedulerService};
use recon_infrastructure::{LogNotifier, MemoryStore, MemoryTaskStore};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let deps = SchedulerDeps::new(
        store.clone(),
        store,
        Arc::new(MemoryTaskStore::new()),
        Arc::new(LogNotifier),
    );
    create_app(
        Arc::new(SchedulerService::new(AppConfig::default(), deps)),
        false,
    )
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

async fn create_and_submit(app: &Router, task_id: &str) {
    let (status, _) = post(
        app,
        "/api/v1/tasks",
        json!({"workspaceId": "ws", "taskId": task_id, "name": "端口扫描", "subTaskCount": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post(
        app,
        "/api/v1/tasks/submit",
        json!({"taskId": task_id, "workspaceId": "ws", "taskName": "portscan", "config": "{\"ports\":\"1-1024\"}"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["mainTaskId"], task_id);
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queueLength"], 0);
}

#[tokio::test]
async fn test_worker_round_trip() {
    let app = test_app();
    create_and_submit(&app, "t1").await;

    let (status, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": "w1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["found"], true);
    assert_eq!(body["data"]["taskId"], "t1");
    assert_eq!(body["data"]["taskName"], "portscan");

    let (_, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": "w1"})).await;
    assert_eq!(body["data"]["found"], false);

    let (status, body) = post(
        &app,
        "/api/v1/worker/task/update",
        json!({"taskId": "t1", "worker": "w1", "state": "SUCCESS", "result": "22,80,443"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["allDone"], true);

    let (status, body) = send(&app, Method::GET, "/api/v1/tasks/ws/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCESS");
    assert_eq!(body["data"]["progress"], 100);
    assert_eq!(body["data"]["result"], "22,80,443");
}

#[tokio::test]
async fn test_empty_identifiers_are_rejected() {
    let app = test_app();

    let (status, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");

    let (status, _) = post(
        &app,
        "/api/v1/worker/task/update",
        json!({"taskId": " ", "state": "SUCCESS"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/v1/worker/heartbeat", json!({"workerName": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/api/v1/tasks/submit",
        json!({"taskId": "", "workspaceId": "ws"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_submit_honors_priority() {
    let app = test_app();
    let (status, body) = post(
        &app,
        "/api/v1/tasks/submit/batch",
        json!([
            {"taskId": "b-1", "workspaceId": "ws", "taskName": "portscan"},
            {"taskId": "b-2", "workspaceId": "ws", "taskName": "portscan", "priority": 3},
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"][1]["priority"], 3);

    let (_, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": "w1"})).await;
    assert_eq!(body["data"]["taskId"], "b-2");
    let (_, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": "w1"})).await;
    assert_eq!(body["data"]["taskId"], "b-1");

    let (status, _) = post(&app, "/api/v1/tasks/submit/batch", json!([])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_task_returns_404() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/api/v1/tasks/ws/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn test_stop_drops_queued_task() {
    let app = test_app();
    create_and_submit(&app, "t1").await;

    let (status, body) = post(&app, "/api/v1/tasks/ws/t1/stop", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stopped"], true);

    let (_, body) = post(&app, "/api/v1/worker/task/check", json!({"workerName": "w1"})).await;
    assert_eq!(body["data"]["found"], false);

    let (_, body) = send(&app, Method::GET, "/api/v1/tasks/ws/t1", None).await;
    assert_eq!(body["data"]["status"], "STOPPED");

    // 已停止的任务再次停止不会改变状态
    let (_, body) = post(&app, "/api/v1/tasks/ws/t1/stop", json!({})).await;
    assert_eq!(body["data"]["stopped"], false);
}

#[tokio::test]
async fn test_control_is_delivered_by_heartbeat() {
    let app = test_app();

    let (status, _) = post(
        &app,
        "/api/v1/workers/w1/control",
        json!({"reload": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let heartbeat = json!({"workerName": "w1", "status": {"ip": "10.0.0.2", "cpuLoad": 3.5}});
    let (status, body) = post(&app, "/api/v1/worker/heartbeat", heartbeat.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reloadFlag"], true);
    assert_eq!(body["data"]["stopFlag"], false);

    let (_, body) = post(&app, "/api/v1/worker/heartbeat", heartbeat).await;
    assert_eq!(body["data"]["reloadFlag"], false);

    let (status, body) = send(&app, Method::GET, "/api/v1/workers", None).await;
    assert_eq!(status, StatusCode::OK);
    let workers = body["data"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["name"], "w1");
    assert_eq!(workers[0]["online"], true);
    assert_eq!(workers[0]["record"]["ip"], "10.0.0.2");
}

#[tokio::test]
async fn test_empty_control_is_rejected() {
    let app = test_app();
    let (status, _) = post(&app, "/api/v1/workers/w1/control", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
