#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::config::AppConfig;
use recon_core::models::{
    CompletionReport, CreateMainTaskRequest, MainTask, SubmitRequest, TaskStatus,
};
use recon_core::traits::{CompletionEvent, CompletionNotifier, TaskStore};
use recon_core::SchedulerResult;
use recon_dispatcher::{SchedulerDeps, SchedulerService};
use recon_infrastructure::{MemoryStore, MemoryTaskStore};
use tokio::sync::Mutex;

pub const WS: &str = "ws";

/// 记录收到的完成通知
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CompletionEvent>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().await.clone()
    }

    /// 通知是异步发送的，等到至少收到 `count` 条
    pub async fn wait_for(&self, count: usize) -> Vec<CompletionEvent> {
        for _ in 0..100 {
            if self.events.lock().await.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events().await
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, event: &CompletionEvent) -> SchedulerResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<SchedulerService>,
    pub store: Arc<MemoryStore>,
    pub tasks: Arc<MemoryTaskStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    harness_with(AppConfig::default())
}

pub fn harness_with(config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let tasks = Arc::new(MemoryTaskStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let deps = SchedulerDeps::new(store.clone(), store.clone(), tasks.clone(), notifier.clone());
    Harness {
        service: Arc::new(SchedulerService::new(config, deps)),
        store,
        tasks,
        notifier,
    }
}

impl Harness {
    pub async fn create_main(&self, task_id: &str, sub_task_count: i32) -> MainTask {
        self.service
            .create_main_task(CreateMainTaskRequest {
                workspace_id: WS.to_string(),
                task_id: task_id.to_string(),
                name: format!("扫描 {task_id}"),
                target: "example.com".to_string(),
                profile_id: String::new(),
                org_id: String::new(),
                config: "{}".to_string(),
                sub_task_count,
            })
            .await
            .unwrap()
    }

    pub async fn submit(&self, task_id: &str, workers: Option<Vec<&str>>) {
        self.service
            .submit(SubmitRequest {
                workers: workers.map(|w| w.into_iter().map(str::to_string).collect()),
                ..submit_request(task_id)
            })
            .await
            .unwrap();
    }

    pub async fn main_task(&self, task_id: &str) -> MainTask {
        self.tasks.find_main_task(WS, task_id).await.unwrap().unwrap()
    }
}

pub fn submit_request(task_id: &str) -> SubmitRequest {
    SubmitRequest {
        task_id: task_id.to_string(),
        main_task_id: String::new(),
        workspace_id: WS.to_string(),
        task_name: "portscan".to_string(),
        config: "{\"ports\":\"1-1000\"}".to_string(),
        workers: None,
        priority: 0,
    }
}

pub fn report(task_id: &str, state: TaskStatus) -> CompletionReport {
    CompletionReport {
        task_id: task_id.to_string(),
        main_task_id: String::new(),
        worker: "w1".to_string(),
        state,
        result: String::new(),
        phase: None,
    }
}
