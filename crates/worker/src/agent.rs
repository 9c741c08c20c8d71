use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::models::{CompletionReport, ControlCommand, PollResult, TaskStatus, WorkerStatusSnapshot};
use recon_core::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::SchedulerClient;

/// 执行结果，`state` 通常是终态
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub state: TaskStatus,
    pub result: String,
}

impl TaskOutcome {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            state: TaskStatus::Success,
            result: result.into(),
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        Self {
            state: TaskStatus::Failure,
            result: result.into(),
        }
    }
}

/// 认领到的任务的实际执行者
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &PollResult) -> TaskOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub scheduler_url: String,
    /// 为空时使用主机名
    pub worker_name: String,
    pub ip: String,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub is_daemon: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scheduler_url: "http://127.0.0.1:8080".to_string(),
            worker_name: String::new(),
            ip: String::new(),
            poll_interval_ms: 2000,
            heartbeat_interval_seconds: 10,
            request_timeout_seconds: 30,
            is_daemon: true,
        }
    }
}

impl AgentConfig {
    pub fn resolved_worker_name(&self) -> String {
        if !self.worker_name.trim().is_empty() {
            return self.worker_name.clone();
        }
        hostname::get()
            .ok()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "recon-worker".to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

/// Worker执行循环
///
/// 心跳循环定期上报状态快照，并把响应中的控制指令发布到 `watch` 通道；
/// 轮询循环认领任务、上报 `STARTED`、交给 [`TaskRunner`] 执行后上报终态。
/// 收到 `stop` 指令（或调用 [`WorkerAgent::shutdown`]）后两个循环都会退出，
/// 正在执行的任务会先跑完并上报。
pub struct WorkerAgent {
    client: SchedulerClient,
    runner: Arc<dyn TaskRunner>,
    config: AgentConfig,
    worker_name: String,
    control_tx: watch::Sender<ControlCommand>,
    task_started: AtomicI64,
    task_executed: AtomicI64,
}

impl WorkerAgent {
    pub fn new(config: AgentConfig, runner: Arc<dyn TaskRunner>) -> SchedulerResult<Self> {
        if config.poll_interval_ms == 0 || config.heartbeat_interval_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "轮询间隔和心跳间隔必须大于0".to_string(),
            ));
        }
        let client = SchedulerClient::new(
            config.scheduler_url.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )?;
        let (control_tx, _) = watch::channel(ControlCommand::default());

        Ok(Self {
            client,
            runner,
            worker_name: config.resolved_worker_name(),
            config,
            control_tx,
            task_started: AtomicI64::new(0),
            task_executed: AtomicI64::new(0),
        })
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// 订阅控制指令，`reload`/`init_env`/`sync` 由订阅方自行处理
    pub fn control(&self) -> watch::Receiver<ControlCommand> {
        self.control_tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.control_tx.send_modify(|cmd| cmd.stop = true);
    }

    pub fn task_counts(&self) -> (i64, i64) {
        (
            self.task_started.load(Ordering::Relaxed),
            self.task_executed.load(Ordering::Relaxed),
        )
    }

    /// 运行到收到停止指令为止
    pub async fn run(&self) -> SchedulerResult<()> {
        info!(worker = %self.worker_name, url = %self.client.base_url(), "Worker启动");
        tokio::join!(self.heartbeat_loop(), self.poll_loop());
        info!(worker = %self.worker_name, "Worker已停止");
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.control_tx.borrow().stop
    }

    async fn heartbeat_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut control = self.control();

        loop {
            tokio::select! {
                biased;
                _ = wait_for_stop(&mut control) => break,
                _ = ticker.tick() => {}
            }

            match self.client.heartbeat(&self.worker_name, &self.snapshot()).await {
                Ok(response) => {
                    let cmd = response.command();
                    if !cmd.is_empty() {
                        info!(worker = %self.worker_name, ?cmd, "收到控制指令");
                        self.control_tx.send_modify(|current| {
                            *current = ControlCommand {
                                stop: current.stop || cmd.stop,
                                ..cmd
                            }
                        });
                    }
                }
                Err(e) => warn!(worker = %self.worker_name, error = %e, "心跳发送失败"),
            }

            if self.stopped() {
                break;
            }
        }
        debug!(worker = %self.worker_name, "心跳循环退出");
    }

    async fn poll_loop(&self) {
        let mut control = self.control();

        while !self.stopped() {
            let idle = match self.client.poll(&self.worker_name).await {
                Ok(task) if task.found => {
                    self.execute(task).await;
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!(worker = %self.worker_name, error = %e, "轮询任务失败");
                    true
                }
            };

            if idle {
                tokio::select! {
                    biased;
                    _ = wait_for_stop(&mut control) => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }
        debug!(worker = %self.worker_name, "轮询循环退出");
    }

    async fn execute(&self, task: PollResult) {
        self.task_started.fetch_add(1, Ordering::Relaxed);
        info!(
            worker = %self.worker_name,
            task_id = %task.task_id,
            task_name = %task.task_name,
            "开始执行任务"
        );

        self.send_report(&task, TaskStatus::Started, String::new())
            .await;
        let outcome = self.runner.run(&task).await;
        self.send_report(&task, outcome.state, outcome.result).await;

        self.task_executed.fetch_add(1, Ordering::Relaxed);
        info!(
            worker = %self.worker_name,
            task_id = %task.task_id,
            state = %outcome.state.as_str(),
            "任务执行结束"
        );
    }

    async fn send_report(&self, task: &PollResult, state: TaskStatus, result: String) {
        let report = CompletionReport {
            task_id: task.task_id.clone(),
            main_task_id: task.main_task_id.clone(),
            worker: self.worker_name.clone(),
            state,
            result,
            phase: None,
        };
        // 上报失败不重试，执行记录超时后由调度端恢复
        if let Err(e) = self.client.report(&report).await {
            error!(
                worker = %self.worker_name,
                task_id = %task.task_id,
                state = %state.as_str(),
                error = %e,
                "上报任务状态失败"
            );
        }
    }

    fn snapshot(&self) -> WorkerStatusSnapshot {
        let (task_started_number, task_executed_number) = self.task_counts();
        WorkerStatusSnapshot {
            ip: self.config.ip.clone(),
            cpu_load: 0.0,
            mem_used: 0.0,
            task_started_number,
            task_executed_number,
            is_daemon: self.config.is_daemon,
        }
    }
}

async fn wait_for_stop(control: &mut watch::Receiver<ControlCommand>) {
    loop {
        if control.borrow_and_update().stop {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}
