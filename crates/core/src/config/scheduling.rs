use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 单次轮询最多检查的候选数量
    pub max_skip: usize,
    /// 任务元数据的保留时间（秒）
    pub task_info_ttl_seconds: u64,
    /// 元数据缺失时回退扫描的工作空间上限
    pub fallback_workspace_limit: usize,
    pub default_workspace: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_skip: 100,
            task_info_ttl_seconds: 7 * 24 * 3600,
            fallback_workspace_limit: 100,
            default_workspace: "default".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_skip == 0 {
            return Err(anyhow::anyhow!("max_skip必须大于0"));
        }
        if self.task_info_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("任务元数据保留时间必须大于0"));
        }
        if self.default_workspace.is_empty() {
            return Err(anyhow::anyhow!("默认工作空间不能为空"));
        }
        Ok(())
    }

    pub fn task_info_ttl(&self) -> Duration {
        Duration::from_secs(self.task_info_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Worker存活记录的TTL（秒）
    pub worker_ttl_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            worker_ttl_seconds: 60,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("Worker存活TTL必须大于0"));
        }
        Ok(())
    }

    pub fn worker_ttl(&self) -> Duration {
        Duration::from_secs(self.worker_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,
    /// 执行信息超过该时间未刷新视为失联
    pub task_timeout_seconds: u64,
    pub max_retries: u32,
    /// 执行信息的保留时间
    pub execution_ttl_seconds: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 30,
            task_timeout_seconds: 600,
            max_retries: 3,
            execution_ttl_seconds: 3600,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("恢复检查间隔必须大于0"));
        }
        if self.task_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务超时时间必须大于0"));
        }
        if self.execution_ttl_seconds <= self.task_timeout_seconds {
            return Err(anyhow::anyhow!(
                "执行信息保留时间({}s)必须大于任务超时时间({}s)",
                self.execution_ttl_seconds,
                self.task_timeout_seconds
            ));
        }
        Ok(())
    }
}
