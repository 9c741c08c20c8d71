use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker心跳时上报的状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerStatusSnapshot {
    pub ip: String,
    pub cpu_load: f64,
    pub mem_used: f64,
    pub task_started_number: i64,
    pub task_executed_number: i64,
    pub is_daemon: bool,
}

/// Worker存活记录
///
/// 以Worker名称为键、带TTL写入。名称就是身份，同名Worker重启后与原实例无法区分；
/// TTL到期且没有新的心跳时记录消失，即视为离线。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub name: String,
    pub ip: String,
    pub cpu_load: f64,
    pub mem_used: f64,
    pub task_started_number: i64,
    pub task_executed_number: i64,
    pub is_daemon: bool,
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn from_snapshot(name: &str, snapshot: &WorkerStatusSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            ip: snapshot.ip.clone(),
            cpu_load: snapshot.cpu_load,
            mem_used: snapshot.mem_used,
            task_started_number: snapshot.task_started_number,
            task_executed_number: snapshot.task_executed_number,
            is_daemon: snapshot.is_daemon,
            last_heartbeat: now,
        }
    }
}

/// 注册表中的Worker视图，记录过期后 `record` 为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    pub name: String,
    pub online: bool,
    pub record: Option<WorkerRecord>,
}

/// 控制指令
///
/// 每个Worker只有一个邮箱槽位，后写覆盖先写；下一次心跳读取后即删除，
/// 投递语义为至多一次。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlCommand {
    pub stop: bool,
    pub reload: bool,
    pub init_env: bool,
    pub sync: bool,
}

impl ControlCommand {
    pub fn is_empty(&self) -> bool {
        !(self.stop || self.reload || self.init_env || self.sync)
    }
}

/// 心跳响应，携带取到的控制指令
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub stop_flag: bool,
    pub reload_flag: bool,
    pub init_env_flag: bool,
    pub sync_flag: bool,
}

impl From<ControlCommand> for HeartbeatResponse {
    fn from(cmd: ControlCommand) -> Self {
        Self {
            stop_flag: cmd.stop,
            reload_flag: cmd.reload,
            init_env_flag: cmd.init_env,
            sync_flag: cmd.sync,
        }
    }
}

impl HeartbeatResponse {
    pub fn command(&self) -> ControlCommand {
        ControlCommand {
            stop: self.stop_flag,
            reload: self.reload_flag,
            init_env: self.init_env_flag,
            sync: self.sync_flag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_command_wire_format() {
        let cmd: ControlCommand = serde_json::from_str(r#"{"initEnv":true}"#).unwrap();
        assert!(cmd.init_env);
        assert!(!cmd.stop);
        assert!(!cmd.is_empty());
        assert!(ControlCommand::default().is_empty());

        let response = HeartbeatResponse::from(cmd);
        assert!(response.init_env_flag);
        assert_eq!(response.command(), cmd);
    }
}
