use std::time::Duration;

use recon_core::config::RedisConfig;
use recon_core::{SchedulerError, SchedulerResult};
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue};
use tokio::time::timeout;
use tracing::{debug, error};

/// Redis连接管理器
///
/// 内部持有一个可克隆的多路复用连接，断线后自动重连；每条命令都带有超时，
/// 超时和命令失败统一映射为 [`SchedulerError::Store`]。
#[derive(Clone)]
pub struct RedisConnectionManager {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisConnectionManager {
    pub async fn new(config: RedisConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.build_connection_url()).map_err(|e| {
            SchedulerError::store(format!("创建Redis客户端失败: {e}"))
        })?;

        let connect_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let connection = timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                SchedulerError::store(format!(
                    "连接Redis超时: {}:{}",
                    config.host, config.port
                ))
            })?
            .map_err(|e| SchedulerError::store(format!("连接Redis失败: {e}")))?;

        let manager = Self { connection, config };
        manager.ping().await?;
        debug!(
            "成功连接到Redis {}:{}/{}",
            manager.config.host, manager.config.port, manager.config.database
        );

        Ok(manager)
    }

    pub async fn execute_command<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> SchedulerResult<T> {
        let mut conn = self.connection.clone();
        let command_timeout = Duration::from_secs(self.config.command_timeout_seconds);
        match timeout(command_timeout, cmd.query_async::<T>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SchedulerError::store(format!("Redis命令执行失败: {e}"))),
            Err(_) => Err(SchedulerError::store(format!(
                "Redis命令超时({}s)",
                self.config.command_timeout_seconds
            ))),
        }
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let response: String = self.execute_command(&redis::cmd("PING")).await?;
        if response == "PONG" {
            Ok(())
        } else {
            let error_msg = format!("Redis PING返回异常: {response}");
            error!("{}", error_msg);
            Err(SchedulerError::store(error_msg))
        }
    }
}
