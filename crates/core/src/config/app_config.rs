use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, NotifyConfig, ObservabilityConfig},
    scheduling::{DispatcherConfig, HeartbeatConfig, RecoveryConfig},
    storage::{DatabaseConfig, RedisConfig, StorageConfig},
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/recon.toml",
    "recon.toml",
    "/etc/recon/config.toml",
];

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub heartbeat: HeartbeatConfig,
    pub recovery: RecoveryConfig,
    pub notify: NotifyConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 内置默认值
    /// 2. 配置文件（TOML），未指定路径时依次尝试默认路径
    /// 3. 环境变量覆盖（前缀 `RECON_`，层级分隔符 `__`，例如 `RECON_DISPATCHER__MAX_SKIP`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("RECON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为TOML字符串
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.redis.validate().context("Redis配置验证失败")?;
        self.database.validate().context("数据库配置验证失败")?;
        self.dispatcher.validate().context("调度器配置验证失败")?;
        self.heartbeat.validate().context("心跳配置验证失败")?;
        self.recovery.validate().context("任务恢复配置验证失败")?;
        self.notify.validate().context("通知配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}
