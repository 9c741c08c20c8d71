pub mod api_observability;
pub mod app_config;
pub mod scheduling;
pub mod storage;

pub use api_observability::{ApiConfig, NotifyConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use scheduling::{DispatcherConfig, HeartbeatConfig, RecoveryConfig};
pub use storage::{DatabaseConfig, RedisConfig, StorageBackend, StorageConfig};
