use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储操作错误: {0}")]
    Store(String),

    #[error("任务未找到: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Worker未找到: {name}")]
    WorkerNotFound { name: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl SchedulerError {
    pub fn store<S: Into<String>>(msg: S) -> Self {
        SchedulerError::Store(msg.into())
    }

    pub fn task_not_found<S: Into<String>>(task_id: S) -> Self {
        SchedulerError::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        SchedulerError::InvalidTaskParams(msg.into())
    }

    /// 存储或网络层的瞬时故障。
    ///
    /// 子系统自身从不重试，这里只用于给调用方（Worker、API客户端）一个提示。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_) | SchedulerError::Store(_) | SchedulerError::Network(_)
        )
    }

    /// 面向用户的简短描述
    pub fn user_message(&self) -> String {
        match self {
            SchedulerError::Database(_) | SchedulerError::Store(_) => {
                "存储服务暂时不可用，请稍后重试".to_string()
            }
            SchedulerError::Network(_) => "网络连接异常，请稍后重试".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SchedulerError::store("timeout").is_retryable());
        assert!(SchedulerError::Network("reset".into()).is_retryable());
        assert!(!SchedulerError::invalid_params("empty worker").is_retryable());
        assert!(!SchedulerError::task_not_found("t1").is_retryable());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: SchedulerError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }

    #[test]
    fn test_user_message_hides_store_details() {
        let err = SchedulerError::store("connection refused 10.0.0.3:6379");
        assert!(!err.user_message().contains("10.0.0.3"));
        assert_eq!(
            SchedulerError::task_not_found("t9").user_message(),
            "任务未找到: t9"
        );
    }
}
