use std::time::Duration;

use async_trait::async_trait;
use recon_core::traits::{CompletionEvent, CompletionNotifier};
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{debug, info};

/// 只写日志的通知方式，未配置Webhook时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn notify(&self, event: &CompletionEvent) -> SchedulerResult<()> {
        info!(
            task_id = %event.task_id,
            workspace_id = %event.workspace_id,
            status = %event.status,
            duration = event.duration.as_deref().unwrap_or("-"),
            asset_count = event.asset_count,
            vul_count = event.vul_count,
            "任务完成: {}",
            event.task_name
        );
        Ok(())
    }
}

/// 以JSON POST的形式把完成事件推送到Webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(&self, event: &CompletionEvent) -> SchedulerResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("请求Webhook失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::Notification(format!(
                "Webhook返回错误: HTTP {status} - {body}"
            )));
        }

        debug!("完成通知已发送: task_id={}, url={}", event.task_id, self.url);
        Ok(())
    }
}
