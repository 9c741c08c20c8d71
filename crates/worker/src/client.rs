use std::time::Duration;

use recon_core::models::{
    CompletionReport, HeartbeatRequest, HeartbeatResponse, PollRequest, PollResult,
    ReportOutcome, WorkerStatusSnapshot,
};
use recon_core::{SchedulerError, SchedulerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 服务端统一响应格式中Worker关心的部分
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

/// 调度服务的HTTP客户端
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl SchedulerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("HTTP客户端创建失败: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn poll(&self, worker_name: &str) -> SchedulerResult<PollResult> {
        self.post(
            "/api/v1/worker/task/check",
            &PollRequest {
                worker_name: worker_name.to_string(),
            },
        )
        .await
    }

    pub async fn report(&self, report: &CompletionReport) -> SchedulerResult<ReportOutcome> {
        self.post("/api/v1/worker/task/update", report).await
    }

    pub async fn heartbeat(
        &self,
        worker_name: &str,
        status: &WorkerStatusSnapshot,
    ) -> SchedulerResult<HeartbeatResponse> {
        self.post(
            "/api/v1/worker/heartbeat",
            &HeartbeatRequest {
                worker_name: worker_name.to_string(),
                status: status.clone(),
            },
        )
        .await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> SchedulerResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("请求 {url} 失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), body = %text, "调度服务返回错误");
            return Err(if status.is_client_error() {
                SchedulerError::InvalidTaskParams(format!("HTTP {status}: {text}"))
            } else {
                SchedulerError::Network(format!("HTTP {status}: {text}"))
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SchedulerError::Serialization(format!("响应解析失败: {e}")))?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(SchedulerError::Internal(
                envelope
                    .message
                    .unwrap_or_else(|| format!("{path} 返回空结果")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = SchedulerClient::new("http://127.0.0.1:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: Envelope<PollResult> = serde_json::from_str(
            r#"{"success":true,"data":{"found":false,"taskId":"","mainTaskId":"","workspaceId":"","taskName":"","config":""},"message":null,"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(envelope.success);
        assert!(!envelope.data.unwrap().found);
    }
}
