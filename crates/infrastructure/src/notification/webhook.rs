use std::time::Duration;

use async_trait::async_trait;
use birthday_core::config::NotificationConfig;
use birthday_core::traits::NotificationSink;
use birthday_core::{NotifierError, NotifierResult};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
}

/// 以HTTP POST把通知推送到外部webhook
///
/// 非2xx响应、传输错误和超时统一视为发送失败，由消息重投递负责重试。
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotificationSink {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> NotifierResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    pub fn from_config(config: &NotificationConfig) -> NotifierResult<Self> {
        Self::new(config.webhook_url.clone(), config.request_timeout())
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, message: &str) -> NotifierResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&WebhookPayload { message })
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "请求超时" } else { "请求失败" };
                warn!("Webhook {} {}: {}", self.webhook_url, reason, e);
                NotifierError::Notification(format!("{reason}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook {} responded with {}: {}", self.webhook_url, status, body);
            return Err(NotifierError::Notification(format!(
                "webhook返回状态码 {}",
                status.as_u16()
            )));
        }

        debug!("Webhook delivered ({})", status);
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
