use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::occurrence::LeapDayPolicy;

/// 幂等标记的TTL上限，达到一年会与年度状态混为一层
const MAX_MARKER_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

fn validate_url(value: &str, schemes: &[&str], what: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow::anyhow!("{what}不能为空"));
    }

    let parsed = Url::parse(value).map_err(|e| anyhow::anyhow!("{what}格式无效: {value} ({e})"))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(anyhow::anyhow!(
            "{what}协议不受支持: {}，支持的协议: {schemes:?}",
            parsed.scheme()
        ));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(anyhow::anyhow!("{what}缺少主机地址: {value}"));
    }

    Ok(())
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://birthday-notifier.db?mode=rwc".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!("数据库URL必须是SQLite格式: {}", self.url));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 消息队列类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    #[default]
    InMemory,
    RedisStream,
}

/// 消息队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    #[serde(rename = "type")]
    pub r#type: MessageQueueType,
    pub url: String,
    pub queue_name: String,
    pub dead_letter_queue: String,
    pub consumer_group: String,
    /// 投递次数达到该值后转入死信队列
    pub max_retries: u32,
    pub visibility_timeout_seconds: u64,
    pub batch_size: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::InMemory,
            url: "redis://127.0.0.1:6379".to_string(),
            queue_name: "birthday-notifications-queue".to_string(),
            dead_letter_queue: "birthday-notifications-dead-letter-queue".to_string(),
            consumer_group: "birthday-workers".to_string(),
            max_retries: 3,
            visibility_timeout_seconds: 60,
            batch_size: 10,
        }
    }
}

impl MessageQueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("队列名称不能为空"));
        }

        if self.dead_letter_queue.trim().is_empty() {
            return Err(anyhow::anyhow!("死信队列名称不能为空"));
        }

        if self.queue_name == self.dead_letter_queue {
            return Err(anyhow::anyhow!("死信队列不能与通知队列同名"));
        }

        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("最大投递次数必须大于0"));
        }

        if self.visibility_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("消息可见性超时必须大于0"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("批量消费数量必须大于0"));
        }

        if self.r#type == MessageQueueType::RedisStream {
            validate_url(&self.url, &["redis", "rediss"], "Redis URL")?;
            if self.consumer_group.trim().is_empty() {
                return Err(anyhow::anyhow!("消费者组名称不能为空"));
            }
        }

        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub scan_interval_seconds: u64,
    /// 扫描缓冲窗口，吸收时钟与查询延迟
    pub scan_buffer_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_seconds: 60,
            scan_buffer_seconds: 60,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_interval_seconds == 0 {
            return Err(anyhow::anyhow!("扫描间隔必须大于0"));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn scan_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.scan_buffer_seconds as i64)
    }
}

/// Worker配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_id: String,
    pub max_concurrent_deliveries: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: "worker-001".to_string(),
            max_concurrent_deliveries: 10,
            poll_interval_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.max_concurrent_deliveries == 0 {
            return Err(anyhow::anyhow!("最大并发投递数必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 幂等缓存后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyBackend {
    #[default]
    InMemory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub backend: IdempotencyBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub marker_ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            backend: IdempotencyBackend::InMemory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "birthday".to_string(),
            marker_ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl IdempotencyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.marker_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("幂等标记TTL必须大于0"));
        }

        if self.marker_ttl_seconds >= MAX_MARKER_TTL_SECONDS {
            return Err(anyhow::anyhow!(
                "幂等标记TTL必须短于一年，当前为 {} 秒",
                self.marker_ttl_seconds
            ));
        }

        if self.backend == IdempotencyBackend::Redis {
            validate_url(&self.redis_url, &["redis", "rediss"], "幂等缓存Redis URL")?;
        }

        Ok(())
    }

    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_seconds)
    }
}

/// 通知出口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: "http://127.0.0.1:8081/webhook".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl NotificationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_url(&self.webhook_url, &["http", "https"], "Webhook URL")?;

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("通知请求超时必须大于0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// 生日计算规则
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub leap_day_policy: LeapDayPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("API绑定地址格式无效: {}", self.bind_address));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "指标监听地址格式无效: {}",
                self.metrics_bind_address
            ));
        }
        Ok(())
    }
}
