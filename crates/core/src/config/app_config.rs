use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::sections::{
    ApiConfig, DatabaseConfig, DispatcherConfig, IdempotencyConfig, MessageQueueConfig,
    NotificationConfig, ObservabilityConfig, ScheduleConfig, WorkerConfig,
};

const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "config/notifier.toml",
    "notifier.toml",
    "/etc/birthday-notifier/config.toml",
];

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub idempotency: IdempotencyConfig,
    pub notification: NotificationConfig,
    pub schedule: ScheduleConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 内置默认值
    /// 2. 配置文件（TOML），未指定路径时依次尝试默认位置，都不存在则只用默认值
    /// 3. 环境变量覆盖（前缀 `NOTIFIER_`）
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
            Environment::with_prefix("NOTIFIER")
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

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.message_queue
            .validate()
            .context("消息队列配置验证失败")?;
        self.dispatcher.validate().context("调度器配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.idempotency
            .validate()
            .context("幂等缓存配置验证失败")?;
        self.notification
            .validate()
            .context("通知配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdempotencyBackend, MessageQueueType};
    use crate::occurrence::LeapDayPolicy;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.scan_buffer_seconds, 60);
        assert_eq!(config.idempotency.marker_ttl_seconds, 86_400);
        assert_eq!(config.message_queue.queue_name, "birthday-notifications-queue");
        assert_eq!(config.schedule.leap_day_policy, LeapDayPolicy::Feb28);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
[message_queue]
type = "redis_stream"
url = "redis://cache:6379"

[idempotency]
backend = "redis"
redis_url = "redis://cache:6379/1"

[schedule]
leap_day_policy = "mar1"
"#,
        )
        .unwrap();

        assert_eq!(config.message_queue.r#type, MessageQueueType::RedisStream);
        assert_eq!(config.message_queue.batch_size, 10);
        assert_eq!(config.idempotency.backend, IdempotencyBackend::Redis);
        assert_eq!(config.schedule.leap_day_policy, LeapDayPolicy::Mar1);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_year_long_marker_ttl_is_rejected() {
        let mut config = AppConfig::default();
        config.idempotency.marker_ttl_seconds = 365 * 24 * 60 * 60;
        assert!(config.validate().is_err());

        config.idempotency.marker_ttl_seconds = 2 * 24 * 60 * 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.dispatcher.scan_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.message_queue.queue_name = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.notification.webhook_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/db".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.worker.worker_id, config.worker.worker_id);
        assert_eq!(parsed.notification.webhook_url, config.notification.webhook_url);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/notifier.toml")).is_err());
    }
}
