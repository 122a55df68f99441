//! 应用配置
//!
//! 配置来源按优先级从低到高：内置默认值、TOML配置文件、`NOTIFIER_` 前缀的环境变量
//! （嵌套字段使用 `__` 分隔，例如 `NOTIFIER_DATABASE__URL`）。

mod app_config;
mod sections;

pub use app_config::AppConfig;
pub use sections::*;
