//! 基础设施层
//!
//! 核心trait的具体实现：SQLite用户存储、内存与Redis Stream消息队列、
//! 内存与Redis幂等标记存储、Webhook通知出口以及指标采集。

pub mod cache;
pub mod database;
pub mod message_queue;
pub mod notification;
pub mod observability;

pub use cache::{InMemoryIdempotencyStore, RedisIdempotencyStore};
pub use database::{DatabaseManager, SqlitePersonRepository};
pub use message_queue::{
    InMemoryMessageQueue, InMemoryQueueConfig, MessageQueueFactory, QueueStats, RedisStreamConfig,
    RedisStreamMessageQueue,
};
pub use notification::WebhookNotificationSink;
pub use observability::MetricsCollector;
