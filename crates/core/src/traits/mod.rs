//! 核心抽象接口
//!
//! 存储、分发通道、幂等缓存和通知出口都通过这里的trait接入，
//! 调度器与消费者只依赖trait，具体实现位于 infrastructure crate。

pub mod idempotency;
pub mod message_queue;
pub mod notification;
pub mod repository;

pub use idempotency::*;
pub use message_queue::*;
pub use notification::*;
pub use repository::*;
