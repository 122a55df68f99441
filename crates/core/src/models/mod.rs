//! # 数据模型
//!
//! 生日提醒系统的核心数据结构。
//!
//! - [`Person`] 存储中的用户记录，核心只读取并推进其中的 `next_occurrence_utc` 与
//!   `last_notified_year` 两个字段
//! - [`WorkItem`] 扫描时刻的用户快照，作为消息体经分发通道传递
//! - [`Message`] 分发通道上的消息信封
//!
//! 所有时间字段均为 `DateTime<Utc>`，本地时间只在计算下一次生日时出现。

pub mod message;
pub mod person;

pub use message::*;
pub use person::*;
