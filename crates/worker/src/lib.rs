//! 通知投递
//!
//! - [`IdempotencyGate`] 以 (personId, year) 为键的短期去重标记
//! - [`DeliveryConsumer`] 单条消息的处理协议：去重检查、发送、提交状态、写标记
//! - [`WorkerService`] 批量拉取消息并发处理，逐条确认或拒绝

pub mod consumer;
pub mod idempotency_gate;
pub mod service;

pub use consumer::{DeliveryConsumer, DeliveryOutcome};
pub use idempotency_gate::IdempotencyGate;
pub use service::{BatchSummary, WorkerService, WorkerSettings};
