//! 幂等标记存储
//!
//! 标记键形如 `{prefix}:notification:{personId}:{year}`，由worker的幂等闸门拼接。

pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemoryIdempotencyStore;
pub use redis_store::RedisIdempotencyStore;
