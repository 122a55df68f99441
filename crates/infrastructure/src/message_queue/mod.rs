pub mod factory;
pub mod in_memory;
pub mod redis_stream;

pub use factory::MessageQueueFactory;
pub use in_memory::{InMemoryMessageQueue, InMemoryQueueConfig, QueueStats};
pub use redis_stream::{RedisStreamConfig, RedisStreamMessageQueue};
