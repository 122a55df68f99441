use std::sync::Arc;

use birthday_core::config::{MessageQueueConfig, MessageQueueType};
use birthday_core::traits::MessageQueue;
use birthday_core::NotifierResult;
use tracing::{debug, info};

use super::{InMemoryMessageQueue, InMemoryQueueConfig, RedisStreamConfig, RedisStreamMessageQueue};

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    /// 按配置创建消息队列，`consumer_name` 用作Redis消费者组内的消费者名称
    pub async fn create(
        config: &MessageQueueConfig,
        consumer_name: &str,
    ) -> NotifierResult<Arc<dyn MessageQueue>> {
        debug!("Creating message queue with type: {:?}", config.r#type);

        let queue: Arc<dyn MessageQueue> = match config.r#type {
            MessageQueueType::InMemory => {
                info!("Initializing in-memory message queue");
                Arc::new(InMemoryMessageQueue::with_config(Self::in_memory_config(config)))
            }
            MessageQueueType::RedisStream => {
                info!("Initializing Redis Stream message queue");
                Arc::new(RedisStreamMessageQueue::new(Self::redis_config(config, consumer_name)).await?)
            }
        };

        queue.create_queue(&config.queue_name).await?;
        queue.create_queue(&config.dead_letter_queue).await?;
        Ok(queue)
    }

    pub fn in_memory_config(config: &MessageQueueConfig) -> InMemoryQueueConfig {
        InMemoryQueueConfig {
            max_retries: config.max_retries,
            visibility_timeout: config.visibility_timeout(),
            dead_letter_queue: Some(config.dead_letter_queue.clone()),
        }
    }

    pub fn redis_config(config: &MessageQueueConfig, consumer_name: &str) -> RedisStreamConfig {
        RedisStreamConfig {
            url: config.url.clone(),
            consumer_group: config.consumer_group.clone(),
            consumer_name: consumer_name.to_string(),
            max_retries: config.max_retries,
            visibility_timeout: config.visibility_timeout(),
            dead_letter_queue: Some(config.dead_letter_queue.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use birthday_core::models::Message;

    #[tokio::test]
    async fn test_create_in_memory_queue_with_declared_queues() {
        let config = MessageQueueConfig::default();
        let queue = MessageQueueFactory::create(&config, "worker-001").await.unwrap();

        assert_eq!(queue.get_queue_size(&config.queue_name).await.unwrap(), 0);
        assert_eq!(queue.get_queue_size(&config.dead_letter_queue).await.unwrap(), 0);

        queue
            .publish_message(&config.queue_name, &Message::new("hello"))
            .await
            .unwrap();
        assert_eq!(queue.get_queue_size(&config.queue_name).await.unwrap(), 1);
    }

    #[test]
    fn test_redis_config_mapping() {
        let config = MessageQueueConfig {
            r#type: MessageQueueType::RedisStream,
            max_retries: 5,
            ..Default::default()
        };
        let redis = MessageQueueFactory::redis_config(&config, "worker-007");
        assert_eq!(redis.consumer_name, "worker-007");
        assert_eq!(redis.max_retries, 5);
        assert_eq!(redis.dead_letter_queue.as_deref(), Some(config.dead_letter_queue.as_str()));
    }
}
