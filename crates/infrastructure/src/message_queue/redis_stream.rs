//! 基于 Redis Streams 的消息队列
//!
//! 每个队列对应一个Stream，消费者通过消费者组读取（`XREADGROUP`）。
//! 确认时 `XACK` 并删除条目；拒绝重投时以递增的投递次数重新 `XADD`；
//! 长时间未确认的条目（消费者崩溃等）通过 `XAUTOCLAIM` 认领后重新投递。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use birthday_core::models::Message;
use birthday_core::traits::MessageQueue;
use birthday_core::{NotifierError, NotifierResult};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, FromRedisValue};
use tracing::{debug, info, instrument, warn};

const FIELD_MESSAGE_ID: &str = "message_id";
const FIELD_DATA: &str = "data";

#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    pub url: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub max_retries: u32,
    /// 条目在待确认列表中停留超过该时长即视为丢失，可被重新认领
    pub visibility_timeout: Duration,
    pub dead_letter_queue: Option<String>,
}

pub struct RedisStreamMessageQueue {
    conn: ConnectionManager,
    config: RedisStreamConfig,
    /// 消息ID -> (队列名, Stream条目ID, 消息)
    message_id_mapping: Arc<Mutex<HashMap<String, (String, String, Message)>>>,
}

impl RedisStreamMessageQueue {
    pub async fn new(config: RedisStreamConfig) -> NotifierResult<Self> {
        info!(
            "Connecting Redis Stream message queue at {} (group: {}, consumer: {})",
            config.url, config.consumer_group, config.consumer_name
        );

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| NotifierError::MessageQueue(format!("创建Redis客户端失败: {e}")))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| NotifierError::MessageQueue(format!("连接Redis失败: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| NotifierError::MessageQueue(format!("Redis PING失败: {e}")))?;

        Ok(Self {
            conn,
            config,
            message_id_mapping: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn queue_error(action: &str, queue: &str, e: redis::RedisError) -> NotifierError {
        NotifierError::MessageQueue(format!("{action} ({queue}) 失败: {e}"))
    }

    async fn ensure_consumer_group(&self, queue: &str) -> NotifierResult<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<String> = conn
            .xgroup_create_mkstream(queue, &self.config.consumer_group, "0")
            .await;

        match result {
            Ok(_) => {
                debug!(
                    "Created consumer group {} for stream {}",
                    self.config.consumer_group, queue
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(Self::queue_error("创建消费者组", queue, e)),
        }
    }

    async fn append(&self, queue: &str, message: &Message) -> NotifierResult<String> {
        let data = message.serialize()?;
        let mut conn = self.conn.clone();
        conn.xadd(
            queue,
            "*",
            &[(FIELD_MESSAGE_ID, message.id.as_str()), (FIELD_DATA, data.as_str())],
        )
        .await
        .map_err(|e| Self::queue_error("XADD", queue, e))
    }

    /// 确认并删除Stream条目
    async fn remove_entry(&self, queue: &str, stream_id: &str) -> NotifierResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(queue, &self.config.consumer_group, &[stream_id])
            .await
            .map_err(|e| Self::queue_error("XACK", queue, e))?;
        let _: i64 = conn
            .xdel(queue, &[stream_id])
            .await
            .map_err(|e| Self::queue_error("XDEL", queue, e))?;
        Ok(())
    }

    /// 失败投递后的去向：重新入队或转入死信队列
    async fn redeliver(&self, queue: &str, mut message: Message) -> NotifierResult<()> {
        message.increment_retry();
        if !message.is_retry_exhausted(self.config.max_retries) {
            self.append(queue, &message).await?;
            return Ok(());
        }

        match &self.config.dead_letter_queue {
            Some(dlq) if dlq != queue => {
                warn!(
                    "Message {} exhausted {} deliveries, moving to dead letter stream '{}'",
                    message.id, self.config.max_retries, dlq
                );
                self.append(dlq, &message).await?;
            }
            _ => warn!(
                "Message {} exhausted {} deliveries, dropping",
                message.id, self.config.max_retries
            ),
        }
        Ok(())
    }

    fn parse_entry(entry: &StreamId) -> Option<Message> {
        let data: String = entry.get(FIELD_DATA)?;
        match Message::deserialize(&data) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping undecodable stream entry {}: {}", entry.id, e);
                None
            }
        }
    }

    /// 认领闲置超时的待确认条目并重新投递
    async fn reclaim_stale(&self, queue: &str, count: usize) -> NotifierResult<()> {
        let mut conn = self.conn.clone();
        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(queue)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::queue_error("XAUTOCLAIM", queue, e))?;

        let claimed = match &reply {
            redis::Value::Array(parts) if parts.len() >= 2 => {
                StreamRangeReply::from_redis_value(&parts[1])
                    .map_err(|e| Self::queue_error("解析XAUTOCLAIM", queue, e))?
                    .ids
            }
            _ => Vec::new(),
        };

        for entry in claimed {
            let message = Self::parse_entry(&entry);
            self.remove_entry(queue, &entry.id).await?;
            if let Some(message) = message {
                warn!(
                    "Message {} in stream '{}' exceeded visibility timeout, redelivering",
                    message.id, queue
                );
                self.redeliver(queue, message).await?;
            }
        }
        Ok(())
    }

    fn take_mapping(&self, message_id: &str) -> Option<(String, String, Message)> {
        self.message_id_mapping
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(message_id)
    }
}

#[async_trait]
impl MessageQueue for RedisStreamMessageQueue {
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn publish_message(&self, queue: &str, message: &Message) -> NotifierResult<()> {
        let stream_id = self.append(queue, message).await?;
        debug!("Published message {} to stream '{}' as {}", message.id, queue, stream_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn consume_messages(&self, queue: &str, max_messages: usize) -> NotifierResult<Vec<Message>> {
        self.ensure_consumer_group(queue).await?;
        self.reclaim_stale(queue, max_messages).await?;

        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_name)
            .count(max_messages);
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[queue], &[">"], &options)
            .await
            .map_err(|e| Self::queue_error("XREADGROUP", queue, e))?;

        let mut messages = Vec::new();
        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect::<Vec<_>>())
            .unwrap_or_default();

        for entry in entries {
            match Self::parse_entry(&entry) {
                Some(message) => {
                    self.message_id_mapping
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(
                            message.id.clone(),
                            (queue.to_string(), entry.id.clone(), message.clone()),
                        );
                    messages.push(message);
                }
                // 无法解码的条目直接移除，避免反复认领
                None => self.remove_entry(queue, &entry.id).await?,
            }
        }

        debug!("Consumed {} messages from stream '{}'", messages.len(), queue);
        Ok(messages)
    }

    async fn ack_message(&self, queue: &str, message_id: &str) -> NotifierResult<()> {
        match self.take_mapping(message_id) {
            Some((stream, stream_id, _)) => self.remove_entry(&stream, &stream_id).await,
            None => {
                warn!(
                    "Message {} from stream '{}' not found in mapping (possibly already reclaimed)",
                    message_id, queue
                );
                Ok(())
            }
        }
    }

    async fn nack_message(&self, queue: &str, message_id: &str, requeue: bool) -> NotifierResult<()> {
        let Some((stream, stream_id, message)) = self.take_mapping(message_id) else {
            warn!("Message {} from stream '{}' not found, nack ignored", message_id, queue);
            return Ok(());
        };

        if requeue {
            self.redeliver(&stream, message).await?;
        } else if let Some(dlq) = &self.config.dead_letter_queue {
            self.append(dlq, &message).await?;
        }
        self.remove_entry(&stream, &stream_id).await
    }

    async fn create_queue(&self, queue: &str) -> NotifierResult<()> {
        self.ensure_consumer_group(queue).await?;
        info!("Created stream queue '{}'", queue);
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> NotifierResult<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn
            .del(queue)
            .await
            .map_err(|e| Self::queue_error("DEL", queue, e))?;
        if deleted == 0 {
            warn!("Stream '{}' was not found or already deleted", queue);
        }
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> NotifierResult<u32> {
        let mut conn = self.conn.clone();
        let size: u64 = conn
            .xlen(queue)
            .await
            .map_err(|e| Self::queue_error("XLEN", queue, e))?;
        Ok(size as u32)
    }

    async fn purge_queue(&self, queue: &str) -> NotifierResult<()> {
        self.delete_queue(queue).await?;
        self.ensure_consumer_group(queue).await?;
        info!("Purged stream '{}'", queue);
        Ok(())
    }
}
