use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use birthday_core::models::Message;
use birthday_core::traits::MessageQueue;
use birthday_core::{NotifierError, NotifierResult};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 内存消息队列实现
///
/// 使用 Tokio channels 实现进程内的至少一次投递队列。消费出的消息进入处理中列表，
/// 确认后才真正移除；拒绝（requeue）或超过可见性超时未确认的消息会以递增的
/// 投递次数重新入队，投递次数用尽后转入死信队列。
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    /// 队列存储：队列名 -> 通道
    queues: Arc<RwLock<HashMap<String, QueueChannels>>>,
    /// 处理中的消息：消息ID -> 所属队列与截止时间
    in_flight: Arc<Mutex<HashMap<String, InFlightMessage>>>,
    config: InMemoryQueueConfig,
}

#[derive(Debug)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    /// 待消费消息数
    size: Arc<AtomicU32>,
    created_at: Instant,
}

#[derive(Debug)]
struct InFlightMessage {
    queue: String,
    message: Message,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct InMemoryQueueConfig {
    /// 投递次数达到该值后不再重新入队
    pub max_retries: u32,
    /// 消费后未确认的消息在此时长后重新可见
    pub visibility_timeout: Duration,
    /// 死信队列名称，`None` 时直接丢弃
    pub dead_letter_queue: Option<String>,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            visibility_timeout: Duration::from_secs(60),
            dead_letter_queue: None,
        }
    }
}

/// 队列统计
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub total_queues: usize,
    pub pending_messages: usize,
    pub in_flight_messages: usize,
    pub queue_details: Vec<QueueDetail>,
}

#[derive(Debug, Clone)]
pub struct QueueDetail {
    pub name: String,
    pub size: usize,
    pub age: Duration,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_config(InMemoryQueueConfig::default())
    }

    pub fn with_config(config: InMemoryQueueConfig) -> Self {
        info!("Creating in-memory message queue with config: {:?}", config);
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub async fn get_queue_stats(&self) -> QueueStats {
        let queues = self.queues.read().await;
        let mut stats = QueueStats {
            in_flight_messages: self.in_flight.lock().await.len(),
            ..Default::default()
        };

        for (name, channels) in queues.iter() {
            let size = channels.size.load(Ordering::Relaxed) as usize;
            stats.total_queues += 1;
            stats.pending_messages += size;
            stats.queue_details.push(QueueDetail {
                name: name.clone(),
                size,
                age: channels.created_at.elapsed(),
            });
        }

        stats
    }

    /// 获取或创建队列通道
    async fn get_or_create_queue(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        if !queues.contains_key(queue_name) {
            let (sender, receiver) = mpsc::unbounded_channel();
            queues.insert(
                queue_name.to_string(),
                QueueChannels {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                    size: Arc::new(AtomicU32::new(0)),
                    created_at: Instant::now(),
                },
            );
            info!("Created queue '{}'", queue_name);
        }
    }

    async fn enqueue(&self, queue: &str, message: Message) -> NotifierResult<()> {
        self.get_or_create_queue(queue).await;
        let queues = self.queues.read().await;
        let channels = queues
            .get(queue)
            .ok_or_else(|| NotifierError::MessageQueue(format!("Queue '{queue}' not found")))?;

        channels.sender.send(message).map_err(|e| {
            NotifierError::MessageQueue(format!("Failed to send message to queue '{queue}': {e}"))
        })?;
        channels.size.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// 一次失败投递之后的去向：重新入队或转入死信队列
    async fn redeliver(&self, queue: &str, mut message: Message) -> NotifierResult<()> {
        message.increment_retry();
        if !message.is_retry_exhausted(self.config.max_retries) {
            debug!(
                "Requeueing message {} to '{}' (retry {})",
                message.id, queue, message.retry_count
            );
            return self.enqueue(queue, message).await;
        }

        match &self.config.dead_letter_queue {
            Some(dlq) if dlq != queue => {
                warn!(
                    "Message {} exhausted {} deliveries, moving to dead letter queue '{}'",
                    message.id, self.config.max_retries, dlq
                );
                self.enqueue(dlq, message).await
            }
            _ => {
                warn!(
                    "Message {} exhausted {} deliveries, dropping",
                    message.id, self.config.max_retries
                );
                Ok(())
            }
        }
    }

    /// 回收超过可见性超时仍未确认的消息
    async fn reclaim_expired(&self, queue: &str) -> NotifierResult<()> {
        let now = Instant::now();
        let expired: Vec<Message> = {
            let mut in_flight = self.in_flight.lock().await;
            let expired_ids: Vec<String> = in_flight
                .iter()
                .filter(|(_, entry)| entry.queue == queue && entry.deadline <= now)
                .map(|(id, _)| id.clone())
                .collect();
            expired_ids
                .iter()
                .filter_map(|id| in_flight.remove(id))
                .map(|entry| entry.message)
                .collect()
        };

        for message in expired {
            warn!(
                "Message {} in queue '{}' exceeded visibility timeout, redelivering",
                message.id, queue
            );
            self.redeliver(queue, message).await?;
        }
        Ok(())
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> NotifierResult<()> {
        debug!("Publishing message to queue '{}': {}", queue, message.id);
        self.enqueue(queue, message.clone()).await
    }

    async fn consume_messages(&self, queue: &str, max_messages: usize) -> NotifierResult<Vec<Message>> {
        self.get_or_create_queue(queue).await;
        self.reclaim_expired(queue).await?;

        let (receiver, size) = {
            let queues = self.queues.read().await;
            let channels = queues
                .get(queue)
                .ok_or_else(|| NotifierError::MessageQueue(format!("Queue '{queue}' not found")))?;
            (channels.receiver.clone(), channels.size.clone())
        };

        let mut messages = Vec::new();
        {
            let mut rx = receiver.lock().await;
            while messages.len() < max_messages {
                match rx.try_recv() {
                    Ok(message) => messages.push(message),
                    Err(_) => break,
                }
            }
        }

        if !messages.is_empty() {
            size.fetch_sub(messages.len() as u32, Ordering::Relaxed);
            let deadline = Instant::now() + self.config.visibility_timeout;
            let mut in_flight = self.in_flight.lock().await;
            for message in &messages {
                in_flight.insert(
                    message.id.clone(),
                    InFlightMessage {
                        queue: queue.to_string(),
                        message: message.clone(),
                        deadline,
                    },
                );
            }
            debug!("Consumed {} messages from queue '{}'", messages.len(), queue);
        }

        Ok(messages)
    }

    async fn ack_message(&self, queue: &str, message_id: &str) -> NotifierResult<()> {
        if self.in_flight.lock().await.remove(message_id).is_some() {
            debug!("Acknowledged message {} from queue '{}'", message_id, queue);
        } else {
            warn!(
                "Message {} is not in flight (possibly already redelivered)",
                message_id
            );
        }
        Ok(())
    }

    async fn nack_message(&self, queue: &str, message_id: &str, requeue: bool) -> NotifierResult<()> {
        let entry = self.in_flight.lock().await.remove(message_id);
        let Some(entry) = entry else {
            warn!("Message {} is not in flight, nack ignored", message_id);
            return Ok(());
        };

        debug!(
            "Negative acknowledging message {} from queue '{}' (requeue: {})",
            message_id, queue, requeue
        );

        if requeue {
            self.redeliver(&entry.queue, entry.message).await
        } else if let Some(dlq) = &self.config.dead_letter_queue {
            self.enqueue(dlq, entry.message).await
        } else {
            Ok(())
        }
    }

    async fn create_queue(&self, queue: &str) -> NotifierResult<()> {
        self.get_or_create_queue(queue).await;
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> NotifierResult<()> {
        info!("Deleting queue '{}'", queue);
        if self.queues.write().await.remove(queue).is_none() {
            warn!("Queue '{}' not found for deletion", queue);
        }
        self.in_flight
            .lock()
            .await
            .retain(|_, entry| entry.queue != queue);
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> NotifierResult<u32> {
        let queues = self.queues.read().await;
        queues
            .get(queue)
            .map(|channels| channels.size.load(Ordering::Relaxed))
            .ok_or_else(|| NotifierError::MessageQueue(format!("Queue '{queue}' not found")))
    }

    async fn purge_queue(&self, queue: &str) -> NotifierResult<()> {
        let (receiver, size) = {
            let queues = self.queues.read().await;
            let channels = queues
                .get(queue)
                .ok_or_else(|| NotifierError::MessageQueue(format!("Queue '{queue}' not found")))?;
            (channels.receiver.clone(), channels.size.clone())
        };

        let mut purged_count = 0;
        {
            let mut rx = receiver.lock().await;
            while rx.try_recv().is_ok() {
                purged_count += 1;
            }
        }
        size.store(0, Ordering::Relaxed);

        info!("Purged {} messages from queue '{}'", purged_count, queue);
        Ok(())
    }
}
