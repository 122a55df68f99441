use std::sync::Arc;
use std::time::Duration;

use birthday_core::models::Message;
use birthday_core::traits::MessageQueue;
use birthday_core::{Clock, NotifierResult};
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::consumer::{DeliveryConsumer, DeliveryOutcome};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub queue_name: String,
    pub batch_size: usize,
    pub max_concurrent_deliveries: usize,
    pub poll_interval: Duration,
}

/// 一批消息的处理统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub acked: usize,
    pub requeued: usize,
}

pub struct WorkerService {
    consumer: Arc<DeliveryConsumer>,
    message_queue: Arc<dyn MessageQueue>,
    clock: Arc<dyn Clock>,
    settings: WorkerSettings,
}

impl WorkerService {
    pub fn new(
        consumer: Arc<DeliveryConsumer>,
        message_queue: Arc<dyn MessageQueue>,
        clock: Arc<dyn Clock>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            consumer,
            message_queue,
            clock,
            settings,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.settings.worker_id
    }

    /// 拉取并处理一批消息
    ///
    /// 批内消息并发处理，互不影响；每条消息按处理结果单独确认或重新入队。
    pub async fn poll_once(&self) -> NotifierResult<BatchSummary> {
        let messages = self
            .message_queue
            .consume_messages(&self.settings.queue_name, self.settings.batch_size)
            .await?;
        if messages.is_empty() {
            return Ok(BatchSummary::default());
        }

        let reference = self.clock.now();
        debug!(
            "Worker {} 拉取到 {} 条消息",
            self.settings.worker_id,
            messages.len()
        );

        let deliveries: Vec<_> = messages
            .iter()
            .map(|message| self.process(message, reference))
            .collect();
        let acks: Vec<bool> = stream::iter(deliveries)
            .buffer_unordered(self.settings.max_concurrent_deliveries.max(1))
            .collect()
            .await;

        let acked = acks.iter().filter(|acked| **acked).count();
        Ok(BatchSummary {
            received: messages.len(),
            acked,
            requeued: messages.len() - acked,
        })
    }

    async fn process(&self, message: &Message, reference: chrono::DateTime<chrono::Utc>) -> bool {
        let outcome = self.consumer.handle(message, reference).await;
        let queue = &self.settings.queue_name;
        let ack = outcome.should_ack();

        let settled = if ack {
            self.message_queue.ack_message(queue, &message.id).await
        } else {
            if let DeliveryOutcome::Failed { person_id, error } = &outcome {
                warn!(
                    "用户 {} 的消息 {} 处理失败，重新入队（已重试 {} 次）: {}",
                    person_id, message.id, message.retry_count, error
                );
            }
            self.message_queue.nack_message(queue, &message.id, true).await
        };

        if let Err(e) = settled {
            error!("消息 {} 确认失败 ({}): {}", message.id, outcome.label(), e);
        }
        ack
    }

    /// 运行拉取循环直到收到关闭信号
    ///
    /// 关闭信号只在批次之间检查，正在处理的批次会完整结束。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Worker {} 启动，队列: {}，批大小: {}，并发: {}",
            self.settings.worker_id,
            self.settings.queue_name,
            self.settings.batch_size,
            self.settings.max_concurrent_deliveries
        );

        loop {
            match shutdown_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            let idle = match self.poll_once().await {
                Ok(summary) => summary.received == 0,
                Err(e) => {
                    error!("Worker {} 拉取消息失败: {}", self.settings.worker_id, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
        }

        info!("Worker {} 已停止拉取", self.settings.worker_id);
    }
}
