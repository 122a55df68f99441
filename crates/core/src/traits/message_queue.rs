use async_trait::async_trait;

use crate::{models::Message, NotifierResult};

/// 消息队列抽象接口
///
/// 语义为至少一次投递：消费出的消息在确认前处于处理中状态，
/// 拒绝（requeue）或超时未确认的消息会被重新投递，可能重复、可能乱序。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(&self, queue: &str, message: &Message) -> NotifierResult<()>;

    /// 从指定队列批量消费消息，最多返回 `max_messages` 条
    async fn consume_messages(&self, queue: &str, max_messages: usize) -> NotifierResult<Vec<Message>>;

    /// 确认消息处理完成
    async fn ack_message(&self, queue: &str, message_id: &str) -> NotifierResult<()>;

    /// 报告消息处理失败，`requeue` 为真时重新入队
    async fn nack_message(&self, queue: &str, message_id: &str, requeue: bool) -> NotifierResult<()>;

    /// 创建队列
    async fn create_queue(&self, queue: &str) -> NotifierResult<()>;

    /// 删除队列
    async fn delete_queue(&self, queue: &str) -> NotifierResult<()>;

    /// 获取队列中待消费的消息数量
    async fn get_queue_size(&self, queue: &str) -> NotifierResult<u32>;

    /// 清空队列
    async fn purge_queue(&self, queue: &str) -> NotifierResult<()>;
}
