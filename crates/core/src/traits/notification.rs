use async_trait::async_trait;

use crate::NotifierResult;

/// 通知出口
///
/// 实现方负责自身的超时控制，超时与失败同样返回 `NotifierError::Notification`。
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str) -> NotifierResult<()>;

    /// 出口名称，用于日志
    fn name(&self) -> &str;
}
