use std::time::Duration;

use async_trait::async_trait;

use crate::NotifierResult;

/// 短期幂等标记存储
///
/// 只用于抑制同一处理窗口内的重复投递，权威的年度状态保存在用户记录中。
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// 标记是否存在且未过期
    async fn exists(&self, key: &str) -> NotifierResult<bool>;

    /// 写入标记，`ttl` 后自动过期
    ///
    /// 返回 `false` 表示标记已存在（未覆盖）。
    async fn set_marker(&self, key: &str, ttl: Duration) -> NotifierResult<bool>;
}
