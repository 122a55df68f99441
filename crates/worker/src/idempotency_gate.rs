use std::sync::Arc;
use std::time::Duration;

use birthday_core::traits::IdempotencyStore;
use tracing::{debug, warn};

/// 短期去重闸门
///
/// 只用于压制消息重投递造成的重复发送，本年度是否已通知以存储中的
/// `last_notified_year` 为准。缓存不可用时放行。
pub struct IdempotencyGate {
    store: Arc<dyn IdempotencyStore>,
    key_prefix: String,
    ttl: Duration,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn IdempotencyStore>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    pub fn key(&self, person_id: &str, year: i32) -> String {
        format!("{}:notification:{}:{}", self.key_prefix, person_id, year)
    }

    /// 标记是否存在
    pub async fn is_handled(&self, person_id: &str, year: i32) -> bool {
        let key = self.key(person_id, year);
        match self.store.exists(&key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("幂等缓存不可用，按未处理继续: {} ({})", key, e);
                false
            }
        }
    }

    /// 写入标记，失败只记录日志
    pub async fn mark_handled(&self, person_id: &str, year: i32) {
        let key = self.key(person_id, year);
        match self.store.set_marker(&key, self.ttl).await {
            Ok(true) => debug!("写入幂等标记: {}", key),
            Ok(false) => debug!("幂等标记已存在: {}", key),
            Err(e) => warn!("写入幂等标记失败: {} ({})", key, e),
        }
    }
}
