use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use birthday_core::traits::IdempotencyStore;
use birthday_core::NotifierResult;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// 单进程内的幂等标记存储，标记到期后惰性清除
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    markers: Arc<RwLock<HashMap<String, Instant>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的标记数量
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.markers
            .read()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.markers.write().await.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn exists(&self, key: &str) -> NotifierResult<bool> {
        let markers = self.markers.read().await;
        Ok(markers
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn set_marker(&self, key: &str, ttl: Duration) -> NotifierResult<bool> {
        let now = Instant::now();
        let mut markers = self.markers.write().await;

        if markers.get(key).is_some_and(|expires_at| *expires_at > now) {
            debug!("Idempotency marker already present: {}", key);
            return Ok(false);
        }

        markers.insert(key.to_string(), now + ttl);
        debug!("Idempotency marker set: {} (ttl {:?})", key, ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_marker_only_once() {
        let store = InMemoryIdempotencyStore::new();
        let key = "birthday:notification:p-1:2024";

        assert!(!store.exists(key).await.unwrap());
        assert!(store.set_marker(key, Duration::from_secs(60)).await.unwrap());
        assert!(store.exists(key).await.unwrap());
        assert!(!store.set_marker(key, Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_marker_expires_after_ttl() {
        let store = InMemoryIdempotencyStore::new();
        let key = "birthday:notification:p-1:2024";
        let ttl = Duration::from_millis(30);
        store.set_marker(key, ttl).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.exists(key).await.unwrap());
        assert!(store.set_marker(key, ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.purge_expired().await;
        assert!(store.is_empty().await);
    }
}
