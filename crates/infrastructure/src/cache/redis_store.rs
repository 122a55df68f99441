use std::time::Duration;

use async_trait::async_trait;
use birthday_core::traits::IdempotencyStore;
use birthday_core::{NotifierError, NotifierResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, error, info, instrument};

/// 基于Redis的幂等标记存储，多个worker进程共享
///
/// 写入使用 `SET key 1 NX EX ttl`，已有标记时不会覆盖也不会延长过期时间。
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn new(redis_url: &str) -> NotifierResult<Self> {
        info!("Creating Redis idempotency store with URL: {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| NotifierError::Cache(e.to_string()))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| NotifierError::Cache(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| NotifierError::Cache(e.to_string()))?;

        info!("Redis idempotency store created successfully");
        Ok(Self { conn })
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> NotifierResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| {
            error!("Idempotency EXISTS failed for key {}: {}", key, e);
            NotifierError::Cache(e.to_string())
        })
    }

    #[instrument(skip(self))]
    async fn set_marker(&self, key: &str, ttl: Duration) -> NotifierResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Idempotency SET failed for key {}: {}", key, e);
                NotifierError::Cache(e.to_string())
            })?;

        let created = reply.is_some();
        debug!("Idempotency SET NX {}: created={}", key, created);
        Ok(created)
    }
}
