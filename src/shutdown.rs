use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

/// 关闭信号广播
///
/// Dispatcher、Worker和API各自持有一个接收端；关闭后新订阅的接收端立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.is_shutdown() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.shutdown_tx.subscribe()
    }

    /// 触发关闭，重复调用无效果
    pub fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("关闭信号已发送过");
            return;
        }

        let receivers = self.shutdown_tx.receiver_count();
        // 没有接收者时发送失败，可以忽略
        let _ = self.shutdown_tx.send(());
        info!("关闭信号已发送给 {} 个组件", receivers);
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_all_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        let mut dispatcher_rx = manager.subscribe();
        let mut worker_rx = manager.subscribe();

        assert!(!manager.is_shutdown());
        manager.shutdown();

        assert!(timeout(Duration::from_millis(100), dispatcher_rx.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), worker_rx.recv()).await.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_fires_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let mut rx = manager.subscribe();
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_double_shutdown_sends_once() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();

        manager.shutdown();
        manager.clone().shutdown();

        assert!(rx.recv().await.is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_resubscribed_receiver_sees_signal() {
        let manager = ShutdownManager::new();
        let rx = manager.subscribe();
        let mut child = rx.resubscribe();

        let waiter = tokio::spawn(async move { child.recv().await.is_ok() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.shutdown();

        assert!(timeout(Duration::from_millis(100), waiter).await.unwrap().unwrap());
    }
}
