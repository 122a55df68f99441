use std::sync::Arc;
use std::time::Duration;

use birthday_core::{Clock, NotifierResult};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::scanner::{DueItemScanner, ScanReport};

/// 周期性驱动扫描器
///
/// 每个tick只从时钟读取一次参考时刻，整个周期内的年份判断都基于该时刻。
pub struct DispatcherService {
    scanner: Arc<DueItemScanner>,
    clock: Arc<dyn Clock>,
    scan_interval: Duration,
}

impl DispatcherService {
    pub fn new(scanner: Arc<DueItemScanner>, clock: Arc<dyn Clock>, scan_interval: Duration) -> Self {
        Self {
            scanner,
            clock,
            scan_interval,
        }
    }

    /// 执行一次扫描
    pub async fn run_once(&self) -> NotifierResult<ScanReport> {
        let reference = self.clock.now();
        self.scanner.scan(reference).await
    }

    /// 运行扫描循环直到收到关闭信号
    ///
    /// 单个周期失败只记录日志，下一个周期重新开始。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "扫描循环启动，间隔 {:?}，队列: {}",
            self.scan_interval,
            self.scanner.queue_name()
        );

        let mut interval = tokio::time::interval(self.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("扫描周期失败，等待下一周期重试: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("扫描循环收到关闭信号");
                    break;
                }
            }
        }
    }
}
