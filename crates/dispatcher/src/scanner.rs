use std::sync::Arc;
use std::time::Instant;

use birthday_core::models::{Message, WorkItem};
use birthday_core::traits::{MessageQueue, PersonRepository};
use birthday_core::{current_year, NotifierError, NotifierResult};
use birthday_infrastructure::MetricsCollector;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// 一次扫描周期的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// 范围查询返回的记录数
    pub candidates: usize,
    /// 因本年度已通知被本地过滤掉的记录数
    pub filtered: usize,
    pub dispatched: usize,
    pub failed: usize,
}

impl ScanReport {
    pub fn is_noop(&self) -> bool {
        self.dispatched == 0 && self.failed == 0
    }
}

pub struct DueItemScanner {
    repository: Arc<dyn PersonRepository>,
    message_queue: Arc<dyn MessageQueue>,
    queue_name: String,
    buffer: Duration,
    metrics: Arc<MetricsCollector>,
}

impl DueItemScanner {
    pub fn new(
        repository: Arc<dyn PersonRepository>,
        message_queue: Arc<dyn MessageQueue>,
        queue_name: String,
        buffer: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            repository,
            message_queue,
            queue_name,
            buffer,
            metrics,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// 以给定参考时刻执行一次扫描
    ///
    /// 存储不可用时整个周期失败；单条消息投递失败只计数，已投递的消息不回滚。
    pub async fn scan(&self, reference: DateTime<Utc>) -> NotifierResult<ScanReport> {
        let span = info_span!("scan", reference = %reference);
        let start_time = Instant::now();

        let result = self.scan_inner(reference).instrument(span).await;
        let duration = start_time.elapsed().as_secs_f64();

        match &result {
            Ok(report) => {
                self.metrics
                    .record_scan_cycle(report.dispatched as u64, report.failed as u64, duration);
            }
            Err(e) => {
                error!("扫描周期失败: {}", e);
                self.metrics.record_scan_failure(duration);
            }
        }
        result
    }

    async fn scan_inner(&self, reference: DateTime<Utc>) -> NotifierResult<ScanReport> {
        let threshold = reference + self.buffer;
        let year = current_year(reference);
        debug!("开始扫描到期用户，阈值: {}，当前年份: {}", threshold, year);

        let candidates = self.repository.find_due(threshold).await?;
        let mut report = ScanReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        // 范围索引只能表达时间条件，年份条件在本地过滤
        let due: Vec<_> = candidates
            .into_iter()
            .filter(|person| person.last_notified_year < year)
            .collect();
        report.filtered = report.candidates - due.len();

        if due.is_empty() {
            debug!("本周期没有到期用户");
            return Ok(report);
        }

        for person in &due {
            let item = WorkItem::from(person);
            let published = match Message::work_item(&item) {
                Ok(message) => self.message_queue.publish_message(&self.queue_name, &message).await,
                Err(e) => Err(e),
            };

            match published {
                Ok(()) => {
                    debug!("用户 {} 已投递到队列 {}", person.id, self.queue_name);
                    report.dispatched += 1;
                }
                Err(e) => {
                    warn!("用户 {} 投递失败: {}", person.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.dispatched == 0 {
            return Err(NotifierError::MessageQueue(format!(
                "{} 条到期消息全部投递失败",
                report.failed
            )));
        }

        info!(
            candidates = report.candidates,
            filtered = report.filtered,
            dispatched = report.dispatched,
            failed = report.failed,
            "扫描周期完成"
        );
        Ok(report)
    }
}
