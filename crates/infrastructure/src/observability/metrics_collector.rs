//! 通知流水线指标
//!
//! 通过 `metrics` 门面记录，未安装recorder时所有记录均为空操作。

use metrics::{counter, histogram, Counter, Histogram};
use tracing::debug;

/// 扫描与投递两侧共用的指标集合
#[derive(Clone)]
pub struct MetricsCollector {
    // 扫描侧
    scan_cycles_total: Counter,
    scan_failures_total: Counter,
    items_dispatched_total: Counter,
    dispatch_failures_total: Counter,
    scan_duration: Histogram,

    // 投递侧
    notifications_sent_total: Counter,
    notification_failures_total: Counter,
    duplicates_suppressed_total: Counter,
    malformed_items_total: Counter,
    missing_persons_total: Counter,
    stale_items_total: Counter,
    delivery_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            scan_cycles_total: counter!("notifier_scan_cycles_total"),
            scan_failures_total: counter!("notifier_scan_failures_total"),
            items_dispatched_total: counter!("notifier_items_dispatched_total"),
            dispatch_failures_total: counter!("notifier_dispatch_failures_total"),
            scan_duration: histogram!("notifier_scan_duration_seconds"),
            notifications_sent_total: counter!("notifier_notifications_sent_total"),
            notification_failures_total: counter!("notifier_notification_failures_total"),
            duplicates_suppressed_total: counter!("notifier_duplicates_suppressed_total"),
            malformed_items_total: counter!("notifier_malformed_items_total"),
            missing_persons_total: counter!("notifier_missing_persons_total"),
            stale_items_total: counter!("notifier_stale_items_total"),
            delivery_duration: histogram!("notifier_delivery_duration_seconds"),
        }
    }

    /// 记录一次完成的扫描周期
    pub fn record_scan_cycle(&self, dispatched: u64, publish_failures: u64, duration_seconds: f64) {
        self.scan_cycles_total.increment(1);
        self.items_dispatched_total.increment(dispatched);
        self.dispatch_failures_total.increment(publish_failures);
        self.scan_duration.record(duration_seconds);
        debug!(
            dispatched = dispatched,
            publish_failures = publish_failures,
            duration_seconds = duration_seconds,
            "Scan cycle recorded"
        );
    }

    /// 整个周期失败（存储或通道不可用）
    pub fn record_scan_failure(&self, duration_seconds: f64) {
        self.scan_cycles_total.increment(1);
        self.scan_failures_total.increment(1);
        self.scan_duration.record(duration_seconds);
    }

    pub fn record_notification_sent(&self, duration_seconds: f64) {
        self.notifications_sent_total.increment(1);
        self.delivery_duration.record(duration_seconds);
    }

    pub fn record_notification_failure(&self, duration_seconds: f64) {
        self.notification_failures_total.increment(1);
        self.delivery_duration.record(duration_seconds);
    }

    pub fn record_duplicate_suppressed(&self) {
        self.duplicates_suppressed_total.increment(1);
    }

    pub fn record_malformed_item(&self) {
        self.malformed_items_total.increment(1);
    }

    pub fn record_missing_person(&self) {
        self.missing_persons_total.increment(1);
    }

    /// 投递时存储中的记录已不再到期
    pub fn record_stale_item(&self) {
        self.stale_items_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
