use std::sync::Arc;
use std::time::Instant;

use birthday_core::models::{Message, WorkItem};
use birthday_core::traits::{NotificationSink, PersonRepository};
use birthday_core::{current_year, NotifierError, OccurrenceCalculator};
use birthday_infrastructure::MetricsCollector;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::idempotency_gate::IdempotencyGate;

/// 单条消息的处理结果
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// 发送成功并已提交状态
    Delivered { person_id: String, year: i32 },
    /// 幂等标记命中，重复投递被压制
    Duplicate { person_id: String },
    /// 存储中本年度已通知
    AlreadyNotified { person_id: String },
    /// 扫描后生日或所在地被修改，存储中的生日时刻尚未到期
    NotDue {
        person_id: String,
        next_occurrence_utc: DateTime<Utc>,
    },
    /// 消息体无法解析，永久丢弃
    Malformed { reason: String },
    /// 用户已被删除
    PersonNotFound { person_id: String },
    /// 处理失败，状态未提交
    Failed { person_id: String, error: NotifierError },
}

impl DeliveryOutcome {
    /// 是否应确认消息；只有可重试的失败需要重新投递
    pub fn should_ack(&self) -> bool {
        match self {
            DeliveryOutcome::Failed { error, .. } => !error.is_retryable(),
            _ => true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Duplicate { .. } => "duplicate",
            DeliveryOutcome::AlreadyNotified { .. } => "already_notified",
            DeliveryOutcome::NotDue { .. } => "not_due",
            DeliveryOutcome::Malformed { .. } => "malformed",
            DeliveryOutcome::PersonNotFound { .. } => "person_not_found",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

pub struct DeliveryConsumer {
    repository: Arc<dyn PersonRepository>,
    sink: Arc<dyn NotificationSink>,
    gate: IdempotencyGate,
    calculator: OccurrenceCalculator,
    scan_buffer: Duration,
    metrics: Arc<MetricsCollector>,
}

impl DeliveryConsumer {
    pub fn new(
        repository: Arc<dyn PersonRepository>,
        sink: Arc<dyn NotificationSink>,
        gate: IdempotencyGate,
        calculator: OccurrenceCalculator,
        scan_buffer: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            repository,
            sink,
            gate,
            calculator,
            scan_buffer,
            metrics,
        }
    }

    /// 处理一条投递消息
    ///
    /// 顺序固定：解析、去重检查、读取最新记录并重新判断是否到期、发送、提交状态、写幂等标记。
    /// `scan_buffer` 与扫描器使用同一缓冲窗口。
    /// 发送失败时既不提交状态也不写标记，重投递可以干净地重试。
    pub async fn handle(&self, message: &Message, reference: DateTime<Utc>) -> DeliveryOutcome {
        let span = info_span!(
            "deliver",
            message_id = %message.id,
            retry_count = message.retry_count
        );
        let outcome = self.handle_inner(message, reference).instrument(span).await;
        self.record(&outcome);
        outcome
    }

    async fn handle_inner(&self, message: &Message, reference: DateTime<Utc>) -> DeliveryOutcome {
        let item = match WorkItem::parse(&message.body) {
            Ok(item) => item,
            Err(e) => {
                warn!("丢弃无法解析的消息 {}: {}", message.id, e);
                return DeliveryOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };
        let person_id = item.person_id.clone();
        let year = current_year(reference);

        if self.gate.is_handled(&person_id, year).await {
            debug!("用户 {} 的 {} 年通知已处理，跳过重复投递", person_id, year);
            return DeliveryOutcome::Duplicate { person_id };
        }

        // 快照可能已过期，以存储中的记录为准
        let person = match self.repository.get_by_id(&person_id).await {
            Ok(Some(person)) => person,
            Ok(None) => {
                warn!("用户 {} 已不存在，丢弃消息", person_id);
                return DeliveryOutcome::PersonNotFound { person_id };
            }
            Err(error) => return DeliveryOutcome::Failed { person_id, error },
        };

        if person.last_notified_year >= year {
            debug!("用户 {} 本年度已通知", person_id);
            return DeliveryOutcome::AlreadyNotified { person_id };
        }

        if !person.is_due(reference, self.scan_buffer) {
            info!(
                "用户 {} 的生日时刻已变更为 {}，丢弃过期的投递",
                person_id, person.next_occurrence_utc
            );
            return DeliveryOutcome::NotDue {
                person_id,
                next_occurrence_utc: person.next_occurrence_utc,
            };
        }

        let send_started = Instant::now();
        let sent = self.sink.send(&person.birthday_message()).await;
        let send_seconds = send_started.elapsed().as_secs_f64();
        if let Err(error) = sent {
            warn!("通过 {} 发送用户 {} 的通知失败: {}", self.sink.name(), person_id, error);
            self.metrics.record_notification_failure(send_seconds);
            return DeliveryOutcome::Failed { person_id, error };
        }
        self.metrics.record_notification_sent(send_seconds);

        // 以被消费的生日时刻为起点推算，同一消息重复提交得到相同结果
        let from = reference.max(item.next_occurrence_utc);
        let next = self
            .calculator
            .next_occurrence_for(&person.birthday, &person.location, from);

        match self.repository.mark_notified(&person_id, year, next).await {
            Ok(()) => {}
            Err(NotifierError::PersonNotFound { .. }) => {
                warn!("用户 {} 在提交前被删除", person_id);
                return DeliveryOutcome::PersonNotFound { person_id };
            }
            Err(error) => {
                error!("用户 {} 通知已发送但状态提交失败: {}", person_id, error);
                return DeliveryOutcome::Failed { person_id, error };
            }
        }

        self.gate.mark_handled(&person_id, year).await;

        info!("用户 {} 的 {} 年生日通知已发送，下一次: {}", person_id, year, next);
        DeliveryOutcome::Delivered { person_id, year }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Duplicate { .. } | DeliveryOutcome::AlreadyNotified { .. } => {
                self.metrics.record_duplicate_suppressed()
            }
            DeliveryOutcome::Malformed { .. } => self.metrics.record_malformed_item(),
            DeliveryOutcome::PersonNotFound { .. } => self.metrics.record_missing_person(),
            DeliveryOutcome::NotDue { .. } => self.metrics.record_stale_item(),
            DeliveryOutcome::Delivered { .. } | DeliveryOutcome::Failed { .. } => {}
        }
    }
}
