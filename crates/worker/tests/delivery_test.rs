use std::sync::Arc;
use std::time::Duration;

use birthday_core::models::{Message, WorkItem};
use birthday_core::traits::IdempotencyStore;
use birthday_core::{FixedClock, OccurrenceCalculator};
use birthday_infrastructure::{InMemoryIdempotencyStore, MetricsCollector};
use birthday_testing_utils::{
    utc, MockIdempotencyStore, MockMessageQueue, MockNotificationSink, MockPersonRepository,
    PersonBuilder,
};
use birthday_worker::{
    BatchSummary, DeliveryConsumer, DeliveryOutcome, IdempotencyGate, WorkerService, WorkerSettings,
};
use tokio::sync::broadcast;

const QUEUE: &str = "birthday-notifications-queue";

struct Harness {
    repo: MockPersonRepository,
    sink: MockNotificationSink,
    consumer: Arc<DeliveryConsumer>,
}

fn harness_with_store(repo: MockPersonRepository, store: Arc<dyn IdempotencyStore>) -> Harness {
    let sink = MockNotificationSink::new();
    let gate = IdempotencyGate::new(store, "birthday", Duration::from_secs(86400));
    let consumer = Arc::new(DeliveryConsumer::new(
        Arc::new(repo.clone()),
        Arc::new(sink.clone()),
        gate,
        OccurrenceCalculator::default(),
        chrono::Duration::seconds(60),
        Arc::new(MetricsCollector::new()),
    ));
    Harness {
        repo,
        sink,
        consumer,
    }
}

fn harness(repo: MockPersonRepository, store: &MockIdempotencyStore) -> Harness {
    harness_with_store(repo, Arc::new(store.clone()))
}

fn john_doe() -> MockPersonRepository {
    MockPersonRepository::with_persons(vec![PersonBuilder::new()
        .with_id("p-1")
        .with_name("John", "Doe")
        .with_birthday("1990-06-01")
        .with_location("New York", Some("New York"), "USA")
        .with_next_occurrence(utc("2024-06-01T13:00:00Z"))
        .with_last_notified_year(2023)
        .build()])
}

fn message_for(repo: &MockPersonRepository, id: &str) -> Message {
    let person = repo.get(id).unwrap();
    Message::work_item(&WorkItem::from(&person)).unwrap()
}

#[tokio::test]
async fn test_due_item_is_delivered_and_committed() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    let outcome = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::Delivered { year: 2024, .. }));
    assert_eq!(h.sink.sent_messages(), vec!["Hey, John Doe it's your birthday".to_string()]);

    let person = h.repo.get("p-1").unwrap();
    assert_eq!(person.last_notified_year, 2024);
    assert_eq!(person.next_occurrence_utc, utc("2025-06-01T13:00:00Z"));
    assert!(store.contains("birthday:notification:p-1:2024"));
}

#[tokio::test]
async fn test_redelivery_sends_only_once() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;
    let second = h.consumer.handle(&message, utc("2024-06-01T13:00:20Z")).await;

    assert!(matches!(second, DeliveryOutcome::Duplicate { .. }));
    assert_eq!(h.sink.sent_count(), 1);
    assert_eq!(h.repo.mark_notified_calls(), 1);
}

#[tokio::test]
async fn test_stored_year_suppresses_after_marker_expiry() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;
    // 模拟标记过期
    let h = harness(h.repo.clone(), &MockIdempotencyStore::new());
    let outcome = h.consumer.handle(&message, utc("2024-06-02T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::AlreadyNotified { .. }));
    assert_eq!(h.sink.sent_count(), 0);
}

#[tokio::test]
async fn test_sink_failure_leaves_state_untouched() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    h.sink.set_should_fail(true);
    let message = message_for(&h.repo, "p-1");

    let outcome = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
    assert!(!outcome.should_ack());
    let person = h.repo.get("p-1").unwrap();
    assert_eq!(person.last_notified_year, 2023);
    assert_eq!(person.next_occurrence_utc, utc("2024-06-01T13:00:00Z"));
    assert!(store.keys().is_empty());

    h.sink.set_should_fail(false);
    let retry = h.consumer.handle(&message, utc("2024-06-01T13:01:10Z")).await;
    assert!(matches!(retry, DeliveryOutcome::Delivered { .. }));
    assert_eq!(h.sink.sent_count(), 1);
}

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);

    for body in ["", "{not json", r#"{"userId":"123","firstName":"John","lastName":"Doe","year":1990}"#] {
        let outcome = h.consumer.handle(&Message::new(body), utc("2024-06-01T13:00:10Z")).await;
        assert!(matches!(outcome, DeliveryOutcome::Malformed { .. }), "{body}");
        assert!(outcome.should_ack());
    }
    assert_eq!(h.sink.attempts(), 0);
}

#[tokio::test]
async fn test_deleted_person_is_not_retried() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");
    h.repo.remove("p-1");

    let outcome = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::PersonNotFound { .. }));
    assert!(outcome.should_ack());
    assert_eq!(h.sink.attempts(), 0);
}

#[tokio::test]
async fn test_unavailable_cache_still_delivers_once() {
    let store = MockIdempotencyStore::new();
    store.set_unavailable(true);
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    let first = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;
    let second = h.consumer.handle(&message, utc("2024-06-01T13:00:20Z")).await;

    assert!(matches!(first, DeliveryOutcome::Delivered { .. }));
    assert!(matches!(second, DeliveryOutcome::AlreadyNotified { .. }));
    assert_eq!(h.sink.sent_count(), 1);
}

#[tokio::test]
async fn test_storage_outage_requeues() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");
    h.repo.set_fail_reads(true);

    let outcome = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
    assert!(!outcome.should_ack());
    assert_eq!(h.sink.attempts(), 0);
}

#[tokio::test]
async fn test_delivery_inside_scan_buffer_advances_to_next_year() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    // 比本地9点早30秒
    h.consumer.handle(&message, utc("2024-06-01T12:59:30Z")).await;

    let person = h.repo.get("p-1").unwrap();
    assert_eq!(person.next_occurrence_utc, utc("2025-06-01T13:00:00Z"));
}

#[tokio::test]
async fn test_birthday_edited_after_scan_is_not_sent_early() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let message = message_for(&h.repo, "p-1");

    // 扫描之后生日被改为12月25日
    let mut edited = h.repo.get("p-1").unwrap();
    edited.birthday = "1990-12-25".parse().unwrap();
    edited.next_occurrence_utc = utc("2024-12-25T14:00:00Z");
    h.repo.insert(edited);

    let outcome = h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;

    assert!(matches!(outcome, DeliveryOutcome::NotDue { .. }));
    assert!(outcome.should_ack());
    assert_eq!(h.sink.attempts(), 0);
    assert!(store.keys().is_empty());

    let person = h.repo.get("p-1").unwrap();
    assert_eq!(person.last_notified_year, 2023);
    assert_eq!(person.next_occurrence_utc, utc("2024-12-25T14:00:00Z"));
    assert!(person.is_due(utc("2024-12-25T14:00:00Z"), chrono::Duration::seconds(60)));
}

#[tokio::test]
async fn test_with_real_in_memory_store() {
    let h = harness_with_store(john_doe(), Arc::new(InMemoryIdempotencyStore::new()));
    let message = message_for(&h.repo, "p-1");

    h.consumer.handle(&message, utc("2024-06-01T13:00:10Z")).await;
    let second = h.consumer.handle(&message, utc("2024-06-01T13:00:20Z")).await;

    assert!(matches!(second, DeliveryOutcome::Duplicate { .. }));
    assert_eq!(h.sink.sent_count(), 1);
}

fn worker(h: &Harness, queue: &MockMessageQueue, clock: FixedClock) -> WorkerService {
    WorkerService::new(
        h.consumer.clone(),
        Arc::new(queue.clone()),
        Arc::new(clock),
        WorkerSettings {
            worker_id: "worker-test".to_string(),
            queue_name: QUEUE.to_string(),
            batch_size: 10,
            max_concurrent_deliveries: 3,
            poll_interval: Duration::from_millis(20),
        },
    )
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let repo = MockPersonRepository::new();
    for i in 0..5 {
        repo.insert(
            PersonBuilder::new()
                .with_id(&format!("p-{i}"))
                .with_next_occurrence(utc("2024-06-01T13:00:00Z"))
                .build(),
        );
    }
    let store = MockIdempotencyStore::new();
    let h = harness(repo, &store);
    let queue = MockMessageQueue::new();
    for i in 0..5 {
        queue.add_message_to_queue(QUEUE, message_for(&h.repo, &format!("p-{i}")));
    }
    queue.add_message_to_queue(QUEUE, Message::new("garbage"));
    h.sink.fail_next(2);

    let service = worker(&h, &queue, FixedClock::new(utc("2024-06-01T13:00:10Z")));
    let summary = service.poll_once().await.unwrap();

    assert_eq!(
        summary,
        BatchSummary {
            received: 6,
            acked: 4,
            requeued: 2
        }
    );
    assert_eq!(h.sink.sent_count(), 3);
    assert_eq!(queue.get_acked_messages().len(), 4);
    assert_eq!(queue.get_nacked_messages().len(), 2);

    let requeued = queue.get_queue_messages(QUEUE);
    assert_eq!(requeued.len(), 2);
    assert!(requeued.iter().all(|m| m.retry_count == 1));

    let summary = service.poll_once().await.unwrap();
    assert_eq!(summary.acked, 2);
    assert_eq!(h.sink.sent_count(), 5);
    assert_eq!(queue.in_flight_count(), 0);
}

#[tokio::test]
async fn test_worker_loop_drains_queue_and_stops() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let queue = MockMessageQueue::new();
    queue.add_message_to_queue(QUEUE, message_for(&h.repo, "p-1"));

    let service = Arc::new(worker(&h, &queue, FixedClock::new(utc("2024-06-01T13:00:10Z"))));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = {
        let service = service.clone();
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };

    let sink = h.sink.clone();
    let delivered = birthday_testing_utils::TestEnv::wait_for(
        move || {
            let sink = sink.clone();
            async move { sink.sent_count() == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(delivered);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.get_acked_messages().len(), 1);
}

#[tokio::test]
async fn test_consume_failure_is_reported() {
    let store = MockIdempotencyStore::new();
    let h = harness(john_doe(), &store);
    let queue = MockMessageQueue::new();
    queue.set_fail_consume(true);

    let service = worker(&h, &queue, FixedClock::new(utc("2024-06-01T13:00:10Z")));
    assert!(service.poll_once().await.is_err());
}
