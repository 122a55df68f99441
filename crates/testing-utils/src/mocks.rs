//! Mock implementations for the storage, channel, cache and sink traits
//!
//! In-memory doubles that can be used for unit testing without a database,
//! Redis or an outbound webhook. Each mock exposes failure switches so tests
//! can drive the error paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use birthday_core::models::{Message, Person};
use birthday_core::traits::{IdempotencyStore, MessageQueue, NotificationSink, PersonRepository};
use birthday_core::{NotifierError, NotifierResult};
use chrono::{DateTime, Utc};

/// Mock implementation of PersonRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockPersonRepository {
    persons: Arc<Mutex<HashMap<String, Person>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    mark_notified_calls: Arc<AtomicUsize>,
}

impl MockPersonRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persons(persons: Vec<Person>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.persons.lock().unwrap();
            for person in persons {
                map.insert(person.id.clone(), person);
            }
        }
        repo
    }

    pub fn insert(&self, person: Person) {
        self.persons
            .lock()
            .unwrap()
            .insert(person.id.clone(), person);
    }

    pub fn get(&self, id: &str) -> Option<Person> {
        self.persons.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Person> {
        self.persons.lock().unwrap().remove(id)
    }

    pub fn count(&self) -> usize {
        self.persons.lock().unwrap().len()
    }

    /// Make `get_by_id` and `find_due` fail with a database error
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write operation fail with a database error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn mark_notified_calls(&self) -> usize {
        self.mark_notified_calls.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> NotifierResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NotifierError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_writes(&self) -> NotifierResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NotifierError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl PersonRepository for MockPersonRepository {
    async fn create(&self, person: &Person) -> NotifierResult<Person> {
        self.check_writes()?;
        self.insert(person.clone());
        Ok(person.clone())
    }

    async fn get_by_id(&self, id: &str) -> NotifierResult<Option<Person>> {
        self.check_reads()?;
        Ok(self.get(id))
    }

    async fn update(&self, person: &Person) -> NotifierResult<()> {
        self.check_writes()?;
        let mut persons = self.persons.lock().unwrap();
        match persons.get_mut(&person.id) {
            Some(existing) => {
                *existing = person.clone();
                Ok(())
            }
            None => Err(NotifierError::person_not_found(&person.id)),
        }
    }

    async fn delete(&self, id: &str) -> NotifierResult<bool> {
        self.check_writes()?;
        Ok(self.remove(id).is_some())
    }

    async fn find_due(&self, threshold: DateTime<Utc>) -> NotifierResult<Vec<Person>> {
        self.check_reads()?;
        let mut due: Vec<Person> = self
            .persons
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.next_occurrence_utc <= threshold)
            .cloned()
            .collect();
        due.sort_by_key(|p| p.next_occurrence_utc);
        Ok(due)
    }

    async fn mark_notified(
        &self,
        id: &str,
        year: i32,
        next_occurrence_utc: DateTime<Utc>,
    ) -> NotifierResult<()> {
        self.check_writes()?;
        self.mark_notified_calls.fetch_add(1, Ordering::SeqCst);
        let mut persons = self.persons.lock().unwrap();
        let person = persons
            .get_mut(id)
            .ok_or_else(|| NotifierError::person_not_found(id))?;
        person.mark_notified(year, next_occurrence_utc, Utc::now());
        Ok(())
    }
}

/// Mock implementation of MessageQueue for testing
///
/// Consumed messages move to an in-flight set until acked; `nack` with
/// requeue puts them back with an incremented retry count.
#[derive(Debug, Clone, Default)]
pub struct MockMessageQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<Message>>>>,
    in_flight: Arc<Mutex<HashMap<String, (String, Message)>>>,
    acked_messages: Arc<Mutex<Vec<String>>>,
    nacked_messages: Arc<Mutex<Vec<String>>>,
    /// Remaining successful publishes before failures start; `None` = unlimited
    publish_budget: Arc<Mutex<Option<usize>>>,
    fail_consume: Arc<AtomicBool>,
}

impl MockMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_acked_messages(&self) -> Vec<String> {
        self.acked_messages.lock().unwrap().clone()
    }

    pub fn get_nacked_messages(&self) -> Vec<String> {
        self.nacked_messages.lock().unwrap().clone()
    }

    pub fn get_queue_messages(&self, queue: &str) -> Vec<Message> {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn add_message_to_queue(&self, queue: &str, message: Message) {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.to_string()).or_default().push_back(message);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Let the next `successes` publishes succeed, then fail every publish
    pub fn fail_publishes_after(&self, successes: usize) {
        *self.publish_budget.lock().unwrap() = Some(successes);
    }

    pub fn set_fail_consume(&self, fail: bool) {
        self.fail_consume.store(fail, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.queues.lock().unwrap().clear();
        self.in_flight.lock().unwrap().clear();
        self.acked_messages.lock().unwrap().clear();
        self.nacked_messages.lock().unwrap().clear();
        *self.publish_budget.lock().unwrap() = None;
    }
}

#[async_trait]
impl MessageQueue for MockMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> NotifierResult<()> {
        {
            let mut budget = self.publish_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(NotifierError::MessageQueue("mock publish failure".to_string()));
                }
                *remaining -= 1;
            }
        }
        self.add_message_to_queue(queue, message.clone());
        Ok(())
    }

    async fn consume_messages(&self, queue: &str, max_messages: usize) -> NotifierResult<Vec<Message>> {
        if self.fail_consume.load(Ordering::SeqCst) {
            return Err(NotifierError::MessageQueue("mock consume failure".to_string()));
        }
        let mut queues = self.queues.lock().unwrap();
        let mut in_flight = self.in_flight.lock().unwrap();
        let mut messages = Vec::new();
        if let Some(pending) = queues.get_mut(queue) {
            while messages.len() < max_messages {
                let Some(message) = pending.pop_front() else {
                    break;
                };
                in_flight.insert(message.id.clone(), (queue.to_string(), message.clone()));
                messages.push(message);
            }
        }
        Ok(messages)
    }

    async fn ack_message(&self, _queue: &str, message_id: &str) -> NotifierResult<()> {
        self.in_flight.lock().unwrap().remove(message_id);
        self.acked_messages
            .lock()
            .unwrap()
            .push(message_id.to_string());
        Ok(())
    }

    async fn nack_message(&self, _queue: &str, message_id: &str, requeue: bool) -> NotifierResult<()> {
        self.nacked_messages
            .lock()
            .unwrap()
            .push(message_id.to_string());
        let entry = self.in_flight.lock().unwrap().remove(message_id);
        if let (true, Some((queue, mut message))) = (requeue, entry) {
            message.increment_retry();
            self.add_message_to_queue(&queue, message);
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &str) -> NotifierResult<()> {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> NotifierResult<()> {
        self.queues.lock().unwrap().remove(queue);
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> NotifierResult<u32> {
        let queues = self.queues.lock().unwrap();
        Ok(queues.get(queue).map(|q| q.len()).unwrap_or(0) as u32)
    }

    async fn purge_queue(&self, queue: &str) -> NotifierResult<()> {
        if let Some(pending) = self.queues.lock().unwrap().get_mut(queue) {
            pending.clear();
        }
        Ok(())
    }
}

/// Mock notification sink that records every delivered message
#[derive(Debug, Clone, Default)]
pub struct MockNotificationSink {
    sent: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    should_fail: Arc<AtomicBool>,
    /// Number of upcoming calls that fail before the sink recovers
    failures_remaining: Arc<AtomicUsize>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::new();
        sink.set_should_fail(true);
        sink
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next(&self, times: usize) {
        self.failures_remaining.store(times, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn send(&self, message: &str) -> NotifierResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(NotifierError::Notification("mock sink failure".to_string()));
        }
        let transient = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(NotifierError::Notification("mock transient failure".to_string()));
        }

        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock idempotency store without expiry
#[derive(Debug, Clone, Default)]
pub struct MockIdempotencyStore {
    markers: Arc<Mutex<HashSet<String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str) {
        self.markers.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.markers.lock().unwrap().contains(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.markers.lock().unwrap().iter().cloned().collect()
    }

    /// Simulate a cache outage: every call returns a cache error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> NotifierResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotifierError::Cache("mock cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MockIdempotencyStore {
    async fn exists(&self, key: &str) -> NotifierResult<bool> {
        self.check_available()?;
        Ok(self.contains(key))
    }

    async fn set_marker(&self, key: &str, _ttl: Duration) -> NotifierResult<bool> {
        self.check_available()?;
        Ok(self.markers.lock().unwrap().insert(key.to_string()))
    }
}
