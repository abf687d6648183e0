#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stonebus::{
    CommitStrategy, Consumer, HandleError, OffsetStrategy, PartitionAssignmentListener,
    PartitionStrategy, RecordMetadata, TopicPartition,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Assigned(Vec<TopicPartition>),
    Unassigned(Vec<TopicPartition>),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl PartitionAssignmentListener for RecordingListener {
    fn on_partitions_assigned(&self, partitions: &[TopicPartition]) {
        self.events.lock().push(Event::Assigned(partitions.to_vec()));
    }

    fn on_partitions_unassigned(&self, partitions: &[TopicPartition]) {
        self.events.lock().push(Event::Unassigned(partitions.to_vec()));
    }
}

pub enum Failure {
    Error,
    Panic,
}

/// Records every batch it is offered, and fails the first `fail_batches` of them.
pub struct TestConsumer {
    pub topic: String,
    pub group: String,
    pub offset_strategy: OffsetStrategy,
    pub partition_strategy: PartitionStrategy,
    pub commit_strategy: CommitStrategy,
    pub listener: RecordingListener,
    /// every batch offered, as (partition, offset) pairs
    pub attempts: Mutex<Vec<Vec<(i32, i64)>>>,
    /// records of successfully handled batches
    pub received: Mutex<Vec<(i32, i64)>>,
    fail_batches: AtomicUsize,
    failure: Failure,
    handle_delay: Duration,
}

impl TestConsumer {
    pub fn new(
        topic: &str,
        group: &str,
        partition_strategy: PartitionStrategy,
        commit_strategy: CommitStrategy,
        offset_strategy: OffsetStrategy,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            group: group.to_string(),
            offset_strategy,
            partition_strategy,
            commit_strategy,
            listener: RecordingListener::default(),
            attempts: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            fail_batches: AtomicUsize::new(0),
            failure: Failure::Error,
            handle_delay: Duration::ZERO,
        }
    }

    pub fn divide(topic: &str, group: &str) -> Self {
        Self::new(
            topic,
            group,
            PartitionStrategy::DividePartitions,
            CommitStrategy::CommitAfterProcessing,
            OffsetStrategy::Earliest,
        )
    }

    pub fn share(topic: &str, group: &str) -> Self {
        Self::new(
            topic,
            group,
            PartitionStrategy::SharePartitions,
            CommitStrategy::NoCommit,
            OffsetStrategy::Earliest,
        )
    }

    pub fn manual(topic: &str, group: &str) -> Self {
        Self::new(
            topic,
            group,
            PartitionStrategy::Manual,
            CommitStrategy::NoCommit,
            OffsetStrategy::Earliest,
        )
    }

    pub fn failing(mut self, batches: usize, failure: Failure) -> Self {
        self.fail_batches = AtomicUsize::new(batches);
        self.failure = failure;
        self
    }

    /// Sleeps `delay` inside every `handle_records` call.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.handle_delay = delay;
        self
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn received(&self) -> Vec<(i32, i64)> {
        self.received.lock().clone()
    }
}

impl Consumer for TestConsumer {
    fn group_name(&self) -> &str {
        &self.group
    }
    fn topic_name(&self) -> &str {
        &self.topic
    }
    fn offset_strategy(&self) -> OffsetStrategy {
        self.offset_strategy
    }
    fn partition_strategy(&self) -> PartitionStrategy {
        self.partition_strategy
    }
    fn commit_strategy(&self) -> CommitStrategy {
        self.commit_strategy
    }
    fn partition_assignment_listener(&self) -> Option<&dyn PartitionAssignmentListener> {
        Some(&self.listener)
    }

    fn handle_records(&self, records: &[RecordMetadata]) -> Result<(), HandleError> {
        let batch: Vec<(i32, i64)> = records
            .iter()
            .map(|r| (r.partition_id(), r.offset()))
            .collect();
        self.attempts.lock().push(batch.clone());
        if !self.handle_delay.is_zero() {
            thread::sleep(self.handle_delay);
        }

        let should_fail = self
            .fail_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            match self.failure {
                Failure::Error => return Err("rejected batch".into()),
                Failure::Panic => panic!("consumer blew up"),
            }
        }
        self.received.lock().extend(batch);
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
