// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::trace;

use crate::message::{Record, RecordMetadata, TopicPartition};

/// Offset meaning "nothing stored" for a partition, or "nothing consumed yet" for a reader.
pub const NO_OFFSET: i64 = 0;

/// A single ordered, bounded log.
///
/// Offsets start at 1 and grow by one per append. Once more than `capacity`
/// records are stored the oldest ones are evicted, so the stored offsets are
/// always a contiguous range ending at [`Partition::latest_offset`].
#[derive(Debug)]
pub struct Partition {
    partition_id: i32,
    topic_name: String,
    capacity: usize,
    log: RwLock<PartitionLog>,
}

/// The buffer behind a partition's lock.
#[derive(Debug)]
pub struct PartitionLog {
    partition_id: i32,
    capacity: usize,
    records: VecDeque<RecordMetadata>,
    latest_offset: i64,
}

impl PartitionLog {
    fn new(partition_id: i32, capacity: usize) -> Self {
        Self {
            partition_id,
            capacity,
            records: VecDeque::with_capacity(capacity.min(1024)),
            latest_offset: NO_OFFSET,
        }
    }

    pub fn append(&mut self, record: Record) -> RecordMetadata {
        self.latest_offset += 1;
        let metadata = RecordMetadata::new(self.latest_offset, record, self.partition_id);
        self.records.push_back(metadata.clone());
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        metadata
    }

    pub fn latest_offset(&self) -> i64 {
        self.latest_offset
    }

    fn records_from(&self, offset: i64, max_count: usize) -> Vec<RecordMetadata> {
        let Some(first) = self.records.front() else {
            return Vec::new();
        };
        if max_count == 0 || offset >= self.latest_offset {
            return Vec::new();
        }
        // stored offsets are contiguous, so the first match is found by subtraction
        let start = if offset < first.offset() {
            0
        } else {
            (offset - first.offset() + 1) as usize
        };
        self.records
            .range(start..)
            .take(max_count)
            .cloned()
            .collect()
    }
}

impl Partition {
    pub fn new(topic_name: impl Into<String>, partition_id: i32, capacity: usize) -> Self {
        Self {
            partition_id,
            topic_name: topic_name.into(),
            capacity,
            log: RwLock::new(PartitionLog::new(partition_id, capacity)),
        }
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic_name.clone(), self.partition_id)
    }

    pub fn add_record(&self, record: Record) -> RecordMetadata {
        let metadata = self.log.write().append(record);
        trace!(
            "appended record to {}-{} at offset {}",
            self.topic_name,
            self.partition_id,
            metadata.offset()
        );
        metadata
    }

    /// Up to `max_count` records with an offset strictly greater than `offset`, oldest first.
    pub fn get_records_from(&self, offset: i64, max_count: usize) -> Vec<RecordMetadata> {
        self.log.read().records_from(offset, max_count)
    }

    /// Newest assigned offset, or [`NO_OFFSET`] if nothing was ever appended.
    pub fn latest_offset(&self) -> i64 {
        self.log.read().latest_offset()
    }

    pub fn len(&self) -> usize {
        self.log.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `visitor` on every retained record, oldest first, under the read lock.
    pub fn handle_all_records<F>(&self, mut visitor: F)
    where
        F: FnMut(&RecordMetadata),
    {
        self.log.read().records.iter().for_each(|r| visitor(r));
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PartitionLog> {
        self.log.write()
    }
}
