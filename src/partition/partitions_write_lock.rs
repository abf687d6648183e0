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

use parking_lot::RwLockWriteGuard;
use tracing::trace;

use crate::message::{Record, RecordMetadata, TopicPartition};
use crate::{AppError, AppResult};

use super::partition::{Partition, PartitionLog};

/// Write-locks a set of partitions in one global order.
///
/// Locks are taken in ascending `(topic, partition)` order and released in the
/// reverse order, so any number of threads locking overlapping sets can never
/// wait on each other in a cycle.
#[derive(Debug)]
pub struct PartitionsWriteLock<'a> {
    partitions: Vec<&'a Partition>,
}

/// Held write locks of a [`PartitionsWriteLock`]. Dropping it unlocks everything.
pub struct PartitionsWriteGuard<'a> {
    // sorted by topic partition, same order the locks were taken in
    guards: Vec<(TopicPartition, RwLockWriteGuard<'a, PartitionLog>)>,
}

impl<'a> PartitionsWriteLock<'a> {
    pub fn new(partitions: impl IntoIterator<Item = &'a Partition>) -> Self {
        let mut partitions: Vec<&'a Partition> = partitions.into_iter().collect();
        partitions.sort_by(|a, b| {
            (a.topic_name(), a.partition_id()).cmp(&(b.topic_name(), b.partition_id()))
        });
        partitions.dedup_by(|a, b| {
            a.topic_name() == b.topic_name() && a.partition_id() == b.partition_id()
        });
        Self { partitions }
    }

    pub fn lock(&self) -> PartitionsWriteGuard<'a> {
        let mut guards = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            let topic_partition = partition.topic_partition();
            trace!("write locking partition {}", topic_partition);
            guards.push((topic_partition, partition.write()));
        }
        PartitionsWriteGuard { guards }
    }

    /// Runs `f` with every partition locked. The locks are released even if `f` panics.
    pub fn write<R>(&self, f: impl FnOnce(&mut PartitionsWriteGuard<'a>) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl<'a> PartitionsWriteGuard<'a> {
    fn position(&self, topic_partition: &TopicPartition) -> Option<usize> {
        self.guards
            .binary_search_by(|(locked, _)| locked.cmp(topic_partition))
            .ok()
    }

    pub fn append(
        &mut self,
        topic_partition: &TopicPartition,
        record: Record,
    ) -> AppResult<RecordMetadata> {
        let index = self.position(topic_partition).ok_or_else(|| {
            AppError::IllegalStateError(format!(
                "partition {} is not locked for writing",
                topic_partition
            ))
        })?;
        Ok(self.guards[index].1.append(record))
    }

    pub fn latest_offset(&self, topic_partition: &TopicPartition) -> Option<i64> {
        self.position(topic_partition)
            .map(|index| self.guards[index].1.latest_offset())
    }

    pub fn locked_partitions(&self) -> impl Iterator<Item = &TopicPartition> {
        self.guards.iter().map(|(topic_partition, _)| topic_partition)
    }
}

impl Drop for PartitionsWriteGuard<'_> {
    fn drop(&mut self) {
        while let Some((topic_partition, guard)) = self.guards.pop() {
            drop(guard);
            trace!("write unlocked partition {}", topic_partition);
            #[cfg(test)]
            tests::RELEASED.with(|released| released.borrow_mut().push(topic_partition));
        }
    }
}
