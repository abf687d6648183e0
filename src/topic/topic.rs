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

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::group_consume::{Consumer, ConsumerGroup};
use crate::message::{Record, RecordMetadata};
use crate::partition::Partition;
use crate::{AppError, AppResult, BusConfig, TopicConfig};

/// A named stream with a fixed set of partitions and one consumer group per group name.
#[derive(Debug)]
pub struct Topic {
    name: String,
    /// index == partition id
    partitions: Vec<Arc<Partition>>,
    groups: DashMap<String, Arc<ConsumerGroup>>,
    bus_config: Arc<BusConfig>,
}

impl Topic {
    pub fn new(name: impl Into<String>, topic_config: &TopicConfig, bus_config: Arc<BusConfig>) -> Self {
        let name = name.into();
        let partitions = (0..topic_config.partition_count)
            .map(|id| {
                Arc::new(Partition::new(
                    name.clone(),
                    id as i32,
                    topic_config.partition_capacity,
                ))
            })
            .collect();
        Self {
            name,
            partitions,
            groups: DashMap::new(),
            bus_config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    pub fn partition(&self, partition_id: i32) -> Option<&Arc<Partition>> {
        usize::try_from(partition_id)
            .ok()
            .and_then(|index| self.partitions.get(index))
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Stable key routing: the same key always lands in the same partition.
    /// `None` for a topic built without partitions.
    pub fn partition_for_key_hash(&self, key_hash: u64) -> Option<i32> {
        key_hash
            .checked_rem(self.partitions.len() as u64)
            .map(|id| id as i32)
    }

    /// Appends `record` to the partition chosen by its key and wakes every group.
    pub fn add_record(&self, record: Record) -> AppResult<RecordMetadata> {
        let partition_id = self
            .partition_for_key_hash(record.key_hash())
            .ok_or_else(|| {
                AppError::IllegalStateError(format!("topic {} has no partitions", self.name))
            })?;
        self.add_record_to_partition(record, partition_id)
    }

    pub fn add_record_to_partition(
        &self,
        record: Record,
        partition_id: i32,
    ) -> AppResult<RecordMetadata> {
        if record.topic() != self.name {
            return Err(AppError::IllegalStateError(format!(
                "record of topic {} cannot be written to topic {}",
                record.topic(),
                self.name
            )));
        }
        let partition = self.partition(partition_id).ok_or_else(|| {
            AppError::IllegalStateError(format!(
                "topic {} has no partition {}",
                self.name, partition_id
            ))
        })?;
        let metadata = partition.add_record(record);
        self.wake_up_groups();
        Ok(metadata)
    }

    pub(crate) fn wake_up_groups(&self) {
        for group in self.groups.iter() {
            trace!("waking group {} of topic {}", group.key(), self.name);
            group.wake_up();
        }
    }

    /// The group named `group_name`, created on first use.
    pub fn consumer_group(&self, group_name: &str) -> Arc<ConsumerGroup> {
        if let Some(group) = self.groups.get(group_name) {
            return group.clone();
        }
        self.groups
            .entry(group_name.to_string())
            .or_insert_with(|| {
                debug!("creating group {} for topic {}", group_name, self.name);
                Arc::new(ConsumerGroup::new(
                    group_name,
                    self.name.clone(),
                    self.partitions.clone(),
                    self.bus_config.subscription_config(group_name).clone(),
                ))
            })
            .clone()
    }

    pub fn get_consumer_group(&self, group_name: &str) -> Option<Arc<ConsumerGroup>> {
        self.groups.get(group_name).map(|group| group.clone())
    }

    /// Registers `consumer` in its group, see [`ConsumerGroup::create_consumption`].
    pub fn subscribe(&self, consumer: Arc<dyn Consumer>) -> AppResult<Arc<ConsumerGroup>> {
        let group = self.consumer_group(consumer.group_name());
        group.create_consumption(consumer)?;
        Ok(group)
    }

    pub fn unsubscribe(&self, consumer: &Arc<dyn Consumer>) {
        if let Some(group) = self.get_consumer_group(consumer.group_name()) {
            group.stop_consuming(consumer);
        }
    }

    /// Visits every retained record, partition by partition. Meant for diagnostics.
    pub fn handle_all_records<F>(&self, mut visitor: F)
    where
        F: FnMut(&RecordMetadata),
    {
        for partition in &self.partitions {
            partition.handle_all_records(&mut visitor);
        }
    }
}
