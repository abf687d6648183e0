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

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::consumption::ConsumptionThread;
use crate::group_consume::Consumer;
use crate::message::{Record, RecordMetadata, TopicPartition};
use crate::partition::{Partition, PartitionsWriteLock};
use crate::{AppError, AppResult, BusConfig};

use super::Topic;

/// Process wide registry of topics, created lazily from the configuration.
#[derive(Debug)]
pub struct Topics {
    topics: DashMap<String, Arc<Topic>>,
    config: Arc<BusConfig>,
}

impl Topics {
    pub fn new(config: BusConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            topics: DashMap::new(),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The topic named `name`; every call for one name returns the same instance.
    pub fn get_topic(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.topics.get(name) {
            return topic.clone();
        }
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| {
                let topic_config = self.config.topic_config(name);
                info!(
                    "creating topic {} with {} partitions of capacity {}",
                    name, topic_config.partition_count, topic_config.partition_capacity
                );
                Arc::new(Topic::new(name, topic_config, self.config.clone()))
            })
            .clone()
    }

    pub fn add_record(&self, record: Record) -> AppResult<RecordMetadata> {
        self.get_topic(record.topic()).add_record(record)
    }

    /// Publishes `records` atomically: every target partition is write locked
    /// before the first append, so consumers see all of them or none.
    pub fn add_records(&self, records: Vec<Record>) -> AppResult<Vec<RecordMetadata>> {
        let mut touched: Vec<Arc<Topic>> = Vec::new();
        let mut partitions: Vec<Arc<Partition>> = Vec::with_capacity(records.len());
        let mut targets: Vec<TopicPartition> = Vec::with_capacity(records.len());
        for record in &records {
            let topic = self.get_topic(record.topic());
            let (partition_id, partition) = topic
                .partition_for_key_hash(record.key_hash())
                .and_then(|id| topic.partition(id).map(|p| (id, p)))
                .ok_or_else(|| {
                    AppError::IllegalStateError(format!("topic {} has no partitions", topic.name()))
                })?;
            partitions.push(partition.clone());
            targets.push(TopicPartition::new(topic.name(), partition_id));
            if !touched.iter().any(|t| Arc::ptr_eq(t, &topic)) {
                touched.push(topic);
            }
        }

        let lock = PartitionsWriteLock::new(partitions.iter().map(|p| p.as_ref()));
        let written = lock.write(|guard| {
            records
                .into_iter()
                .zip(&targets)
                .map(|(record, target)| guard.append(target, record))
                .collect::<AppResult<Vec<RecordMetadata>>>()
        })?;
        debug!(
            "published {} records to {} partitions",
            written.len(),
            targets.iter().collect::<HashSet<_>>().len()
        );

        touched.iter().for_each(|topic| topic.wake_up_groups());
        Ok(written)
    }

    /// Subscribes `consumer` to its topic's group and returns a thread, not yet
    /// started, that will drive it.
    pub fn create_consumer_thread(&self, consumer: Arc<dyn Consumer>) -> AppResult<ConsumptionThread> {
        let topic = self.get_topic(consumer.topic_name());
        let group = topic.subscribe(consumer.clone())?;
        Ok(ConsumptionThread::new(group, consumer))
    }

    pub fn unsubscribe(&self, consumer: &Arc<dyn Consumer>) {
        if let Some(topic) = self.topics.get(consumer.topic_name()) {
            topic.unsubscribe(consumer);
        }
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}
