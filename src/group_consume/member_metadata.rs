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

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::message::TopicPartition;

use super::{Consumer, MemberMetadata};

impl MemberMetadata {
    pub fn new(consumer: Arc<dyn Consumer>, join_sequence: u64) -> Self {
        Self {
            member_id: format!("{}-{}", consumer.group_name(), Uuid::new_v4()),
            consumer,
            join_sequence,
            positions: BTreeMap::new(),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn consumer(&self) -> &Arc<dyn Consumer> {
        &self.consumer
    }

    pub fn join_sequence(&self) -> u64 {
        self.join_sequence
    }

    pub fn assigned_partition_ids(&self) -> Vec<i32> {
        self.positions.keys().copied().collect()
    }

    pub fn is_assigned(&self, partition_id: i32) -> bool {
        self.positions.contains_key(&partition_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.positions.iter().map(|(id, offset)| (*id, *offset))
    }

    pub fn set_position(&mut self, partition_id: i32, offset: i64) {
        self.positions.insert(partition_id, offset);
    }

    /// Moves the read position of a partition that is still assigned.
    pub fn advance(&mut self, partition_id: i32, offset: i64) {
        if let Some(position) = self.positions.get_mut(&partition_id) {
            *position = offset;
        }
    }

    /// Drops the given partitions, returning the ones that were actually assigned.
    pub fn remove_partitions(&mut self, partition_ids: &[i32]) -> Vec<i32> {
        partition_ids
            .iter()
            .copied()
            .filter(|id| self.positions.remove(id).is_some())
            .collect()
    }

    /// Reports an assignment change to the consumer's listener, if it has one.
    pub fn notify_assignment(&self, topic_name: &str, gained: &[i32], lost: &[i32]) {
        let Some(listener) = self.consumer.partition_assignment_listener() else {
            return;
        };
        let to_topic_partitions = |ids: &[i32]| -> Vec<TopicPartition> {
            ids.iter()
                .map(|id| TopicPartition::new(topic_name, *id))
                .collect()
        };
        if !lost.is_empty() {
            debug!("member {} unassigned from {:?}", self.member_id, lost);
            listener.on_partitions_unassigned(&to_topic_partitions(lost));
        }
        if !gained.is_empty() {
            debug!("member {} assigned to {:?}", self.member_id, gained);
            listener.on_partitions_assigned(&to_topic_partitions(gained));
        }
    }
}

impl Debug for MemberMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberMetadata")
            .field("member_id", &self.member_id)
            .field("join_sequence", &self.join_sequence)
            .field("positions", &self.positions)
            .finish()
    }
}
