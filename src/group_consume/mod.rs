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

mod assignor;
mod consumer;
mod consumer_group;
mod group_state;
mod member_metadata;

pub use consumer::{
    CommitStrategy, Consumer, HandleError, OffsetStrategy, PartitionAssignmentListener,
    PartitionStrategy,
};
pub use group_state::GroupState;

pub(crate) use consumer::ConsumerKey;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::partition::Partition;
use crate::SubscriptionConfig;

/// All consumers sharing one group name on one topic.
///
/// Membership, assignments and committed offsets live behind a single
/// read-write lock. Every change a consumption loop has to react to advances
/// `phase` and wakes the loops blocked in [`ConsumerGroup::wait_for_phase_change`].
///
/// Lock order: `metadata` before any partition lock, and before `phase`.
#[derive(Debug)]
pub struct ConsumerGroup {
    group_name: String,
    topic_name: String,
    /// sorted by partition id
    partitions: Vec<Arc<Partition>>,
    subscription_config: SubscriptionConfig,
    metadata: RwLock<GroupMetadata>,
    phase: Mutex<u64>,
    phase_changed: Condvar,
}

#[derive(Debug)]
struct GroupMetadata {
    state: GroupState,
    /// taken from the first member, cleared when the group becomes empty
    partition_strategy: Option<PartitionStrategy>,
    members: HashMap<ConsumerKey, MemberMetadata>,
    /// partition id -> last committed offset
    committed_offsets: HashMap<i32, i64>,
    next_join_sequence: u64,
}

/// One registered consumer and its read positions.
struct MemberMetadata {
    member_id: String,
    consumer: Arc<dyn Consumer>,
    join_sequence: u64,
    /// partition id -> last offset handed to the consumer successfully
    positions: BTreeMap<i32, i64>,
}

/// What a consumption loop reads in one cycle.
#[derive(Debug)]
pub(crate) struct AssignmentSnapshot {
    /// phase observed before the assignment was read
    pub phase: u64,
    pub partitions: Vec<(Arc<Partition>, i64)>,
}
