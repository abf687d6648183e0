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

//! An in-process, kafka-style message bus.
//!
//! Topics are split into fixed, bounded partitions. Consumers sharing a group
//! name on one topic form a [`ConsumerGroup`] that divides or shares the
//! partitions between them, and each consumer is driven by its own
//! [`ConsumptionThread`].

mod consumption;
mod group_consume;
mod message;
mod partition;
mod service;
mod topic;

pub use consumption::{ConsumerReadRecordsLoop, ConsumptionThread};
pub use group_consume::{
    CommitStrategy, Consumer, ConsumerGroup, GroupState, HandleError, OffsetStrategy,
    PartitionAssignmentListener, PartitionStrategy,
};
pub use message::{Payload, Record, RecordMetadata, TopicPartition, TypedRecord};
pub use partition::{Partition, PartitionLog, PartitionsWriteGuard, PartitionsWriteLock, NO_OFFSET};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, BusConfig, SubscriptionConfig,
    TopicConfig,
};
pub use topic::{Topic, Topics};
