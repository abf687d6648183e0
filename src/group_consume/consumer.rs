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

use std::error::Error;
use std::sync::Arc;

use crate::message::{RecordMetadata, TopicPartition};

/// Error a consumer returns from [`Consumer::handle_records`] to reject a batch.
pub type HandleError = Box<dyn Error + Send + Sync>;

/// Where a consumer starts reading a partition nobody in its group has committed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetStrategy {
    /// oldest record still retained
    Earliest,
    /// only records published after the assignment
    Latest,
}

/// How a group spreads the topic's partitions over its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStrategy {
    /// every partition is owned by exactly one member
    DividePartitions,
    /// every member reads every partition
    SharePartitions,
    /// members only read what is assigned through `assign_partition`
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitStrategy {
    CommitAfterProcessing,
    NoCommit,
}

/// Notified synchronously, under the group lock, when a consumer's partitions change.
///
/// Implementations must not call back into the group.
pub trait PartitionAssignmentListener: Send + Sync {
    fn on_partitions_assigned(&self, partitions: &[TopicPartition]);
    fn on_partitions_unassigned(&self, partitions: &[TopicPartition]);
}

/// A subscriber driven by the bus.
///
/// Identity is the `Arc` allocation: clones of one `Arc<dyn Consumer>` are the
/// same consumer, distinct allocations are distinct consumers.
pub trait Consumer: Send + Sync + 'static {
    fn group_name(&self) -> &str;
    fn topic_name(&self) -> &str;
    fn offset_strategy(&self) -> OffsetStrategy;
    fn partition_strategy(&self) -> PartitionStrategy;
    fn commit_strategy(&self) -> CommitStrategy;

    fn partition_assignment_listener(&self) -> Option<&dyn PartitionAssignmentListener> {
        None
    }

    /// Processes one batch. An error (or a panic) leaves the offsets untouched
    /// and the same records are delivered again.
    fn handle_records(&self, records: &[RecordMetadata]) -> Result<(), HandleError>;
}

/// Registration identity of a consumer inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConsumerKey(usize);

impl ConsumerKey {
    pub(crate) fn of(consumer: &Arc<dyn Consumer>) -> Self {
        // the member keeps a clone of the Arc, so the address is stable while registered
        Self(Arc::as_ptr(consumer) as *const () as usize)
    }
}
