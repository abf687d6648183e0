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

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::group_consume::{AssignmentSnapshot, Consumer, ConsumerGroup};
use crate::message::RecordMetadata;

/// Body of a consumption thread: polls the consumer's partitions and hands
/// the records over until the consumer leaves its group.
///
/// Offsets only move after `handle_records` succeeded, so a failing batch is
/// delivered again on the next cycle.
pub struct ConsumerReadRecordsLoop {
    group: Arc<ConsumerGroup>,
    consumer: Arc<dyn Consumer>,
}

enum PollOutcome {
    Handled,
    Idle,
    Failed,
}

impl ConsumerReadRecordsLoop {
    pub fn new(group: Arc<ConsumerGroup>, consumer: Arc<dyn Consumer>) -> Self {
        Self { group, consumer }
    }

    pub fn run(&self) {
        info!(
            "consumption loop of group {} on topic {} started",
            self.group.group_name(),
            self.group.topic_name()
        );
        let poll_size = self.group.poll_size_per_partition();
        while let Some(snapshot) = self.group.poll_assignment(&self.consumer) {
            let phase = snapshot.phase;
            match self.poll_once(snapshot, poll_size) {
                PollOutcome::Handled => {}
                PollOutcome::Idle | PollOutcome::Failed => {
                    self.group.wait_for_phase_change(phase);
                }
            }
        }
        info!(
            "consumption loop of group {} on topic {} stopped",
            self.group.group_name(),
            self.group.topic_name()
        );
    }

    fn poll_once(&self, snapshot: AssignmentSnapshot, poll_size: usize) -> PollOutcome {
        let mut batch: Vec<RecordMetadata> = Vec::new();
        let mut progress: HashMap<i32, i64> = HashMap::new();
        for (partition, offset) in &snapshot.partitions {
            let records = partition.get_records_from(*offset, poll_size);
            if let Some(last) = records.last() {
                progress.insert(partition.partition_id(), last.offset());
            }
            batch.extend(records);
        }
        if batch.is_empty() {
            return PollOutcome::Idle;
        }

        trace!(
            "group {} handing {} records from {} partitions",
            self.group.group_name(),
            batch.len(),
            progress.len()
        );
        match self.handle(&batch) {
            Ok(()) => {
                self.group.record_progress(&self.consumer, &progress);
                PollOutcome::Handled
            }
            Err(reason) => {
                warn!(
                    "group {} failed to handle {} records, retrying: {}",
                    self.group.group_name(),
                    batch.len(),
                    reason
                );
                PollOutcome::Failed
            }
        }
    }

    fn handle(&self, batch: &[RecordMetadata]) -> Result<(), String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.consumer.handle_records(batch))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    "consumer of group {} panicked with message: {}",
                    self.group.group_name(),
                    message
                );
                debug!("treating the panic as a processing failure");
                Err(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
