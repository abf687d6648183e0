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
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::group_consume::{Consumer, ConsumerGroup};
use crate::{AppError, AppResult};

use super::ConsumerReadRecordsLoop;

/// A dedicated OS thread running one consumer's [`ConsumerReadRecordsLoop`].
///
/// The thread never keeps the process alive: it is detached when `main` returns.
/// Dropping the handle stops the consumer.
pub struct ConsumptionThread {
    name: String,
    group: Arc<ConsumerGroup>,
    consumer: Arc<dyn Consumer>,
    stop_timeout: Duration,
    handle: Option<JoinHandle<()>>,
    // disconnected once the thread has finished, even by panic
    done: Option<Receiver<()>>,
}

impl ConsumptionThread {
    pub fn new(group: Arc<ConsumerGroup>, consumer: Arc<dyn Consumer>) -> Self {
        let name = format!("{}-{}-consumer", group.topic_name(), group.group_name());
        let stop_timeout = group.subscription_config().thread_stop_timeout();
        Self {
            name,
            group,
            consumer,
            stop_timeout,
            handle: None,
            done: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &Arc<ConsumerGroup> {
        &self.group
    }

    pub fn start(&mut self) -> AppResult<()> {
        if self.handle.is_some() {
            return Err(AppError::IllegalStateError(format!(
                "consumption thread {} already started",
                self.name
            )));
        }
        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let read_loop = ConsumerReadRecordsLoop::new(self.group.clone(), self.consumer.clone());
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _done = done_tx;
                read_loop.run();
            })?;
        info!("consumption thread {} started", self.name);
        self.handle = Some(handle);
        self.done = Some(done_rx);
        Ok(())
    }

    /// Leaves the group and waits up to the configured timeout for the thread
    /// to finish. Returns whether the thread is still running.
    pub fn stop(&mut self) -> bool {
        self.group.stop_consuming(&self.consumer);
        let Some(done) = self.done.take() else {
            return false;
        };
        match done.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "consumption thread {} still running after {:?}",
                    self.name, self.stop_timeout
                );
                self.done = Some(done);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("consumption thread {} panicked", self.name);
                    }
                }
                debug!("consumption thread {} joined", self.name);
            }
        }
        self.is_running()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ConsumptionThread {
    fn drop(&mut self) {
        self.stop();
    }
}
