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

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

const DEFAULT_PARTITION_COUNT: usize = 5;
const DEFAULT_PARTITION_CAPACITY: usize = 1000;
const DEFAULT_POLL_SIZE: usize = 100;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 200;
const DEFAULT_THREAD_STOP_TIMEOUT_MS: u64 = 2000;

/// Shape of every partition of a topic. Fixed once the topic is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TopicConfig {
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,
    #[serde(default = "default_partition_capacity")]
    pub partition_capacity: usize,
}

/// Polling behaviour shared by every consumer of one group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// max records handed to a consumer per poll, split across its partitions
    #[serde(default = "default_poll_size")]
    pub poll_size: usize,
    /// upper bound for an idle consumption loop to sleep before re-polling
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_thread_stop_timeout_ms")]
    pub thread_stop_timeout_ms: u64,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    #[serde(default)]
    pub default_topic: TopicConfig,
    #[serde(default)]
    pub default_subscription: SubscriptionConfig,
    /// per topic name overrides
    #[serde(default)]
    pub topics: HashMap<String, TopicConfig>,
    /// per group name overrides
    #[serde(default)]
    pub subscriptions: HashMap<String, SubscriptionConfig>,
}

fn default_partition_count() -> usize {
    DEFAULT_PARTITION_COUNT
}
fn default_partition_capacity() -> usize {
    DEFAULT_PARTITION_CAPACITY
}
fn default_poll_size() -> usize {
    DEFAULT_POLL_SIZE
}
fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}
fn default_thread_stop_timeout_ms() -> u64 {
    DEFAULT_THREAD_STOP_TIMEOUT_MS
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            partition_capacity: DEFAULT_PARTITION_CAPACITY,
        }
    }
}

impl TopicConfig {
    pub fn new(partition_count: usize, partition_capacity: usize) -> Self {
        Self {
            partition_count,
            partition_capacity,
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            poll_size: DEFAULT_POLL_SIZE,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            thread_stop_timeout_ms: DEFAULT_THREAD_STOP_TIMEOUT_MS,
        }
    }
}

impl SubscriptionConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn thread_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_stop_timeout_ms)
    }
}

impl BusConfig {
    /// Loads the config file, then layers `STONEBUS__*` environment variables on top.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<BusConfig> {
        let path_str = path.as_ref().to_str().ok_or(AppError::InvalidValue(
            "config file path",
            path.as_ref().to_string_lossy().to_string(),
        ))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix("STONEBUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let bus_config: BusConfig = config.try_deserialize()?;
        bus_config.validate()?;
        Ok(bus_config)
    }

    pub fn topic_config(&self, topic_name: &str) -> &TopicConfig {
        self.topics.get(topic_name).unwrap_or(&self.default_topic)
    }

    pub fn subscription_config(&self, group_name: &str) -> &SubscriptionConfig {
        self.subscriptions
            .get(group_name)
            .unwrap_or(&self.default_subscription)
    }

    pub fn with_topic(mut self, topic_name: impl Into<String>, config: TopicConfig) -> Self {
        self.topics.insert(topic_name.into(), config);
        self
    }

    pub fn with_subscription(
        mut self,
        group_name: impl Into<String>,
        config: SubscriptionConfig,
    ) -> Self {
        self.subscriptions.insert(group_name.into(), config);
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        let topics = std::iter::once(("default_topic", &self.default_topic))
            .chain(self.topics.iter().map(|(name, c)| (name.as_str(), c)));
        for (name, topic) in topics {
            if topic.partition_count == 0 {
                return Err(AppError::InvalidValue(
                    "partition_count",
                    format!("0 for topic {}", name),
                ));
            }
            if topic.partition_capacity == 0 {
                return Err(AppError::InvalidValue(
                    "partition_capacity",
                    format!("0 for topic {}", name),
                ));
            }
        }
        let subscriptions = std::iter::once(("default_subscription", &self.default_subscription))
            .chain(self.subscriptions.iter().map(|(name, c)| (name.as_str(), c)));
        for (name, subscription) in subscriptions {
            if subscription.poll_size == 0 {
                return Err(AppError::InvalidValue(
                    "poll_size",
                    format!("0 for group {}", name),
                ));
            }
        }
        Ok(())
    }
}
