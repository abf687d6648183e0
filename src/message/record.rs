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
use std::collections::hash_map::DefaultHasher;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased key or value carried through the bus untouched.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A message published to a topic. Key and value are opaque to the bus; only
/// the key hash is used, for partition routing.
#[derive(Clone)]
pub struct Record {
    topic: String,
    key: Payload,
    key_hash: u64,
    value: Option<Payload>,
}

impl Record {
    pub fn new<K, V>(topic: impl Into<String>, key: K, value: V) -> Self
    where
        K: Hash + Any + Send + Sync,
        V: Any + Send + Sync,
    {
        Self::with_optional_value(topic, key, Some(value))
    }

    /// A record without value, e.g. a deletion marker for `key`.
    pub fn tombstone<K>(topic: impl Into<String>, key: K) -> Self
    where
        K: Hash + Any + Send + Sync,
    {
        Self::with_optional_value::<K, ()>(topic, key, None)
    }

    pub fn with_optional_value<K, V>(topic: impl Into<String>, key: K, value: Option<V>) -> Self
    where
        K: Hash + Any + Send + Sync,
        V: Any + Send + Sync,
    {
        let key_hash = stable_hash(&key);
        Self {
            topic: topic.into(),
            key: Arc::new(key),
            key_hash,
            value: value.map(|v| Arc::new(v) as Payload),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key_hash(&self) -> u64 {
        self.key_hash
    }

    pub fn key<K: Any>(&self) -> Option<&K> {
        self.key.downcast_ref::<K>()
    }

    pub fn value<V: Any>(&self) -> Option<&V> {
        self.value.as_ref().and_then(|v| v.downcast_ref::<V>())
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("topic", &self.topic)
            .field("key_hash", &self.key_hash)
            .field("has_value", &self.has_value())
            .finish()
    }
}

// DefaultHasher::new() uses fixed keys, so the hash is the same for the whole process.
fn stable_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// A record as stored in a partition.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    offset: i64,
    record: Record,
    partition_id: i32,
}

/// Borrowed, typed view of a [`RecordMetadata`], see [`RecordMetadata::downcast`].
#[derive(Debug)]
pub struct TypedRecord<'a, K, V> {
    pub topic: &'a str,
    pub key: &'a K,
    pub value: &'a V,
    pub offset: i64,
    pub partition_id: i32,
}

impl RecordMetadata {
    pub fn new(offset: i64, record: Record, partition_id: i32) -> Self {
        Self {
            offset,
            record,
            partition_id,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn topic(&self) -> &str {
        self.record.topic()
    }

    /// Narrows the record to `K`/`V`.
    ///
    /// Returns `None` if the key is not a `K`, the value is missing, or the value is not a `V`.
    pub fn downcast<K: Any, V: Any>(&self) -> Option<TypedRecord<'_, K, V>> {
        let key = self.record.key::<K>()?;
        let value = self.record.value::<V>()?;
        Some(TypedRecord {
            topic: self.record.topic(),
            key,
            value,
            offset: self.offset,
            partition_id: self.partition_id,
        })
    }
}
