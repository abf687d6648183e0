pub use record::{Payload, Record, RecordMetadata, TypedRecord};
pub use topic_partition::TopicPartition;

mod record;
mod topic_partition;
