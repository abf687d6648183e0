pub use partition::{Partition, PartitionLog, NO_OFFSET};
pub use partitions_write_lock::{PartitionsWriteGuard, PartitionsWriteLock};

mod partition;
mod partitions_write_lock;
