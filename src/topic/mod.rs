pub use self::topic::Topic;
pub use topics::Topics;

mod topic;
mod topics;
