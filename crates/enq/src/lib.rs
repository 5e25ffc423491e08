pub mod enqueuer;
pub mod error;
pub mod memory;
pub mod script;
pub mod sink;
pub mod stats;
pub mod store;

pub use enqueuer::Enqueuer;
pub use error::EnqError;
pub use memory::MemoryDueStore;
pub use script::{ScriptConn, ScriptRegistrar};
pub use sink::{JobSink, RedisQueueSink};
pub use stats::{EnqueueStats, SetStats};
pub use store::{DueStore, RedisDueStore};
