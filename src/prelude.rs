pub use crate::accounting::MemoryState;
pub use crate::config::{EvictionConfig, EvictionPolicy};
pub use crate::engine::{EvictionEngine, FreeSummary};
pub use crate::error::{ConfigError, EvictError};
pub use crate::meta::AccessMeta;
pub use crate::pool::EvictionPool;
pub use crate::traits::{
    Allocator, EventNotifier, EvictionHost, KeySpace, LazyFree, ReplicationSink, TableScope,
};

pub use crate::metrics::EvictionMetricsSnapshot;
