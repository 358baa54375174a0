//! Progress counters, snapshot reads and live subscriber streams.

pub mod cache;
pub mod publisher;
pub mod snapshot;

pub use cache::{
    get_with_fallback, CacheError, CacheValue, CachedValue, DisabledProgressCache,
    MemoryProgressCache, ProgressCache, ProgressField,
};
pub use publisher::{ProgressHub, ProgressPublisher, PublishError, PublishOutcome, Subscription};
pub use snapshot::{ProgressReader, ProgressSnapshot};
