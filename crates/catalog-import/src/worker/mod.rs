pub mod job;
pub mod pool;

pub use job::{IngestOutcome, IngestRequest};
pub use pool::WorkerPool;
