pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod ingest;
pub mod progress;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, Config};
pub use db::job_repo::{JobFilter, JobRecord, JobStatus};
pub use db::product_repo::{Product, ProductPage, ProductRecord};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, ImportError, Result, StorageError, TelemetryError, WorkerError};
pub use importer::Importer;
pub use ingest::{IngestError, IngestReport, IngestSettings, IngestionJob, SubmitError};
pub use progress::{
    DisabledProgressCache, MemoryProgressCache, ProgressCache, ProgressHub, ProgressSnapshot,
    PublishError, Subscription,
};
pub use storage::{FsObjectStorage, ObjectStorage, ObjectStoreBackend};
pub use worker::{IngestOutcome, IngestRequest, WorkerPool};
