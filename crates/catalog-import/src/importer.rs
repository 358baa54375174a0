//! The assembled service: one handle over the database, object storage,
//! progress cache, ingestion job and subscriber hub.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::Config;
use crate::db::job_repo::{self, JobFilter, JobRecord};
use crate::db::product_repo::{self, Product, ProductPage};
use crate::db::{default_database_path, Database};
use crate::error::{ConfigError, Result};
use crate::ingest::{self, IngestReport, IngestSettings, IngestionJob};
use crate::progress::{self, ProgressCache, ProgressHub, ProgressReader, ProgressSnapshot, Subscription};
use crate::storage::{self, ObjectStorage};
use crate::worker::WorkerPool;

pub struct Importer {
    config: Config,
    db: Database,
    storage: Arc<dyn ObjectStorage>,
    cache: Arc<dyn ProgressCache>,
    job: Arc<IngestionJob>,
    reader: ProgressReader,
    hub: ProgressHub,
}

impl Importer {
    /// Opens the database and storage backend described by `config`.
    ///
    /// `runtime` runs publisher tasks and drives the `object_store` backend.
    pub fn open(config: Config, runtime: Handle) -> Result<Self> {
        let db_path = match &config.database_path {
            Some(path) => PathBuf::from(path),
            None => default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "Could not determine a default database path".to_string(),
            })?,
        };
        let db = Database::open(&db_path)?;
        let storage = storage::open(&config.storage, Some(runtime.clone()))?;
        let cache = progress::cache::from_config(&config.cache);

        Ok(Self::with_parts(config, db, storage, cache, runtime))
    }

    /// Assembles an importer from already-built collaborators.
    pub fn with_parts(
        config: Config,
        db: Database,
        storage: Arc<dyn ObjectStorage>,
        cache: Arc<dyn ProgressCache>,
        runtime: Handle,
    ) -> Self {
        let job = Arc::new(IngestionJob::new(
            db.clone(),
            Arc::clone(&storage),
            Arc::clone(&cache),
            IngestSettings::from_config(&config),
        ));
        let reader = ProgressReader::new(db.clone(), Arc::clone(&cache));
        let hub = ProgressHub::new(reader.clone(), &config.publisher, runtime);

        Self {
            config,
            db,
            storage,
            cache,
            job,
            reader,
            hub,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Registers a file for ingestion.
    pub fn submit(&self, file_name: &str) -> Result<JobRecord> {
        Ok(ingest::submit(&self.db, self.cache.as_ref(), file_name)?)
    }

    /// Runs the job for `file_name` on the calling thread.
    pub fn run(&self, file_name: &str) -> Result<IngestReport> {
        Ok(self.job.run(file_name)?)
    }

    pub fn ingestion_job(&self) -> Arc<IngestionJob> {
        Arc::clone(&self.job)
    }

    /// Starts a worker pool sized from the configuration.
    pub fn worker_pool(&self) -> Result<WorkerPool> {
        Ok(WorkerPool::new(self.ingestion_job(), self.config.worker_count)?)
    }

    pub fn job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(job_repo::find_by_id(&self.db, job_id)?)
    }

    pub fn job_by_file_name(&self, file_name: &str) -> Result<Option<JobRecord>> {
        Ok(job_repo::find_by_file_name(&self.db, file_name)?)
    }

    /// Jobs newest first, with the total matching the filter.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<(Vec<JobRecord>, u64)> {
        Ok(job_repo::query(&self.db, filter)?)
    }

    pub fn find_product(&self, identifier: &str) -> Result<Option<Product>> {
        Ok(product_repo::find_by_identifier(&self.db, identifier)?)
    }

    pub fn list_products(&self, cursor: i64, count: u32) -> Result<ProductPage> {
        Ok(product_repo::list(&self.db, cursor, count)?)
    }

    /// One progress snapshot, read through the cache.
    pub fn progress(&self, job_id: &str) -> Result<Option<ProgressSnapshot>> {
        Ok(self.reader.snapshot(job_id)?)
    }

    /// Streams progress for `job_id` until it reaches a terminal status.
    pub fn subscribe(&self, job_id: &str) -> Result<Subscription> {
        Ok(self.hub.subscribe(job_id)?)
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }
}
