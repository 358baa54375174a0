//! Test harness for isolated ingestion runs.
//!
//! The `TestHarness` owns a temporary bucket root, an in-memory database, a
//! tokio runtime for publisher tasks, and the `Importer` assembled over them.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::runtime::Runtime;

use catalog_import::{
    Config, Database, FsObjectStorage, Importer, JobRecord, ObjectStorage, ProgressSnapshot,
};

use super::builders::ConfigBuilder;

pub struct TestHarness {
    temp_dir: TempDir,
    pub runtime: Runtime,
    pub importer: Importer,
    pub storage: Arc<FsObjectStorage>,
}

impl TestHarness {
    /// Harness with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new().build())
    }

    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");

        let db = Database::open_in_memory().expect("Failed to open database");
        let storage = Arc::new(FsObjectStorage::new(temp_dir.path()));
        let cache = catalog_import::progress::cache::from_config(&config.cache);
        let importer = Importer::with_parts(
            config,
            db,
            storage.clone(),
            cache,
            runtime.handle().clone(),
        );

        Self {
            temp_dir,
            runtime,
            importer,
            storage,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.importer.config().storage.bucket
    }

    /// Uploads `content` under `file_name` in the configured bucket.
    pub fn upload(&self, file_name: &str, content: &str) {
        self.storage
            .put_object(self.bucket(), file_name, content.as_bytes().to_vec())
            .expect("Failed to upload test file");
    }

    /// Uploads and submits a file.
    pub fn stage(&self, file_name: &str, content: &str) -> JobRecord {
        self.upload(file_name, content);
        self.importer
            .submit(file_name)
            .expect("Failed to submit test file")
    }

    pub fn job(&self, job_id: &str) -> JobRecord {
        self.importer
            .job(job_id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    /// Reads the error artifact back as rows of fields, header included.
    pub fn artifact_rows(&self, key: &str) -> Vec<Vec<String>> {
        let reader = self
            .storage
            .get_object_stream(self.bucket(), key)
            .expect("Error artifact missing");
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(reader);
        csv.records()
            .map(|r| {
                r.expect("Bad artifact row")
                    .iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Subscribes to `job_id` and collects every snapshot it delivers.
    pub fn collect_progress(&self, job_id: &str) -> Vec<ProgressSnapshot> {
        let subscription = self.importer.subscribe(job_id).expect("Subscribe failed");
        let (snapshots, _) = self
            .runtime
            .block_on(subscription.finish())
            .expect("Publisher failed");
        snapshots
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
