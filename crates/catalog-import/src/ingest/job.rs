//! The two-pass ingestion run.
//!
//! Pass 1 counts the data records. Pass 2 re-opens the object, validates
//! every row, upserts valid rows in batches and buffers rejected ones.
//! Job counters are persisted at checkpoints; live counters go to the
//! progress cache, whose failures never fail the run.

use std::sync::Arc;
use std::time::Duration;

use csv::ByteRecord;
use serde::Serialize;
use tracing::{info_span, warn};

use crate::config::Config;
use crate::db::job_repo::{self, JobRecord, JobStatus};
use crate::db::Database;
use crate::progress::{CacheValue, CachedValue, ProgressCache, ProgressField};
use crate::storage::ObjectStorage;

use super::batch::BatchUpserter;
use super::error::IngestError;
use super::error_sink::ErrorSink;
use super::source::{count_records, csv_reader};
use super::validator::{validate, ColumnMap, RowOutcome};

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub bucket: String,
    pub error_prefix: String,
    pub batch_size: usize,
    pub checkpoint_interval: u64,
    pub batch_pause: Duration,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            error_prefix: config.storage.error_prefix.clone(),
            batch_size: config.ingest.batch_size,
            checkpoint_interval: config.ingest.checkpoint_interval,
            batch_pause: Duration::from_millis(config.ingest.batch_pause_ms),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub job_id: String,
    pub file_name: String,
    pub status: JobStatus,
    pub total: u64,
    pub inserted: u64,
    pub rejected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_artifact: Option<String>,
}

/// Counters reached so far in pass 2.
#[derive(Debug, Default, Clone, Copy)]
struct RunCounters {
    inserted: u64,
    rejected: u64,
}

pub struct IngestionJob {
    db: Database,
    storage: Arc<dyn ObjectStorage>,
    cache: Arc<dyn ProgressCache>,
    settings: IngestSettings,
}

impl IngestionJob {
    pub fn new(
        db: Database,
        storage: Arc<dyn ObjectStorage>,
        cache: Arc<dyn ProgressCache>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            db,
            storage,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Runs the job registered for `file_name`.
    ///
    /// Only `pending`, `failed` and `completed_with_errors` jobs are run;
    /// anything else is refused without touching the record. A run that
    /// fails after starting is persisted as `failed` with the counts it
    /// reached, and the cause is returned.
    pub fn run(&self, file_name: &str) -> Result<IngestReport, IngestError> {
        let job = job_repo::find_by_file_name(&self.db, file_name)?
            .ok_or_else(|| IngestError::JobNotFound(file_name.to_string()))?;

        if !job.status.is_runnable() || !job_repo::start_run(&self.db, &job.id)? {
            let status = job_repo::find_by_id(&self.db, &job.id)?
                .map(|j| j.status)
                .unwrap_or(job.status);
            return Err(IngestError::NotRunnable {
                job_id: job.id,
                status,
            });
        }

        let _span = info_span!("ingest", job_id = %job.id, file_name = %job.file_name).entered();
        log::info!("Starting ingestion of '{}' (job {})", job.file_name, job.id);

        self.publish_counters(&job.id, 0, 0, 0);
        self.publish_status(&job.id, JobStatus::Processing);

        let total = {
            let _pass = info_span!("count_pass").entered();
            match self.count_pass(&job) {
                Ok(total) => total,
                Err(e) => return Err(self.fail(&job, RunCounters::default(), e)),
            }
        };
        log::info!("Job {} has {} records", job.id, total);

        let mut sink = ErrorSink::new();
        let counters = {
            let _pass = info_span!("upsert_pass", total).entered();
            let mut counters = RunCounters::default();
            if let Err(e) = self.upsert_pass(&job, &mut sink, &mut counters) {
                return Err(self.fail(&job, counters, e));
            }
            counters
        };

        let artifact = match sink.materialize(
            self.storage.as_ref(),
            &self.db,
            &self.settings.bucket,
            &self.settings.error_prefix,
            &job.id,
        ) {
            Ok(location) => location,
            Err(e) => return Err(self.fail(&job, counters, e)),
        };

        let status = if artifact.is_some() {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };
        if let Err(e) = job_repo::finish(&self.db, &job.id, status) {
            return Err(self.fail(&job, counters, e.into()));
        }

        self.publish_counters(&job.id, counters.inserted, total, counters.rejected);
        self.publish_status(&job.id, status);

        log::info!(
            "Finished job {} as {}: {} inserted, {} rejected of {}",
            job.id,
            status,
            counters.inserted,
            counters.rejected,
            total
        );

        Ok(IngestReport {
            job_id: job.id,
            file_name: job.file_name,
            status,
            total,
            inserted: counters.inserted,
            rejected: counters.rejected,
            error_artifact: artifact,
        })
    }

    fn count_pass(&self, job: &JobRecord) -> Result<u64, IngestError> {
        let stream = self
            .storage
            .get_object_stream(&self.settings.bucket, &job.file_name)?;
        let total = count_records(stream).map_err(|e| IngestError::Csv {
            file_name: job.file_name.clone(),
            source: e,
        })?;

        job_repo::set_total_record_count(&self.db, &job.id, total)?;
        self.cache_set(ProgressField::Total, &job.id, total.to_cache());
        Ok(total)
    }

    fn upsert_pass(
        &self,
        job: &JobRecord,
        sink: &mut ErrorSink,
        counters: &mut RunCounters,
    ) -> Result<(), IngestError> {
        let csv_err = |e: csv::Error| IngestError::Csv {
            file_name: job.file_name.clone(),
            source: e,
        };

        let stream = self
            .storage
            .get_object_stream(&self.settings.bucket, &job.file_name)?;
        let mut rdr = csv_reader(stream);
        let columns = ColumnMap::from_headers(rdr.byte_headers().map_err(csv_err)?);
        if !columns.has_identifier() {
            warn!(job_id = %job.id, "no identifier column, every row will be rejected");
        }

        let mut upserter = BatchUpserter::new(&self.db, self.settings.batch_size);
        let mut since_checkpoint = 0u64;
        let mut record = ByteRecord::new();

        while rdr.read_byte_record(&mut record).map_err(csv_err)? {
            match validate(columns.raw_row(&record)) {
                RowOutcome::Valid(product) => {
                    let flushed = upserter.push(product);
                    counters.inserted = upserter.applied();
                    if let Some(applied) = flushed? {
                        self.after_batch(job, applied, counters, &mut since_checkpoint)?;
                    }
                }
                RowOutcome::Rejected(raw) => {
                    sink.push(raw);
                    counters.rejected += 1;
                    self.cache_increment(ProgressField::Errors, &job.id, 1, counters.rejected);
                }
            }
        }

        let applied = upserter.flush();
        counters.inserted = upserter.applied();
        let applied = applied?;
        if applied > 0 {
            self.cache_increment(
                ProgressField::Processed,
                &job.id,
                applied as i64,
                counters.inserted,
            );
        }

        job_repo::checkpoint(&self.db, &job.id, counters.inserted, counters.rejected)?;
        Ok(())
    }

    fn after_batch(
        &self,
        job: &JobRecord,
        applied: usize,
        counters: &RunCounters,
        since_checkpoint: &mut u64,
    ) -> Result<(), IngestError> {
        self.cache_increment(
            ProgressField::Processed,
            &job.id,
            applied as i64,
            counters.inserted,
        );

        *since_checkpoint += applied as u64;
        if *since_checkpoint >= self.settings.checkpoint_interval {
            job_repo::checkpoint(&self.db, &job.id, counters.inserted, counters.rejected)?;
            log::debug!(
                "Checkpoint for job {}: {} inserted, {} rejected",
                job.id,
                counters.inserted,
                counters.rejected
            );
            *since_checkpoint = 0;
        }

        if !self.settings.batch_pause.is_zero() {
            std::thread::sleep(self.settings.batch_pause);
        }
        Ok(())
    }

    /// Persists the failure and returns the cause for the caller.
    fn fail(&self, job: &JobRecord, counters: RunCounters, cause: IngestError) -> IngestError {
        log::error!("Ingestion of '{}' (job {}) failed: {}", job.file_name, job.id, cause);

        if let Err(e) = job_repo::mark_failed(
            &self.db,
            &job.id,
            counters.inserted,
            counters.rejected,
            &cause.to_string(),
        ) {
            log::error!("Failed to record failure of job {}: {}", job.id, e);
        }

        let total = job_repo::find_by_id(&self.db, &job.id)
            .ok()
            .flatten()
            .map(|j| j.total_record_count)
            .unwrap_or(0);
        self.publish_counters(&job.id, counters.inserted, total, counters.rejected);
        self.publish_status(&job.id, JobStatus::Failed);

        cause
    }

    // Counters go out before status so a terminal status is never seen
    // next to stale counters.
    fn publish_counters(&self, job_id: &str, processed: u64, total: u64, errors: u64) {
        self.cache_set(ProgressField::Processed, job_id, processed.to_cache());
        self.cache_set(ProgressField::Total, job_id, total.to_cache());
        self.cache_set(ProgressField::Errors, job_id, errors.to_cache());
    }

    fn publish_status(&self, job_id: &str, status: JobStatus) {
        self.cache_set(ProgressField::Status, job_id, status.to_cache());
    }

    fn cache_set(&self, field: ProgressField, job_id: &str, value: CacheValue) {
        if let Err(e) = self.cache.set(field, job_id, value) {
            log::debug!("Cache write {}:{} skipped: {}", field.namespace(), job_id, e);
        }
    }

    /// `exact` is the run's own count after this delta; it re-seeds a
    /// counter the cache has dropped.
    fn cache_increment(&self, field: ProgressField, job_id: &str, delta: i64, exact: u64) {
        match self.cache.increment(field, job_id, delta) {
            Ok(Some(_)) => {}
            Ok(None) => {
                log::debug!("Re-seeding {}:{} at {}", field.namespace(), job_id, exact);
                self.cache_set(field, job_id, exact.to_cache());
            }
            Err(e) => {
                log::debug!("Cache increment {}:{} skipped: {}", field.namespace(), job_id, e)
            }
        }
    }
}
