use std::sync::Arc;

use serde::Serialize;

use crate::db::job_repo::{self, JobRecord, JobStatus};
use crate::db::{Database, DatabaseError};

use super::cache::{get_with_fallback, ProgressCache, ProgressField};

/// Point-in-time progress of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    pub processed: u64,
    pub total: u64,
    pub errors: u64,
}

impl ProgressSnapshot {
    pub fn from_record(job: &JobRecord) -> Self {
        Self {
            status: job.status,
            processed: job.records_inserted,
            total: job.total_record_count,
            errors: job.error_count,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Share of rows handled so far, accepted or rejected, in `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return if self.is_terminal() { 100.0 } else { 0.0 };
        }
        let handled = self.processed.saturating_add(self.errors).min(self.total);
        handled as f64 * 100.0 / self.total as f64
    }
}

/// Loads the job record at most once per snapshot.
struct RecordLoader<'a> {
    db: &'a Database,
    job_id: &'a str,
    loaded: Option<Option<JobRecord>>,
}

impl RecordLoader<'_> {
    fn field<T>(&mut self, pick: impl FnOnce(&JobRecord) -> T) -> Result<Option<T>, DatabaseError> {
        if self.loaded.is_none() {
            self.loaded = Some(job_repo::find_by_id(self.db, self.job_id)?);
        }
        Ok(self.loaded.as_ref().and_then(|j| j.as_ref()).map(pick))
    }
}

/// Reads progress through the cache, falling back to the job record.
#[derive(Clone)]
pub struct ProgressReader {
    db: Database,
    cache: Arc<dyn ProgressCache>,
}

impl ProgressReader {
    pub fn new(db: Database, cache: Arc<dyn ProgressCache>) -> Self {
        Self { db, cache }
    }

    /// Returns `None` when the job does not exist.
    ///
    /// Status is read before the counters. The job writes its final
    /// counters before its terminal status, so a terminal snapshot always
    /// carries final counters.
    pub fn snapshot(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, DatabaseError> {
        let cache = self.cache.as_ref();
        let mut loader = RecordLoader {
            db: &self.db,
            job_id,
            loaded: None,
        };

        let status = get_with_fallback(cache, ProgressField::Status, job_id, || {
            loader.field(|j| j.status)
        })?;
        let Some(status) = status else {
            return Ok(None);
        };

        let processed = get_with_fallback(cache, ProgressField::Processed, job_id, || {
            loader.field(|j| j.records_inserted)
        })?;
        let total = get_with_fallback(cache, ProgressField::Total, job_id, || {
            loader.field(|j| j.total_record_count)
        })?;
        let errors = get_with_fallback(cache, ProgressField::Errors, job_id, || {
            loader.field(|j| j.error_count)
        })?;

        Ok(Some(ProgressSnapshot {
            status,
            processed: processed.unwrap_or(0),
            total: total.unwrap_or(0),
            errors: errors.unwrap_or(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::cache::{CacheValue, DisabledProgressCache, MemoryProgressCache};
    use std::time::Duration;

    fn setup() -> (Database, Arc<MemoryProgressCache>, ProgressReader) {
        let db = Database::open_in_memory().unwrap();
        let cache = Arc::new(MemoryProgressCache::new(100, Duration::from_secs(60)));
        let reader = ProgressReader::new(db.clone(), cache.clone());
        (db, cache, reader)
    }

    fn insert_job(db: &Database, name: &str) -> JobRecord {
        let job = JobRecord::new_pending(name);
        job_repo::insert(db, &job).unwrap();
        job
    }

    #[test]
    fn test_cold_cache_heals_from_record() {
        let (db, cache, reader) = setup();
        let job = insert_job(&db, "cold.csv");
        job_repo::set_total_record_count(&db, &job.id, 3).unwrap();
        job_repo::checkpoint(&db, &job.id, 2, 1).unwrap();

        let snapshot = reader.snapshot(&job.id).unwrap().unwrap();
        assert_eq!(
            snapshot,
            ProgressSnapshot {
                status: JobStatus::Pending,
                processed: 2,
                total: 3,
                errors: 1,
            }
        );
        assert_eq!(
            cache.get(ProgressField::Total, &job.id).unwrap(),
            Some(CacheValue::Counter(3))
        );
        assert_eq!(
            cache.get(ProgressField::Status, &job.id).unwrap(),
            Some(CacheValue::Text("pending".to_string()))
        );
    }

    #[test]
    fn test_cache_hit_wins_over_record() {
        let (db, cache, reader) = setup();
        let job = insert_job(&db, "live.csv");
        cache
            .set(ProgressField::Processed, &job.id, CacheValue::Counter(4000))
            .unwrap();

        let snapshot = reader.snapshot(&job.id).unwrap().unwrap();
        assert_eq!(snapshot.processed, 4000);
    }

    #[test]
    fn test_unknown_job_is_none_and_not_cached() {
        let (_db, cache, reader) = setup();
        assert!(reader.snapshot("ghost").unwrap().is_none());
        assert_eq!(cache.get(ProgressField::Status, "ghost").unwrap(), None);
    }

    #[test]
    fn test_disabled_cache_reads_record() {
        let db = Database::open_in_memory().unwrap();
        let reader = ProgressReader::new(db.clone(), Arc::new(DisabledProgressCache));
        let job = insert_job(&db, "nocache.csv");
        job_repo::finish(&db, &job.id, JobStatus::Completed).unwrap();

        let snapshot = reader.snapshot(&job.id).unwrap().unwrap();
        assert!(snapshot.is_terminal());
    }

    #[test]
    fn test_percent() {
        let snapshot = ProgressSnapshot {
            status: JobStatus::Processing,
            processed: 1,
            total: 4,
            errors: 1,
        };
        assert_eq!(snapshot.percent(), 50.0);

        let empty_done = ProgressSnapshot {
            status: JobStatus::Completed,
            processed: 0,
            total: 0,
            errors: 0,
        };
        assert_eq!(empty_done.percent(), 100.0);
    }
}
