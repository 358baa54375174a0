use rusqlite::ErrorCode;

use crate::db::job_repo::{self, JobRecord};
use crate::db::{Database, DatabaseError};
use crate::progress::{ProgressCache, ProgressField};

use super::error::SubmitError;

/// Registers `file_name` for ingestion and returns its `pending` job.
///
/// A new name gets a new job. A name whose job ended `failed` or
/// `completed_with_errors` reuses that job, reset to `pending`, and drops
/// its cached progress so readers heal from the reset record. Names with
/// a `pending`, `processing` or `completed` job are refused.
pub fn submit(
    db: &Database,
    cache: &dyn ProgressCache,
    file_name: &str,
) -> Result<JobRecord, SubmitError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(SubmitError::EmptyFileName);
    }

    if let Some(existing) = job_repo::find_by_file_name(db, file_name)? {
        if job_repo::reset_to_pending(db, &existing.id)? {
            forget_progress(cache, &existing.id);
            log::info!(
                "Resubmitted '{}' (job {}, was {})",
                existing.file_name,
                existing.id,
                existing.status
            );
            return reload(db, &existing.id);
        }
        return Err(already_exists(db, existing)?);
    }

    let job = JobRecord::new_pending(file_name);
    match job_repo::insert(db, &job) {
        Ok(()) => {
            log::info!("Submitted '{}' as job {}", job.file_name, job.id);
            Ok(job)
        }
        Err(DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            // Lost a race with a concurrent submission of the same name.
            let existing = job_repo::find_by_file_name(db, file_name)?
                .ok_or_else(|| DatabaseError::JobNotFound(file_name.to_string()))?;
            Err(already_exists(db, existing)?)
        }
        Err(e) => Err(e.into()),
    }
}

fn forget_progress(cache: &dyn ProgressCache, job_id: &str) {
    for field in [
        ProgressField::Status,
        ProgressField::Processed,
        ProgressField::Total,
        ProgressField::Errors,
    ] {
        if let Err(e) = cache.remove(field, job_id) {
            log::debug!("Cache evict {}:{} skipped: {}", field.namespace(), job_id, e);
        }
    }
}

fn reload(db: &Database, id: &str) -> Result<JobRecord, SubmitError> {
    Ok(job_repo::find_by_id(db, id)?.ok_or_else(|| DatabaseError::JobNotFound(id.to_string()))?)
}

fn already_exists(db: &Database, existing: JobRecord) -> Result<SubmitError, SubmitError> {
    let current = job_repo::find_by_id(db, &existing.id)?.unwrap_or(existing);
    Ok(SubmitError::AlreadyExists {
        file_name: current.file_name,
        job_id: current.id,
        status: current.status,
    })
}
