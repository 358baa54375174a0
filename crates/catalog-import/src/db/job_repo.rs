//! Job repository: CRUD operations for the `ingest_jobs` table.
//!
//! A job row is the authoritative record of one file's ingestion run.
//! The progress cache is rebuilt from these rows on a miss.

use chrono::Utc;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{natural_key, Database, DatabaseError};

/// Lifecycle status of an ingestion job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    CompletedWithErrors,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "completed_with_errors" => Some(JobStatus::CompletedWithErrors),
            _ => None,
        }
    }

    /// Parses a stored status string. Unknown values are logged and read
    /// as `Pending` so a bad row never blocks a read path.
    pub fn parse(s: &str, job_id: &str) -> Self {
        Self::from_name(s).unwrap_or_else(|| {
            log::warn!(
                "Unknown job status '{}' for job {}, defaulting to pending",
                s,
                job_id
            );
            JobStatus::Pending
        })
    }

    /// Terminal states never transition again without a new submission.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::CompletedWithErrors
        )
    }

    /// Whether a new run may start from this state.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Failed | JobStatus::CompletedWithErrors
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job row from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub file_name: String,
    pub status: JobStatus,
    pub total_record_count: u64,
    pub records_inserted: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl JobRecord {
    /// Creates a fresh pending record for `file_name` with a new UUID.
    pub fn new_pending(file_name: &str) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            status: JobStatus::Pending,
            total_record_count: 0,
            records_inserted: 0,
            error_count: 0,
            error_artifact: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let id: String = row.get("id")?;
        let status: String = row.get("status")?;
        Ok(Self {
            status: JobStatus::parse(&status, &id),
            id,
            file_name: row.get("file_name")?,
            total_record_count: row.get("total_record_count")?,
            records_inserted: row.get("records_inserted")?,
            error_count: row.get("error_count")?,
            error_artifact: row.get("error_artifact")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn expect_one(affected: usize, id: &str) -> Result<(), DatabaseError> {
    if affected == 0 {
        return Err(DatabaseError::JobNotFound(id.to_string()));
    }
    Ok(())
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO ingest_jobs (id, file_name, file_name_key, status, total_record_count,
             records_inserted, error_count, error_artifact, error, created_at,
             updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id,
                job.file_name,
                natural_key(&job.file_name),
                job.status.as_str(),
                job.total_record_count as i64,
                job.records_inserted as i64,
                job.error_count as i64,
                job.error_artifact,
                job.error,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM ingest_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a job by file name, ignoring case.
pub fn find_by_file_name(
    db: &Database,
    file_name: &str,
) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM ingest_jobs WHERE file_name_key = ?1")?;
        let mut rows = stmt.query_map(params![natural_key(file_name)], JobRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries jobs newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRecord>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let status = filter.status.map(|s| s.as_str());
        let where_clause = if status.is_some() {
            "WHERE status = ?1"
        } else {
            "WHERE ?1 IS NULL"
        };

        let count_sql = format!("SELECT COUNT(*) FROM ingest_jobs {}", where_clause);
        let total: u64 = conn.query_row(&count_sql, params![status], |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        let query_sql = format!(
            "SELECT * FROM ingest_jobs {} ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            where_clause
        );

        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRecord> = stmt
            .query_map(params![status, limit, offset], JobRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Enters `processing` and clears everything a previous run left behind.
///
/// The transition only happens from a runnable status; returns `false`
/// when the row exists but is `processing` or `completed`.
pub fn start_run(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE ingest_jobs SET status = 'processing', total_record_count = 0,
             records_inserted = 0, error_count = 0, error_artifact = NULL, error = NULL,
             completed_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'failed', 'completed_with_errors')",
            params![id, now_timestamp()],
        )?;
        Ok(affected == 1)
    })
}

/// Puts a retryable terminal job back to `pending` for resubmission,
/// zeroing the counters and outcome of the previous run.
///
/// Returns `false` when the job is not `failed` or `completed_with_errors`.
pub fn reset_to_pending(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE ingest_jobs SET status = 'pending', total_record_count = 0,
             records_inserted = 0, error_count = 0, error_artifact = NULL, error = NULL,
             completed_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status IN ('failed', 'completed_with_errors')",
            params![id, now_timestamp()],
        )?;
        Ok(affected == 1)
    })
}

/// Persists the pass-1 row count.
pub fn set_total_record_count(db: &Database, id: &str, total: u64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE ingest_jobs SET total_record_count = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, total as i64, now_timestamp()],
        )?;
        expect_one(affected, id)
    })
}

/// Persists the running counters at a checkpoint boundary.
pub fn checkpoint(
    db: &Database,
    id: &str,
    records_inserted: u64,
    error_count: u64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE ingest_jobs SET records_inserted = ?2, error_count = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, records_inserted as i64, error_count as i64, now_timestamp()],
        )?;
        expect_one(affected, id)
    })
}

/// Records where the rejected-rows artifact was stored.
pub fn set_error_artifact(db: &Database, id: &str, location: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE ingest_jobs SET error_artifact = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, location, now_timestamp()],
        )?;
        expect_one(affected, id)
    })
}

/// Moves the job into a terminal status.
pub fn finish(db: &Database, id: &str, status: JobStatus) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let now = now_timestamp();
        let affected = conn.execute(
            "UPDATE ingest_jobs SET status = ?2, updated_at = ?3, completed_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now],
        )?;
        expect_one(affected, id)
    })
}

/// Marks the job failed, keeping whatever progress was reached.
pub fn mark_failed(
    db: &Database,
    id: &str,
    records_inserted: u64,
    error_count: u64,
    error: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let now = now_timestamp();
        let affected = conn.execute(
            "UPDATE ingest_jobs SET status = 'failed', records_inserted = ?2, error_count = ?3,
             error = ?4, updated_at = ?5, completed_at = ?5
             WHERE id = ?1",
            params![id, records_inserted as i64, error_count as i64, error, now],
        )?;
        expect_one(affected, id)
    })
}
