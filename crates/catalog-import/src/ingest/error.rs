use thiserror::Error;

use crate::db::job_repo::JobStatus;
use crate::db::DatabaseError;
use crate::error::StorageError;

/// Failures that end an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No job registered for file '{0}'")]
    JobNotFound(String),

    #[error("Job {job_id} is {status} and cannot be run")]
    NotRunnable { job_id: String, status: JobStatus },

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to parse '{file_name}': {source}")]
    Csv {
        file_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode error artifact: {0}")]
    Artifact(String),
}

/// Reasons a file is refused at submission.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("File name must not be empty")]
    EmptyFileName,

    #[error("File '{file_name}' already has a {status} job ({job_id})")]
    AlreadyExists {
        file_name: String,
        job_id: String,
        status: JobStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
