use crate::db::{job_repo, Database};
use crate::storage::ObjectStorage;

use super::error::IngestError;
use super::validator::RawRow;

const ARTIFACT_HEADER: [&str; 3] = ["identifier", "name", "description"];

/// Storage key of the rejected-rows artifact for a job.
pub fn artifact_key(prefix: &str, job_id: &str) -> String {
    format!("{}/{}.csv", prefix.trim_matches('/'), job_id)
}

/// Collects rejected rows for one run, in the order they were read.
#[derive(Debug, Default)]
pub struct ErrorSink {
    rows: Vec<RawRow>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: RawRow) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn encode(&self) -> Result<Vec<u8>, IngestError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        let artifact_err = |e: csv::Error| IngestError::Artifact(e.to_string());

        wtr.write_record(ARTIFACT_HEADER).map_err(artifact_err)?;
        for row in &self.rows {
            wtr.write_record([&row.identifier, &row.name, &row.description])
                .map_err(artifact_err)?;
        }
        wtr.into_inner()
            .map_err(|e| IngestError::Artifact(e.to_string()))
    }

    /// Stores the buffered rows as `{prefix}/{job_id}.csv` and records the
    /// location on the job. Returns `None` without touching anything when
    /// no row was rejected.
    pub fn materialize(
        &self,
        storage: &dyn ObjectStorage,
        db: &Database,
        bucket: &str,
        prefix: &str,
        job_id: &str,
    ) -> Result<Option<String>, IngestError> {
        if self.is_empty() {
            return Ok(None);
        }

        let key = artifact_key(prefix, job_id);
        let bytes = self.encode()?;
        storage.put_object(bucket, &key, bytes)?;
        job_repo::set_error_artifact(db, job_id, &key)?;

        log::info!(
            "Stored {} rejected rows for job {} at {}/{}",
            self.rows.len(),
            job_id,
            bucket,
            key
        );
        Ok(Some(key))
    }
}
