use crate::db::job_repo::JobStatus;
use crate::ingest::IngestReport;

/// A file handed to the worker pool for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub file_name: String,
}

impl IngestRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub file_name: String,
    pub success: bool,
    pub report: Option<IngestReport>,
    pub error: Option<String>,
}

impl IngestOutcome {
    pub fn success(request: &IngestRequest, report: IngestReport) -> Self {
        Self {
            file_name: request.file_name.clone(),
            success: true,
            report: Some(report),
            error: None,
        }
    }

    pub fn failure(request: &IngestRequest, error: String) -> Self {
        Self {
            file_name: request.file_name.clone(),
            success: false,
            report: None,
            error: Some(error),
        }
    }

    /// Terminal status of the run, when it got far enough to have one.
    pub fn status(&self) -> Option<JobStatus> {
        self.report.as_ref().map(|r| r.status)
    }
}
