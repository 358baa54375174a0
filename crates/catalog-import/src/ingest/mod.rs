//! Bulk CSV ingestion: submission, validation, batching and the job run.

pub mod batch;
pub mod error;
pub mod error_sink;
pub mod job;
mod source;
pub mod submit;
pub mod validator;

pub use batch::BatchUpserter;
pub use error::{IngestError, SubmitError};
pub use error_sink::{artifact_key, ErrorSink};
pub use job::{IngestReport, IngestSettings, IngestionJob};
pub use submit::submit;
pub use validator::{validate, ColumnMap, RawRow, RowOutcome};
