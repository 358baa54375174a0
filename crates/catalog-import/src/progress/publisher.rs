//! Per-subscriber progress loops.
//!
//! Each subscriber gets its own task that polls a [`ProgressReader`] on a
//! fixed interval and pushes snapshots until the job reaches a terminal
//! status. Database reads run on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::config::schema::PublisherConfig;

use super::snapshot::{ProgressReader, ProgressSnapshot};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Subscriber limit of {max} reached")]
    SubscriberLimit { max: usize },

    #[error("Publisher task failed: {0}")]
    Task(String),
}

/// How a publisher loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The terminal snapshot was delivered.
    Finished,
    /// The subscriber went away first.
    Disconnected,
}

pub struct ProgressPublisher {
    reader: ProgressReader,
    interval: Duration,
}

impl ProgressPublisher {
    pub fn new(reader: ProgressReader, interval: Duration) -> Self {
        Self { reader, interval }
    }

    /// Streams snapshots for `job_id` into `tx`.
    ///
    /// Exactly one terminal snapshot is sent, as the last message. Read
    /// failures are logged and retried on the next tick.
    pub async fn run(
        &self,
        job_id: String,
        tx: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<PublishOutcome, PublishError> {
        loop {
            let reader = self.reader.clone();
            let id = job_id.clone();
            let read = tokio::task::spawn_blocking(move || reader.snapshot(&id)).await;

            match read {
                Ok(Ok(Some(snapshot))) => {
                    let terminal = snapshot.is_terminal();
                    if tx.send(snapshot).await.is_err() {
                        log::debug!("Subscriber for job {} went away", job_id);
                        return Ok(PublishOutcome::Disconnected);
                    }
                    if terminal {
                        log::debug!("Job {} reached a terminal status, closing stream", job_id);
                        return Ok(PublishOutcome::Finished);
                    }
                }
                Ok(Ok(None)) => return Err(PublishError::JobNotFound(job_id)),
                Ok(Err(e)) => {
                    log::warn!("Progress read for job {} failed, retrying: {}", job_id, e);
                }
                Err(e) => {
                    log::warn!("Progress read task for job {} panicked: {}", job_id, e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tx.closed() => {
                    log::debug!("Subscriber for job {} went away", job_id);
                    return Ok(PublishOutcome::Disconnected);
                }
            }
        }
    }
}

/// A live progress stream for one job.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<ProgressSnapshot>,
    task: JoinHandle<Result<PublishOutcome, PublishError>>,
}

impl Subscription {
    /// Next snapshot, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        self.receiver.recv().await
    }

    /// Drains remaining snapshots and returns how the loop ended.
    pub async fn finish(mut self) -> Result<(Vec<ProgressSnapshot>, PublishOutcome), PublishError> {
        let mut rest = Vec::new();
        while let Some(snapshot) = self.receiver.recv().await {
            rest.push(snapshot);
        }
        let outcome = self
            .task
            .await
            .map_err(|e| PublishError::Task(e.to_string()))??;
        Ok((rest, outcome))
    }
}

/// Spawns publisher tasks and caps how many run at once.
#[derive(Clone)]
pub struct ProgressHub {
    publisher: Arc<ProgressPublisher>,
    permits: Arc<Semaphore>,
    max_subscribers: usize,
    channel_capacity: usize,
    runtime: Handle,
}

impl ProgressHub {
    pub fn new(reader: ProgressReader, config: &PublisherConfig, runtime: Handle) -> Self {
        let publisher =
            ProgressPublisher::new(reader, Duration::from_millis(config.poll_interval_ms));
        Self {
            publisher: Arc::new(publisher),
            permits: Arc::new(Semaphore::new(config.max_subscribers)),
            max_subscribers: config.max_subscribers,
            channel_capacity: config.channel_capacity.max(1),
            runtime,
        }
    }

    /// Starts streaming progress for `job_id`.
    ///
    /// Refused with [`PublishError::SubscriberLimit`] when the cap is
    /// reached. The slot frees up when the publisher loop ends.
    pub fn subscribe(&self, job_id: &str) -> Result<Subscription, PublishError> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| PublishError::SubscriberLimit {
                max: self.max_subscribers,
            })?;

        let (tx, receiver) = mpsc::channel(self.channel_capacity);
        let publisher = Arc::clone(&self.publisher);
        let job_id = job_id.to_string();

        let task = self.runtime.spawn(async move {
            let _permit = permit;
            publisher.run(job_id, tx).await
        });

        Ok(Subscription { receiver, task })
    }

    pub fn active_subscribers(&self) -> usize {
        self.max_subscribers - self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRecord, JobStatus};
    use crate::db::Database;
    use crate::progress::cache::{CachedValue, MemoryProgressCache, ProgressCache, ProgressField};

    fn setup() -> (Database, Arc<MemoryProgressCache>, ProgressReader) {
        let db = Database::open_in_memory().unwrap();
        let cache = Arc::new(MemoryProgressCache::new(100, Duration::from_secs(60)));
        let reader = ProgressReader::new(db.clone(), cache.clone());
        (db, cache, reader)
    }

    fn config(max_subscribers: usize) -> PublisherConfig {
        PublisherConfig {
            poll_interval_ms: 10,
            max_subscribers,
            channel_capacity: 4,
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_one_terminal_snapshot() {
        let (db, _cache, reader) = setup();
        let job = JobRecord::new_pending("done.csv");
        job_repo::insert(&db, &job).unwrap();
        job_repo::set_total_record_count(&db, &job.id, 3).unwrap();
        job_repo::checkpoint(&db, &job.id, 2, 1).unwrap();
        job_repo::finish(&db, &job.id, JobStatus::CompletedWithErrors).unwrap();

        let hub = ProgressHub::new(reader, &config(4), Handle::current());
        let subscription = hub.subscribe(&job.id).unwrap();
        let (snapshots, outcome) = subscription.finish().await.unwrap();

        assert_eq!(outcome, PublishOutcome::Finished);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, JobStatus::CompletedWithErrors);
        assert_eq!(snapshots[0].processed, 2);
        assert_eq!(snapshots[0].total, 3);
    }

    #[tokio::test]
    async fn test_stream_follows_cache_until_terminal() {
        let (db, cache, reader) = setup();
        let job = JobRecord::new_pending("live.csv");
        job_repo::insert(&db, &job).unwrap();
        cache
            .set(ProgressField::Status, &job.id, JobStatus::Processing.to_cache())
            .unwrap();

        let hub = ProgressHub::new(reader, &config(4), Handle::current());
        let mut subscription = hub.subscribe(&job.id).unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.status, JobStatus::Processing);

        cache
            .set(ProgressField::Processed, &job.id, 2u64.to_cache())
            .unwrap();
        cache
            .set(ProgressField::Status, &job.id, JobStatus::Completed.to_cache())
            .unwrap();

        let (rest, outcome) = subscription.finish().await.unwrap();
        assert_eq!(outcome, PublishOutcome::Finished);
        let last = rest.last().unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.processed, 2);
        assert_eq!(rest.iter().filter(|s| s.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_ends_with_error() {
        let (_db, _cache, reader) = setup();
        let hub = ProgressHub::new(reader, &config(4), Handle::current());

        let subscription = hub.subscribe("ghost").unwrap();
        let err = subscription.finish().await.unwrap_err();
        assert!(matches!(err, PublishError::JobNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_subscriber_cap() {
        let (db, _cache, reader) = setup();
        let job = JobRecord::new_pending("capped.csv");
        job_repo::insert(&db, &job).unwrap();
        assert!(job_repo::start_run(&db, &job.id).unwrap());

        let hub = ProgressHub::new(reader, &config(1), Handle::current());
        let first = hub.subscribe(&job.id).unwrap();
        assert_eq!(hub.active_subscribers(), 1);

        let refused = hub.subscribe(&job.id);
        assert!(matches!(
            refused,
            Err(PublishError::SubscriberLimit { max: 1 })
        ));

        drop(first);
        // The slot frees once the loop notices the dropped receiver.
        let mut freed = false;
        for _ in 0..100 {
            if hub.active_subscribers() == 0 {
                freed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(freed);
        assert!(hub.subscribe(&job.id).is_ok());
    }
}
