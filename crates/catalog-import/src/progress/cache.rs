//! Low-latency progress counters with heal-on-read.
//!
//! The cache is never the source of truth. A miss is answered from the job
//! record and written back; it never reads as zero.

use std::time::Duration;

use moka::ops::compute::{CompResult, Op};
use thiserror::Error;

use crate::config::schema::CacheConfig;
use crate::db::job_repo::JobStatus;

/// One counter family. Each maps to its own key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressField {
    Status,
    Processed,
    Total,
    Errors,
}

impl ProgressField {
    pub fn namespace(&self) -> &'static str {
        match self {
            ProgressField::Status => "file_status",
            ProgressField::Processed => "file_processing",
            ProgressField::Total => "file_total",
            ProgressField::Errors => "row_with_errors",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Text(String),
    Counter(i64),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Progress cache is unavailable")]
    Unavailable,
}

/// A key-value store for progress counters.
pub trait ProgressCache: Send + Sync {
    fn get(&self, field: ProgressField, key: &str) -> Result<Option<CacheValue>, CacheError>;

    fn set(&self, field: ProgressField, key: &str, value: CacheValue) -> Result<(), CacheError>;

    /// Adds `delta` to an existing counter atomically and returns the new
    /// value.
    ///
    /// Returns `None` and writes nothing when the entry is missing or not a
    /// counter. An evicted counter must be re-seeded with [`set`] from an
    /// exact count; counting on from zero would under-report.
    ///
    /// [`set`]: ProgressCache::set
    fn increment(
        &self,
        field: ProgressField,
        key: &str,
        delta: i64,
    ) -> Result<Option<i64>, CacheError>;

    fn remove(&self, field: ProgressField, key: &str) -> Result<(), CacheError>;
}

/// Conversion between typed progress values and cache entries.
pub trait CachedValue: Sized {
    /// Returns `None` when the entry holds a value of another kind.
    fn from_cache(value: &CacheValue) -> Option<Self>;

    fn to_cache(&self) -> CacheValue;
}

impl CachedValue for u64 {
    fn from_cache(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Counter(n) => u64::try_from(*n).ok(),
            CacheValue::Text(_) => None,
        }
    }

    fn to_cache(&self) -> CacheValue {
        CacheValue::Counter(i64::try_from(*self).unwrap_or(i64::MAX))
    }
}

impl CachedValue for JobStatus {
    fn from_cache(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Text(s) => JobStatus::from_name(s),
            CacheValue::Counter(_) => None,
        }
    }

    fn to_cache(&self) -> CacheValue {
        CacheValue::Text(self.as_str().to_string())
    }
}

/// Reads `field` for `key`, healing a miss from `fallback`.
///
/// A hit of the right kind is returned as is. Otherwise `fallback` runs;
/// a `Some` result is written back and returned, a `None` result writes
/// nothing. Cache failures are logged and treated as misses.
pub fn get_with_fallback<T, E, F>(
    cache: &dyn ProgressCache,
    field: ProgressField,
    key: &str,
    fallback: F,
) -> Result<Option<T>, E>
where
    T: CachedValue,
    F: FnOnce() -> Result<Option<T>, E>,
{
    match cache.get(field, key) {
        Ok(Some(value)) => {
            if let Some(typed) = T::from_cache(&value) {
                return Ok(Some(typed));
            }
            log::warn!(
                "Cached {}:{} holds an unexpected value, healing from job record",
                field.namespace(),
                key
            );
        }
        Ok(None) => {}
        Err(e) => log::debug!("Cache read {}:{} failed: {}", field.namespace(), key, e),
    }

    let healed = fallback()?;
    if let Some(value) = &healed {
        if let Err(e) = cache.set(field, key, value.to_cache()) {
            log::debug!("Cache heal {}:{} skipped: {}", field.namespace(), key, e);
        }
    }
    Ok(healed)
}

/// In-process bounded cache.
pub struct MemoryProgressCache {
    inner: moka::sync::Cache<(ProgressField, String), CacheValue>,
}

impl MemoryProgressCache {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(time_to_idle)
            .build();
        Self { inner }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_capacity,
            Duration::from_secs(config.time_to_idle_secs),
        )
    }
}

impl ProgressCache for MemoryProgressCache {
    fn get(&self, field: ProgressField, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.inner.get(&(field, key.to_string())))
    }

    fn set(&self, field: ProgressField, key: &str, value: CacheValue) -> Result<(), CacheError> {
        self.inner.insert((field, key.to_string()), value);
        Ok(())
    }

    fn increment(
        &self,
        field: ProgressField,
        key: &str,
        delta: i64,
    ) -> Result<Option<i64>, CacheError> {
        let result = self
            .inner
            .entry((field, key.to_string()))
            .and_compute_with(|existing| match existing.map(|e| e.into_value()) {
                Some(CacheValue::Counter(n)) => Op::Put(CacheValue::Counter(n.saturating_add(delta))),
                _ => Op::Nop,
            });
        match result {
            CompResult::ReplacedWith(entry) => match entry.into_value() {
                CacheValue::Counter(n) => Ok(Some(n)),
                CacheValue::Text(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn remove(&self, field: ProgressField, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(&(field, key.to_string()));
        Ok(())
    }
}

/// A cache that is always unavailable, so every read falls back.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProgressCache;

impl ProgressCache for DisabledProgressCache {
    fn get(&self, _field: ProgressField, _key: &str) -> Result<Option<CacheValue>, CacheError> {
        Err(CacheError::Unavailable)
    }

    fn set(&self, _field: ProgressField, _key: &str, _value: CacheValue) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    fn increment(
        &self,
        _field: ProgressField,
        _key: &str,
        _delta: i64,
    ) -> Result<Option<i64>, CacheError> {
        Err(CacheError::Unavailable)
    }

    fn remove(&self, _field: ProgressField, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }
}

/// Builds the cache described by the configuration.
pub fn from_config(config: &CacheConfig) -> std::sync::Arc<dyn ProgressCache> {
    if config.enabled {
        std::sync::Arc::new(MemoryProgressCache::from_config(config))
    } else {
        log::info!("Progress cache disabled, all reads go to the job record");
        std::sync::Arc::new(DisabledProgressCache)
    }
}
