//! Builders for test configurations and CSV content.

#![allow(dead_code)]

use catalog_import::Config;

/// Builds a `Config` tuned for fast tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.worker_count = 2;
        config.ingest.batch_size = 2;
        config.ingest.checkpoint_interval = 10;
        config.publisher.poll_interval_ms = 20;
        Self { config }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.ingest.batch_size = size;
        self
    }

    pub fn checkpoint_interval(mut self, interval: u64) -> Self {
        self.config.ingest.checkpoint_interval = interval;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.config.publisher.max_subscribers = max;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a CSV body row by row.
pub struct CsvBuilder {
    lines: Vec<String>,
}

impl CsvBuilder {
    pub fn new(header: &str) -> Self {
        Self {
            lines: vec![header.to_string()],
        }
    }

    pub fn row(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Appends `count` valid rows named `<prefix>-<n>`.
    pub fn numbered_rows(mut self, prefix: &str, count: usize) -> Self {
        for n in 1..=count {
            self.lines.push(format!("{prefix}-{n},Item {n},generated"));
        }
        self
    }

    pub fn build(self) -> String {
        let mut body = self.lines.join("\n");
        body.push('\n');
        body
    }
}
