use std::path::Path;

use crate::config::schema::{Config, StorageBackend};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1".to_string());
    }

    let ingest = &config.ingest;
    if ingest.batch_size == 0 {
        return invalid("ingest.batch_size must be at least 1".to_string());
    }
    // A checkpoint must span more than one batch.
    if ingest.checkpoint_interval <= ingest.batch_size as u64 {
        return invalid(format!(
            "ingest.checkpoint_interval ({}) must be greater than ingest.batch_size ({})",
            ingest.checkpoint_interval, ingest.batch_size
        ));
    }

    if config.publisher.poll_interval_ms == 0 {
        return invalid("publisher.poll_interval_ms must be positive".to_string());
    }
    if config.publisher.max_subscribers == 0 {
        return invalid("publisher.max_subscribers must be positive".to_string());
    }
    if config.publisher.channel_capacity == 0 {
        return invalid("publisher.channel_capacity must be positive".to_string());
    }

    if config.cache.enabled && config.cache.max_capacity == 0 {
        return invalid("cache.max_capacity must be positive when the cache is enabled".to_string());
    }

    let storage = &config.storage;
    if storage.bucket.trim().is_empty() || storage.bucket.contains('/') {
        return invalid(format!("Invalid storage bucket: '{}'", storage.bucket));
    }
    if storage.error_prefix.trim_matches('/').is_empty() {
        return invalid("storage.error_prefix must not be empty".to_string());
    }
    match storage.backend {
        StorageBackend::Filesystem => {
            if storage.root.as_deref().map_or(true, |r| r.trim().is_empty()) {
                return invalid("storage.root is required for the filesystem backend".to_string());
            }
        }
        StorageBackend::ObjectStore => {
            let Some(url) = storage.url.as_deref() else {
                return invalid("storage.url is required for the object_store backend".to_string());
            };
            if let Err(e) = url::Url::parse(url) {
                return invalid(format!("Invalid storage.url '{}': {}", url, e));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/catalog/catalog.db",
            "worker_count": 4,
            "storage": {
                "backend": "filesystem",
                "root": "/srv/imports",
                "bucket": "uploads"
            },
            "ingest": {
                "batch_size": 500,
                "checkpoint_interval": 5000
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.storage.root.as_deref(), Some("/srv/imports"));
        assert_eq!(config.ingest.batch_size, 500);
        assert_eq!(config.ingest.checkpoint_interval, 5000);
        assert_eq!(config.publisher.max_subscribers, 64);
    }

    #[test]
    fn test_load_object_store_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "object_store", "url": "memory:///" },
            "cache": { "enabled": false },
            "logging": { "level": "debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::ObjectStore);
        assert!(!config.cache.enabled);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_version() {
        let config_json = r#"
        {
            "version": "2.0",
            "storage": { "root": "/srv/imports" }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_backend() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "ftp", "root": "/srv/imports" }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_zero_batch_size() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage": { "root": "/srv/imports" },
            "ingest": { "batch_size": 0 }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_checkpoint_must_exceed_batch_size() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage": { "root": "/srv/imports" },
            "ingest": { "batch_size": 2000, "checkpoint_interval": 2000 }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_filesystem_backend_requires_root() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_object_store_backend_requires_url() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage": { "backend": "object_store" }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_from_missing_file() {
        let result = load_config("/nonexistent/catalog-import.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
