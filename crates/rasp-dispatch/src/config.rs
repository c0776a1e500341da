//! Dispatch configuration loaded from YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigFieldError, ConfigValidationError, Error, Result};

/// Check points recognized when the configuration does not list its own.
pub const DEFAULT_CHECKPOINTS: &[&str] = &[
    "command",
    "directory",
    "fileUpload",
    "readFile",
    "request",
    "requestEnd",
    "sql",
    "sql_exception",
    "writeFile",
    "xxe",
    "ognl",
    "deserialization",
    "reflection",
    "webdav",
    "ssrf",
    "include",
    "eval",
    "copy",
    "rename",
    "loadLibrary",
];

const DEFAULT_MAX_PENDING_DEPTH: u8 = 2;
const DEFAULT_REQUEST_POOL_SIZE: usize = 1;
const DEFAULT_REQUEST_QUEUE_CAPACITY: usize = 100;

fn default_checkpoints() -> Vec<String> {
    DEFAULT_CHECKPOINTS.iter().map(|s| s.to_string()).collect()
}

fn default_max_pending_depth() -> u8 {
    DEFAULT_MAX_PENDING_DEPTH
}

fn default_pool_size() -> usize {
    DEFAULT_REQUEST_POOL_SIZE
}

fn default_queue_capacity() -> usize {
    DEFAULT_REQUEST_QUEUE_CAPACITY
}

/// Sizing of the fire-and-forget request queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestQueueConfig {
    /// Number of workers draining the queue.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Maximum number of queued requests; posts beyond this are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_REQUEST_POOL_SIZE,
            queue_capacity: DEFAULT_REQUEST_QUEUE_CAPACITY,
        }
    }
}

/// Process-wide dispatch configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Recognized check point names. Registration and dispatch reject anything else.
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<String>,
    /// How many nested pending outcomes the resolver follows before giving up.
    #[serde(default = "default_max_pending_depth")]
    pub max_pending_depth: u8,
    /// Deadline for resolving pending verdicts. `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_queue: RequestQueueConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            max_pending_depth: DEFAULT_MAX_PENDING_DEPTH,
            resolve_timeout_ms: None,
            request_queue: RequestQueueConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Load from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Export to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(Error::from)
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout_ms.map(Duration::from_millis)
    }

    /// Validate every field, collecting all problems rather than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<ConfigFieldError> = Vec::new();

        if self.checkpoints.is_empty() {
            errors.push(ConfigFieldError::new(
                "checkpoints",
                "at least one check point is required",
            ));
        }

        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for (idx, name) in self.checkpoints.iter().enumerate() {
            if name.trim().is_empty() {
                errors.push(ConfigFieldError::checkpoint(
                    idx,
                    "check point name must be non-empty",
                ));
                continue;
            }
            if !seen.insert(name.as_str()) {
                errors.push(ConfigFieldError::checkpoint(
                    idx,
                    format!("duplicate check point name: {}", name),
                ));
            }
        }

        if self.max_pending_depth == 0 {
            errors.push(ConfigFieldError::new(
                "max_pending_depth",
                "must be at least 1",
            ));
        }

        if self.resolve_timeout_ms == Some(0) {
            errors.push(ConfigFieldError::new(
                "resolve_timeout_ms",
                "must be positive when set",
            ));
        }

        if self.request_queue.pool_size == 0 {
            errors.push(ConfigFieldError::new(
                "request_queue.pool_size",
                "must be at least 1",
            ));
        }

        if self.request_queue.queue_capacity == 0 {
            errors.push(ConfigFieldError::new(
                "request_queue.queue_capacity",
                "must be at least 1",
            ));
        }

        ConfigValidationError::check(errors)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = DispatchConfig::from_yaml("{}").unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.checkpoints.len(), 20);
        assert!(config.resolve_timeout().is_none());
    }

    #[test]
    fn parses_custom_checkpoints_and_queue() {
        let yaml = r#"
checkpoints: [sql, command]
max_pending_depth: 3
resolve_timeout_ms: 100
request_queue:
  pool_size: 4
"#;
        let config = DispatchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.checkpoints, vec!["sql", "command"]);
        assert_eq!(config.max_pending_depth, 3);
        assert_eq!(config.resolve_timeout(), Some(Duration::from_millis(100)));
        assert_eq!(config.request_queue.pool_size, 4);
        assert_eq!(config.request_queue.queue_capacity, 100);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = DispatchConfig::from_yaml("checkpoint: [sql]").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn collects_every_validation_error() {
        let yaml = r#"
checkpoints: [sql, "", sql]
max_pending_depth: 0
request_queue:
  pool_size: 0
  queue_capacity: 0
"#;
        let err = DispatchConfig::from_yaml(yaml).unwrap_err();
        let Error::ConfigValidation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        let paths: Vec<&str> = validation.paths().collect();
        assert_eq!(
            paths,
            vec![
                "checkpoints[1]",
                "checkpoints[2]",
                "max_pending_depth",
                "request_queue.pool_size",
                "request_queue.queue_capacity",
            ]
        );
    }

    #[test]
    fn yaml_roundtrip_keeps_values() {
        let config = DispatchConfig {
            resolve_timeout_ms: Some(250),
            ..DispatchConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(DispatchConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
