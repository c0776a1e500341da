//! Error types for rasp-dispatch

use thiserror::Error;

/// One rejected field of a dispatch configuration, addressed by its YAML path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFieldError {
    pub path: String,
    pub message: String,
}

impl ConfigFieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Error for entry `index` of the `checkpoints` list.
    pub fn checkpoint(index: usize, message: impl Into<String>) -> Self {
        Self::new(format!("checkpoints[{index}]"), message)
    }

    /// Index into `checkpoints` when this error is about one of its entries.
    pub fn checkpoint_index(&self) -> Option<usize> {
        self.path
            .strip_prefix("checkpoints[")?
            .strip_suffix(']')?
            .parse()
            .ok()
    }
}

/// Every problem found in one dispatch configuration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid dispatch config: {}", summarize(.errors))]
pub struct ConfigValidationError {
    pub errors: Vec<ConfigFieldError>,
}

impl ConfigValidationError {
    /// `Ok` when nothing was collected.
    pub fn check(errors: Vec<ConfigFieldError>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self { errors }.into())
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.path.as_str())
    }

    /// Positions in `checkpoints` that were rejected, in report order.
    pub fn rejected_checkpoints(&self) -> Vec<usize> {
        self.errors
            .iter()
            .filter_map(ConfigFieldError::checkpoint_index)
            .collect()
    }
}

fn summarize(errors: &[ConfigFieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced to callers of the registry and the dispatcher.
///
/// Asynchronous plugin failures never appear here; they are reported as
/// `exception` verdicts.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown check point name '{0}'")]
    UnknownCheckpoint(String),

    #[error("Plugin '{plugin}' failed at check point '{checkpoint}': {message}")]
    PluginEvaluation {
        plugin: String,
        checkpoint: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigValidation(#[from] ConfigValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for rasp-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_fields_on_one_line() {
        let err = ConfigValidationError {
            errors: vec![
                ConfigFieldError::checkpoint(0, "must not be empty"),
                ConfigFieldError::new("max_pending_depth", "must be at least 1"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid dispatch config: checkpoints[0]: must not be empty; \
             max_pending_depth: must be at least 1"
        );
    }

    #[test]
    fn rejected_checkpoints_reads_list_positions() {
        let err = ConfigValidationError {
            errors: vec![
                ConfigFieldError::checkpoint(3, "duplicate"),
                ConfigFieldError::new("checkpoints", "at least one check point is required"),
                ConfigFieldError::new("request_queue.pool_size", "must be at least 1"),
                ConfigFieldError::checkpoint(1, "empty"),
            ],
        };
        assert_eq!(err.rejected_checkpoints(), vec![3, 1]);
        assert_eq!(
            err.paths().collect::<Vec<_>>(),
            vec![
                "checkpoints[3]",
                "checkpoints",
                "request_queue.pool_size",
                "checkpoints[1]"
            ]
        );
    }

    #[test]
    fn check_passes_when_nothing_collected() {
        assert!(ConfigValidationError::check(Vec::new()).is_ok());
        let err = ConfigValidationError::check(vec![ConfigFieldError::checkpoint(0, "x")])
            .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn unknown_checkpoint_message_names_checkpoint() {
        let err = Error::UnknownCheckpoint("not_a_real_checkpoint".to_string());
        assert_eq!(
            err.to_string(),
            "Unknown check point name 'not_a_real_checkpoint'"
        );
    }
}
