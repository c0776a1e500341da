//! The fixed set of recognized check point names.

use std::collections::HashSet;

use crate::config::{DispatchConfig, DEFAULT_CHECKPOINTS};
use crate::error::{Error, Result};

/// Immutable catalog of check point names, fixed at process start.
///
/// The catalog only answers membership questions; there is no way to add a
/// name after construction.
#[derive(Clone, Debug)]
pub struct CheckpointCatalog {
    /// Names in configuration order.
    names: Vec<String>,
    index: HashSet<String>,
}

impl CheckpointCatalog {
    /// Build a catalog from a list of names. Duplicates collapse onto the first occurrence.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();

        for name in names {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::InvalidArgument(
                    "Check point name must be a non-empty string".to_string(),
                ));
            }
            if index.insert(name.clone()) {
                ordered.push(name);
            }
        }

        Ok(Self {
            names: ordered,
            index,
        })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        Self::new(config.checkpoints.iter().cloned())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CheckpointCatalog {
    fn default() -> Self {
        Self {
            names: DEFAULT_CHECKPOINTS.iter().map(|s| s.to_string()).collect(),
            index: DEFAULT_CHECKPOINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
