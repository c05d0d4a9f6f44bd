//! Federation configuration.

use fedorm_core::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};

/// What a source row carries for an association nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Leave the relation unset.
    #[default]
    Absent,
    /// Set collections to an empty sequence. Single-valued relations stay unset.
    Empty,
}

/// Configuration for relation resolution and query federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FederationConfig {
    /// Split `IN` lists longer than this into several selects. `None` sends one list.
    pub max_in_list: Option<usize>,
    /// Treatment of rows whose correlation key resolved to nothing.
    pub unmatched: UnmatchedPolicy,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            max_in_list: None,
            unmatched: UnmatchedPolicy::Absent,
        }
    }
}

impl FederationConfig {
    /// Create new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `IN` list chunk size (builder pattern).
    #[must_use]
    pub fn max_in_list(mut self, size: usize) -> Self {
        self.max_in_list = Some(size);
        self
    }

    /// Set the unmatched-relation policy (builder pattern).
    #[must_use]
    pub fn unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_list == Some(0) {
            return Err(Error::Config(ConfigError {
                message: "max_in_list must be at least 1".to_string(),
                source: None,
            }));
        }
        Ok(())
    }

    /// Load and validate configuration from a JSON document.
    ///
    /// Missing keys take their defaults; unknown keys are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid federation config: {}", e),
                source: Some(Box::new(e)),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Chunk size to use for an `IN` list of `len` values.
    pub(crate) fn chunk_size(&self, len: usize) -> usize {
        self.max_in_list.unwrap_or(len).max(1)
    }
}
