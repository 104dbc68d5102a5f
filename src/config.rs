//! Durability configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Effect, Transience};

/// Replicas allowed per chain beyond the active node.
pub const MAX_REPLICAS: usize = 3;

/// Tunables for a partition's durability monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    /// Applied when a prepare carries no explicit timeout. `None` keeps the
    /// prepare tracked until it resolves.
    pub default_timeout_ms: Option<u64>,
    /// Replicas allowed per chain beyond the active node. Capped at
    /// [`MAX_REPLICAS`] by the protocol.
    pub max_replicas: usize,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            max_replicas: MAX_REPLICAS,
        }
    }
}

impl DurabilityConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: DurabilityConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_replicas > MAX_REPLICAS {
            return Err(ConfigError::TooManyReplicas {
                max: MAX_REPLICAS,
                got: self.max_replicas,
            });
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Largest chain the topology may carry: the active plus the replicas.
    pub fn max_chain_size(&self) -> usize {
        self.max_replicas + 1
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("durability config parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("max_replicas must be at most {max}, got {got}")]
    TooManyReplicas { max: usize, got: usize },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
