//! Durability levels for sync writes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CoreError;

/// How durable a prepare must become before it may commit.
///
/// The level names are part of the external stats and config contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Received by a majority of every chain.
    Majority,
    /// Majority, and additionally persisted on the active node.
    MajorityAndPersistOnMaster,
    /// Persisted by a majority of every chain.
    PersistToMajority,
}

impl Level {
    /// Whether the active node's own ack waits for local persistence.
    pub fn requires_local_persistence(self) -> bool {
        matches!(
            self,
            Level::MajorityAndPersistOnMaster | Level::PersistToMajority
        )
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "majority" => Ok(Level::Majority),
            "majority_and_persist_on_master" => Ok(Level::MajorityAndPersistOnMaster),
            "persist_to_majority" => Ok(Level::PersistToMajority),
            _ => Err(CoreError::InvalidLevel { raw: raw.into() }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Majority => "majority",
            Level::MajorityAndPersistOnMaster => "majority_and_persist_on_master",
            Level::PersistToMajority => "persist_to_majority",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
