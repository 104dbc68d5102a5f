//! Validation errors for core atoms.

use thiserror::Error;

use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid node id {raw:?}: {reason}")]
    InvalidNodeId { raw: String, reason: String },

    #[error("invalid durability level {raw:?}")]
    InvalidLevel { raw: String },
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
