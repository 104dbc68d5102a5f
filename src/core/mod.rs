//! Core domain types for the durability engine.
//!
//! Typed atoms shared across the crate:
//! - seqno: log positions
//! - node: node and partition identity
//! - level: durability levels
//! - client: opaque client handles
//! - prepare: keys and log-sequenced prepares

pub mod client;
pub mod error;
pub mod level;
pub mod node;
pub mod prepare;
pub mod seqno;

pub use client::ClientHandle;
pub use error::CoreError;
pub use level::Level;
pub use node::{NodeId, PartitionId};
pub use prepare::{Key, PreparedWrite};
pub use seqno::Seqno;
