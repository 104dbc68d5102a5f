#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod durability;
pub mod error;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at crate root for convenience
pub use crate::config::DurabilityConfig;
pub use crate::core::{ClientHandle, Key, Level, NodeId, PartitionId, PreparedWrite, Seqno};
pub use crate::durability::{
    ActiveDurabilityMonitor, ChainName, ClientNotifier, DurabilityMonitor, MonitorError,
    MonitorStats, PartitionStore, PassiveDurabilityMonitor, PassiveResolution,
    PersistedPartitionState, SteadyClock, StoreError, SyncWriteResult, TimeSource,
};
