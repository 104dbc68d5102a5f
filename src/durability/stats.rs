//! Stats snapshot for the external collector.

use serde::Serialize;

use crate::core::{NodeId, PartitionId, Seqno};

use super::chain::ChainName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorRole {
    Active,
    Passive,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeStats {
    pub node: NodeId,
    pub write_seqno: Seqno,
    pub ack_seqno: Seqno,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainStats {
    pub name: ChainName,
    pub size: usize,
    pub majority: usize,
    pub nodes: Vec<NodeStats>,
}

/// One partition's durability counters and chain detail.
#[derive(Clone, Debug, Serialize)]
pub struct MonitorStats {
    pub role: MonitorRole,
    pub partition: PartitionId,
    pub high_prepared_seqno: Seqno,
    pub high_completed_seqno: Seqno,
    pub num_tracked: usize,
    pub num_accepted: u64,
    pub num_committed: u64,
    pub num_aborted: u64,
    pub chains: Vec<ChainStats>,
}
