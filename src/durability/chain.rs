//! Replication chains and the partition topology.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{CoreError, NodeId, Seqno};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainName {
    First,
    Second,
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainName::First => f.write_str("first"),
            ChainName::Second => f.write_str("second"),
        }
    }
}

/// Where a node's tracking currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodePosition {
    /// Seqno of the last tracked write this node crossed.
    pub write_seqno: Seqno,
    /// Highest seqno this node acked; may run ahead of `write_seqno` when the
    /// ack got ahead of tracking.
    pub ack_seqno: Seqno,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("topology must be an array of chains")]
    NotAnArray,

    #[error("topology must contain 1 or 2 chains, got {got}")]
    ChainCount { got: usize },

    #[error("{chain} chain must be an array of node ids")]
    ChainNotAnArray { chain: ChainName },

    #[error("{chain} chain must contain 1 to {max} nodes, got {got}")]
    ChainSize {
        chain: ChainName,
        max: usize,
        got: usize,
    },

    #[error("{chain} chain entries must be strings or null")]
    InvalidEntry { chain: ChainName },

    #[error("{chain} chain: {source}")]
    Node {
        chain: ChainName,
        source: CoreError,
    },

    #[error("{chain} chain has no active node at position 0")]
    ActiveMissing { chain: ChainName },

    #[error("{chain} chain node {node} appears more than once")]
    DuplicateNode { chain: ChainName, node: NodeId },

    #[error("second chain active {second} does not match first chain active {first}")]
    ActiveMismatch { first: NodeId, second: NodeId },
}

/// One replication chain: 1..=4 ordered positions, the active node at
/// position 0, nulls for unassigned replica slots.
#[derive(Clone, Debug)]
pub struct ReplicationChain {
    name: ChainName,
    nodes: Vec<Option<NodeId>>,
    majority: usize,
    positions: BTreeMap<NodeId, NodePosition>,
}

impl ReplicationChain {
    fn new(name: ChainName, nodes: Vec<Option<NodeId>>) -> Self {
        // majority counts against the declared chain size, nulls included
        let majority = nodes.len() / 2 + 1;
        let positions = nodes
            .iter()
            .flatten()
            .map(|node| (node.clone(), NodePosition::default()))
            .collect();
        Self {
            name,
            nodes,
            majority,
            positions,
        }
    }

    pub fn name(&self) -> ChainName {
        self.name
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn active(&self) -> &NodeId {
        self.nodes[0]
            .as_ref()
            .expect("chain validated with an active at position 0")
    }

    pub fn assigned(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().flatten()
    }

    pub fn assigned_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.positions.contains_key(node)
    }

    pub fn position(&self, node: &NodeId) -> Option<NodePosition> {
        self.positions.get(node).copied()
    }

    pub(crate) fn position_mut(&mut self, node: &NodeId) -> Option<&mut NodePosition> {
        self.positions.get_mut(node)
    }

    pub(crate) fn set_position(&mut self, node: &NodeId, position: NodePosition) {
        if let Some(current) = self.positions.get_mut(node) {
            *current = position;
        }
    }

    /// Enough replicas assigned to ever reach majority?
    pub fn durability_possible(&self) -> bool {
        self.assigned_count() >= self.majority
    }

    /// Do the acked nodes form a majority of this chain?
    pub fn majority_met(&self, acked: &BTreeSet<NodeId>) -> bool {
        self.assigned().filter(|node| acked.contains(*node)).count() >= self.majority
    }
}

/// The replication topology: one chain, or two while a failover or rebalance
/// is in flight. The active node is identical across both.
#[derive(Clone, Debug)]
pub struct Topology {
    first: ReplicationChain,
    second: Option<ReplicationChain>,
}

impl Topology {
    /// Parse and validate the nested-list topology input.
    ///
    /// The input mirrors the wire form: an array of 1..=2 chains, each an
    /// array of node-id strings with nulls for unassigned non-active slots,
    /// e.g. `[["active","r1","r2"], ["active","r3", null]]`.
    pub fn parse(value: &serde_json::Value, max_chain_size: usize) -> Result<Self, TopologyError> {
        let chains = value.as_array().ok_or(TopologyError::NotAnArray)?;
        if chains.is_empty() || chains.len() > 2 {
            return Err(TopologyError::ChainCount { got: chains.len() });
        }

        let first = Self::parse_chain(ChainName::First, &chains[0], max_chain_size)?;
        let second = chains
            .get(1)
            .map(|chain| Self::parse_chain(ChainName::Second, chain, max_chain_size))
            .transpose()?;

        if let Some(second) = &second
            && second.active() != first.active()
        {
            return Err(TopologyError::ActiveMismatch {
                first: first.active().clone(),
                second: second.active().clone(),
            });
        }

        Ok(Self { first, second })
    }

    fn parse_chain(
        name: ChainName,
        value: &serde_json::Value,
        max_chain_size: usize,
    ) -> Result<ReplicationChain, TopologyError> {
        let entries = value
            .as_array()
            .ok_or(TopologyError::ChainNotAnArray { chain: name })?;
        if entries.is_empty() || entries.len() > max_chain_size {
            return Err(TopologyError::ChainSize {
                chain: name,
                max: max_chain_size,
                got: entries.len(),
            });
        }

        let mut nodes = Vec::with_capacity(entries.len());
        let mut seen = BTreeSet::new();
        for entry in entries {
            let node = match entry {
                serde_json::Value::Null => None,
                serde_json::Value::String(raw) => Some(
                    NodeId::parse(raw.clone())
                        .map_err(|source| TopologyError::Node {
                            chain: name,
                            source,
                        })?,
                ),
                _ => return Err(TopologyError::InvalidEntry { chain: name }),
            };
            if let Some(node) = &node
                && !seen.insert(node.clone())
            {
                return Err(TopologyError::DuplicateNode {
                    chain: name,
                    node: node.clone(),
                });
            }
            nodes.push(node);
        }

        if nodes[0].is_none() {
            return Err(TopologyError::ActiveMissing { chain: name });
        }

        Ok(ReplicationChain::new(name, nodes))
    }

    pub fn first(&self) -> &ReplicationChain {
        &self.first
    }

    pub fn second(&self) -> Option<&ReplicationChain> {
        self.second.as_ref()
    }

    pub fn active(&self) -> &NodeId {
        self.first.active()
    }

    pub fn chains(&self) -> impl Iterator<Item = &ReplicationChain> {
        std::iter::once(&self.first).chain(self.second.as_ref())
    }

    pub(crate) fn chains_mut(&mut self) -> impl Iterator<Item = &mut ReplicationChain> {
        std::iter::once(&mut self.first).chain(self.second.as_mut())
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.chains().any(|chain| chain.contains(node))
    }

    /// A node's position, first chain taking precedence.
    pub fn position(&self, node: &NodeId) -> Option<NodePosition> {
        self.chains().find_map(|chain| chain.position(node))
    }

    pub fn durability_possible(&self) -> bool {
        self.chains().all(ReplicationChain::durability_possible)
    }

    /// Carry per-node positions over from the topology being replaced.
    ///
    /// Nodes absent from the old topology keep their fresh position at the
    /// front of the tracked writes, so any ack they already queued counts
    /// against the existing prepares.
    pub(crate) fn adopt_positions(&mut self, old: &Topology) {
        for chain in self.chains_mut() {
            let nodes: Vec<NodeId> = chain.assigned().cloned().collect();
            for node in nodes {
                if let Some(position) = old.position(&node) {
                    chain.set_position(&node, position);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(raw: &str) -> NodeId {
        NodeId::parse(raw).unwrap()
    }

    #[test]
    fn parses_single_chain() {
        let topology = Topology::parse(&json!([["a", "b", "c"]]), 4).unwrap();
        assert_eq!(topology.active(), &node("a"));
        assert_eq!(topology.first().size(), 3);
        assert_eq!(topology.first().majority(), 2);
        assert!(topology.second().is_none());
        assert!(topology.durability_possible());
    }

    #[test]
    fn parses_two_chains_with_unassigned_slot() {
        let topology =
            Topology::parse(&json!([["a", "b", "c"], ["a", "d", null]]), 4).unwrap();
        let second = topology.second().unwrap();
        assert_eq!(second.size(), 3);
        assert_eq!(second.majority(), 2);
        assert_eq!(second.assigned_count(), 2);
        assert!(topology.durability_possible());
        assert!(topology.contains(&node("d")));
        assert!(!topology.contains(&node("x")));
    }

    #[test]
    fn majority_counts_nulls_in_chain_size() {
        let topology = Topology::parse(&json!([["a", null, null]]), 4).unwrap();
        assert_eq!(topology.first().majority(), 2);
        assert_eq!(topology.first().assigned_count(), 1);
        assert!(!topology.durability_possible());
    }

    #[test]
    fn rejects_malformed_input() {
        let err = Topology::parse(&json!({"first": []}), 4).unwrap_err();
        assert_eq!(err, TopologyError::NotAnArray);

        let err = Topology::parse(&json!([]), 4).unwrap_err();
        assert_eq!(err, TopologyError::ChainCount { got: 0 });

        let err = Topology::parse(&json!([["a"], ["a"], ["a"]]), 4).unwrap_err();
        assert_eq!(err, TopologyError::ChainCount { got: 3 });

        let err = Topology::parse(&json!(["a"]), 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::ChainNotAnArray {
                chain: ChainName::First
            }
        );

        let err = Topology::parse(&json!([["a", "b", "c", "d", "e"]]), 4).unwrap_err();
        assert!(matches!(err, TopologyError::ChainSize { got: 5, .. }));

        let err = Topology::parse(&json!([["a", 7]]), 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::InvalidEntry {
                chain: ChainName::First
            }
        );

        let err = Topology::parse(&json!([[null, "b"]]), 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::ActiveMissing {
                chain: ChainName::First
            }
        );

        let err = Topology::parse(&json!([["a", "b", "b"]]), 4).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateNode { .. }));

        let err = Topology::parse(&json!([["a", "b"], ["c", "d"]]), 4).unwrap_err();
        assert!(matches!(err, TopologyError::ActiveMismatch { .. }));
    }

    #[test]
    fn majority_met_ignores_out_of_chain_acks() {
        let topology = Topology::parse(&json!([["a", "b", "c"]]), 4).unwrap();
        let mut acked = BTreeSet::new();
        acked.insert(node("x"));
        acked.insert(node("b"));
        assert!(!topology.first().majority_met(&acked));
        acked.insert(node("a"));
        assert!(topology.first().majority_met(&acked));
    }

    #[test]
    fn adopt_positions_preserves_surviving_nodes() {
        let mut old = Topology::parse(&json!([["a", "b"]]), 4).unwrap();
        old.chains_mut().next().unwrap().set_position(
            &node("b"),
            NodePosition {
                write_seqno: Seqno::new(3),
                ack_seqno: Seqno::new(5),
            },
        );

        let mut new = Topology::parse(&json!([["a", "b", "c"]]), 4).unwrap();
        new.adopt_positions(&old);

        let b = new.position(&node("b")).unwrap();
        assert_eq!(b.write_seqno, Seqno::new(3));
        assert_eq!(b.ack_seqno, Seqno::new(5));

        // brand-new node starts at the front
        let c = new.position(&node("c")).unwrap();
        assert_eq!(c, NodePosition::default());
    }
}
