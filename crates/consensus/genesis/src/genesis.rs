//! Genesis anchors of the rollup.

use alloy_eips::BlockNumHash;

/// The L1 and L2 blocks the rollup chain is anchored to.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct ChainGenesis {
    /// L1 anchor point for the rollup.
    pub l1: BlockNumHash,
    /// Genesis anchor point for the rollup.
    pub l2: BlockNumHash,
    /// Timestamp of the L2 genesis block.
    pub l2_time: u64,
}
