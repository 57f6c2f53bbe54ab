//! Rollup Config Types

use crate::{ChainGenesis, HardForkConfig};

/// The Rollup configuration.
///
/// Only the fields the engine controller consults are carried here; the
/// derivation-specific parameters live with the derivation pipeline.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct RollupConfig {
    /// The genesis state of the rollup.
    pub genesis: ChainGenesis,
    /// The block time of the L2, in seconds.
    pub block_time: u64,
    /// The L1 chain ID
    pub l1_chain_id: u64,
    /// The L2 chain ID
    pub l2_chain_id: u64,
    /// Hardfork timestamps.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub hardforks: HardForkConfig,
}

impl RollupConfig {
    /// Returns true if Regolith is active at the given timestamp.
    pub fn is_regolith_active(&self, timestamp: u64) -> bool {
        self.hardforks.regolith_time.is_some_and(|t| timestamp >= t)
            || self.is_canyon_active(timestamp)
    }

    /// Returns true if Canyon is active at the given timestamp.
    pub fn is_canyon_active(&self, timestamp: u64) -> bool {
        self.hardforks.canyon_time.is_some_and(|t| timestamp >= t)
            || self.is_delta_active(timestamp)
    }

    /// Returns true if Delta is active at the given timestamp.
    pub fn is_delta_active(&self, timestamp: u64) -> bool {
        self.hardforks.delta_time.is_some_and(|t| timestamp >= t)
            || self.is_ecotone_active(timestamp)
    }

    /// Returns true if Ecotone is active at the given timestamp.
    pub fn is_ecotone_active(&self, timestamp: u64) -> bool {
        self.hardforks.ecotone_time.is_some_and(|t| timestamp >= t)
            || self.is_fjord_active(timestamp)
    }

    /// Returns true if Fjord is active at the given timestamp.
    pub fn is_fjord_active(&self, timestamp: u64) -> bool {
        self.hardforks.fjord_time.is_some_and(|t| timestamp >= t)
            || self.is_granite_active(timestamp)
    }

    /// Returns true if Granite is active at the given timestamp.
    pub fn is_granite_active(&self, timestamp: u64) -> bool {
        self.hardforks.granite_time.is_some_and(|t| timestamp >= t)
            || self.is_holocene_active(timestamp)
    }

    /// Returns true if Holocene is active at the given timestamp.
    pub fn is_holocene_active(&self, timestamp: u64) -> bool {
        self.hardforks.holocene_time.is_some_and(|t| timestamp >= t)
            || self.is_isthmus_active(timestamp)
    }

    /// Returns true if Isthmus is active at the given timestamp.
    pub fn is_isthmus_active(&self, timestamp: u64) -> bool {
        self.hardforks.isthmus_time.is_some_and(|t| timestamp >= t)
            || self.is_jovian_active(timestamp)
    }

    /// Returns true if Jovian is active at the given timestamp.
    pub fn is_jovian_active(&self, timestamp: u64) -> bool {
        self.hardforks.jovian_time.is_some_and(|t| timestamp >= t)
            || self.is_interop_active(timestamp)
    }

    /// Returns true if Interop is active at the given timestamp.
    pub fn is_interop_active(&self, timestamp: u64) -> bool {
        self.hardforks.interop_time.is_some_and(|t| timestamp >= t)
    }

    /// Returns true if the timestamp marks the first Holocene block.
    pub fn is_first_holocene_block(&self, timestamp: u64) -> bool {
        self.is_holocene_active(timestamp)
            && !self.is_holocene_active(timestamp.saturating_sub(self.block_time))
    }

    /// Returns true if the timestamp marks the first Interop block.
    pub fn is_first_interop_block(&self, timestamp: u64) -> bool {
        self.is_interop_active(timestamp)
            && !self.is_interop_active(timestamp.saturating_sub(self.block_time))
    }
}
