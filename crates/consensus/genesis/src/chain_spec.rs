//! Ordered hardfork schedule and fork-activation tracking.

use std::sync::Arc;

use alloy_primitives::B256;
use derive_more::Display;

use crate::RollupConfig;

/// Network upgrades of the L2 chain, in activation order.
#[derive(Debug, Display, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Hardfork {
    /// The initial protocol version.
    #[display("Bedrock")]
    Bedrock,
    /// The Regolith network upgrade.
    #[display("Regolith")]
    Regolith,
    /// The Canyon network upgrade.
    #[display("Canyon")]
    Canyon,
    /// The Delta network upgrade.
    #[display("Delta")]
    Delta,
    /// The Ecotone network upgrade.
    #[display("Ecotone")]
    Ecotone,
    /// The Fjord network upgrade.
    #[display("Fjord")]
    Fjord,
    /// The Granite network upgrade.
    #[display("Granite")]
    Granite,
    /// The Holocene network upgrade.
    #[display("Holocene")]
    Holocene,
    /// The Isthmus network upgrade.
    #[display("Isthmus")]
    Isthmus,
    /// The Jovian network upgrade.
    #[display("Jovian")]
    Jovian,
    /// The Interop network upgrade.
    #[display("Interop")]
    Interop,
}

impl Hardfork {
    /// Every hardfork, in activation order.
    pub const ALL: [Self; 11] = [
        Self::Bedrock,
        Self::Regolith,
        Self::Canyon,
        Self::Delta,
        Self::Ecotone,
        Self::Fjord,
        Self::Granite,
        Self::Holocene,
        Self::Isthmus,
        Self::Jovian,
        Self::Interop,
    ];
}

/// The effective activation time of a single [`Hardfork`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ForkActivation {
    /// The fork being activated.
    pub fork: Hardfork,
    /// The first L2 timestamp at which the fork is active.
    pub time: u64,
}

/// The immutable, ordered list of scheduled hardforks of a chain.
///
/// Activation times are *effective* times: a fork without its own timestamp is
/// still active once any later fork is, mirroring the cascade in [`RollupConfig`].
/// Times are therefore non-decreasing along the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSchedule {
    activations: Vec<ForkActivation>,
}

impl ForkSchedule {
    /// Builds the schedule from the hardfork times of the [`RollupConfig`].
    pub fn from_config(cfg: &RollupConfig) -> Self {
        let own_times = [
            Some(0),
            cfg.hardforks.regolith_time,
            cfg.hardforks.canyon_time,
            cfg.hardforks.delta_time,
            cfg.hardforks.ecotone_time,
            cfg.hardforks.fjord_time,
            cfg.hardforks.granite_time,
            cfg.hardforks.holocene_time,
            cfg.hardforks.isthmus_time,
            cfg.hardforks.jovian_time,
            cfg.hardforks.interop_time,
        ];

        let mut effective = [None; Hardfork::ALL.len()];
        let mut later: Option<u64> = None;
        for (index, own) in own_times.iter().enumerate().rev() {
            later = match (*own, later) {
                (Some(own), Some(later)) => Some(own.min(later)),
                (own, later) => own.or(later),
            };
            effective[index] = later;
        }

        let activations = Hardfork::ALL
            .iter()
            .zip(effective)
            .filter_map(|(fork, time)| time.map(|time| ForkActivation { fork: *fork, time }))
            .collect();
        Self { activations }
    }

    /// Returns the scheduled activations, in order.
    pub fn activations(&self) -> &[ForkActivation] {
        &self.activations
    }

    /// Returns the latest fork active at the given timestamp.
    pub fn fork_at(&self, timestamp: u64) -> Hardfork {
        self.activations
            .iter()
            .take_while(|activation| activation.time <= timestamp)
            .last()
            .map_or(Hardfork::Bedrock, |activation| activation.fork)
    }

    /// Returns the first scheduled fork after `fork`, if any.
    pub fn next_fork(&self, fork: Hardfork) -> Option<ForkActivation> {
        self.activations.iter().find(|activation| activation.fork > fork).copied()
    }
}

/// The chain specification: the rollup configuration together with its fork schedule.
///
/// Constructed once at start-up and shared by reference. The fork the node is
/// currently on is owned by the caller and passed into
/// [`ChainSpec::check_fork_activation`].
#[derive(Debug, Clone)]
pub struct ChainSpec {
    config: Arc<RollupConfig>,
    schedule: ForkSchedule,
}

impl ChainSpec {
    /// Creates a new [`ChainSpec`] from the given [`RollupConfig`].
    pub fn new(config: Arc<RollupConfig>) -> Self {
        let schedule = ForkSchedule::from_config(&config);
        Self { config, schedule }
    }

    /// Returns the inner [`RollupConfig`].
    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// Returns the [`ForkSchedule`].
    pub const fn schedule(&self) -> &ForkSchedule {
        &self.schedule
    }

    /// Advances the tracked `current` fork if the given block is an activation block.
    ///
    /// The first call only records the fork active at the block's timestamp.
    pub fn check_fork_activation(
        &self,
        current: &mut Option<Hardfork>,
        number: u64,
        hash: B256,
        timestamp: u64,
    ) {
        let Some(mut fork) = *current else {
            let fork = self.schedule.fork_at(timestamp);
            info!(target: "chain_spec", %fork, "Current hardfork version detected");
            *current = Some(fork);
            return;
        };

        while let Some(next) = self.schedule.next_fork(fork) {
            if !self.is_activation_block(next.time, timestamp) {
                break;
            }
            fork = next.fork;
            info!(
                target: "chain_spec",
                %fork,
                timestamp,
                number,
                %hash,
                "Detected hardfork activation block"
            );
        }
        *current = Some(fork);
    }

    /// Returns true if the block at `timestamp` is the first block at or after `fork_time`.
    fn is_activation_block(&self, fork_time: u64, timestamp: u64) -> bool {
        timestamp >= fork_time
            && (timestamp < self.config.block_time
                || timestamp - self.config.block_time < fork_time)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::HardForkConfig;

    fn spec(hardforks: HardForkConfig) -> ChainSpec {
        ChainSpec::new(Arc::new(RollupConfig { block_time: 2, hardforks, ..Default::default() }))
    }

    #[test]
    fn test_schedule_cascades_unscheduled_forks() {
        let spec = spec(HardForkConfig {
            regolith_time: Some(0),
            holocene_time: Some(10),
            ..Default::default()
        });
        let forks: Vec<_> = spec.schedule().activations().iter().map(|a| (a.fork, a.time)).collect();
        assert_eq!(
            forks,
            vec![
                (Hardfork::Bedrock, 0),
                (Hardfork::Regolith, 0),
                (Hardfork::Canyon, 10),
                (Hardfork::Delta, 10),
                (Hardfork::Ecotone, 10),
                (Hardfork::Fjord, 10),
                (Hardfork::Granite, 10),
                (Hardfork::Holocene, 10),
            ]
        );
    }

    #[rstest]
    #[case::genesis(0, Hardfork::Regolith)]
    #[case::before_holocene(9, Hardfork::Regolith)]
    #[case::holocene(10, Hardfork::Holocene)]
    #[case::far_future(u64::MAX, Hardfork::Holocene)]
    fn test_fork_at(#[case] timestamp: u64, #[case] expected: Hardfork) {
        let spec = spec(HardForkConfig {
            regolith_time: Some(0),
            holocene_time: Some(10),
            ..Default::default()
        });
        assert_eq!(spec.schedule().fork_at(timestamp), expected);
    }

    #[test]
    fn test_check_fork_activation_tracks_current_fork() {
        let spec = spec(HardForkConfig {
            regolith_time: Some(0),
            isthmus_time: Some(10),
            interop_time: Some(20),
            ..Default::default()
        });
        let mut current = None;

        spec.check_fork_activation(&mut current, 1, B256::ZERO, 2);
        assert_eq!(current, Some(Hardfork::Regolith));

        spec.check_fork_activation(&mut current, 4, B256::ZERO, 8);
        assert_eq!(current, Some(Hardfork::Regolith));

        spec.check_fork_activation(&mut current, 5, B256::ZERO, 10);
        assert_eq!(current, Some(Hardfork::Isthmus));

        // Jovian is implied by Interop and activates with it.
        spec.check_fork_activation(&mut current, 10, B256::ZERO, 20);
        assert_eq!(current, Some(Hardfork::Interop));
    }

    #[test]
    fn test_check_fork_activation_skips_non_activation_blocks() {
        let spec = spec(HardForkConfig { holocene_time: Some(10), ..Default::default() });
        let mut current = Some(Hardfork::Bedrock);

        // Past the activation block, so no transition is detected.
        spec.check_fork_activation(&mut current, 7, B256::ZERO, 14);
        assert_eq!(current, Some(Hardfork::Bedrock));
    }
}
