#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod hardfork;
pub use hardfork::HardForkConfig;

mod genesis;
pub use genesis::ChainGenesis;

mod rollup;
pub use rollup::RollupConfig;

mod chain_spec;
pub use chain_spec::{ChainSpec, ForkActivation, ForkSchedule, Hardfork};
