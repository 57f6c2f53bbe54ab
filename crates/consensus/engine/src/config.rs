//! Configuration of the engine controller.

use std::{sync::Arc, time::Duration};

use rollup_genesis::RollupConfig;
use serde::{Deserialize, Serialize};

/// The default memory ceiling of the unsafe payload queue, 500 MiB.
pub const DEFAULT_MAX_UNSAFE_PAYLOADS_MEMORY: u64 = 500 * 1024 * 1024;

/// The default budget of every engine call made by the build pipeline.
pub const DEFAULT_ENGINE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// How the node brings the execution engine up to the chain tip.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Blocks are derived from L1 and inserted one by one by the rollup node.
    #[default]
    ConsensusLayer,
    /// The execution engine syncs itself from the unsafe head it is handed.
    ExecutionLayer,
}

/// Sync behavior of the engine controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// The [`SyncMode`] of the node.
    pub sync_mode: SyncMode,
    /// Whether the engine can EL-sync even though it already has a finalized block.
    pub supports_post_finalization_el_sync: bool,
}

/// Timeouts of the engine calls issued by the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineTimeouts {
    /// Budget of the forkchoice update that starts a block build.
    #[serde(with = "humantime_serde")]
    pub build_start: Duration,
    /// Budget of the `engine_getPayload` call that seals a block.
    #[serde(with = "humantime_serde")]
    pub build_seal: Duration,
    /// Budget of the `engine_getPayload` call that cancels a build job.
    #[serde(with = "humantime_serde")]
    pub build_cancel: Duration,
    /// Budget of the `engine_newPayload` call that inserts a sealed block.
    #[serde(with = "humantime_serde")]
    pub payload_process: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            build_start: DEFAULT_ENGINE_CALL_TIMEOUT,
            build_seal: DEFAULT_ENGINE_CALL_TIMEOUT,
            build_cancel: DEFAULT_ENGINE_CALL_TIMEOUT,
            payload_process: DEFAULT_ENGINE_CALL_TIMEOUT,
        }
    }
}

/// Configuration of the [`crate::EngineController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// The rollup configuration of the chain.
    pub rollup: Arc<RollupConfig>,
    /// Sync behavior.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Engine call timeouts of the build pipeline.
    #[serde(default)]
    pub timeouts: EngineTimeouts,
    /// Memory ceiling of the unsafe payload queue, in bytes.
    #[serde(default = "default_max_unsafe_payloads_memory")]
    pub max_unsafe_payloads_memory: u64,
}

const fn default_max_unsafe_payloads_memory() -> u64 {
    DEFAULT_MAX_UNSAFE_PAYLOADS_MEMORY
}

impl EngineConfig {
    /// Creates a configuration with default sync behavior, timeouts and memory ceiling.
    pub fn new(rollup: Arc<RollupConfig>) -> Self {
        Self {
            rollup,
            sync: SyncConfig::default(),
            timeouts: EngineTimeouts::default(),
            max_unsafe_payloads_memory: DEFAULT_MAX_UNSAFE_PAYLOADS_MEMORY,
        }
    }

    /// Sets the [`SyncConfig`].
    pub const fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Sets the memory ceiling of the unsafe payload queue.
    pub const fn with_max_unsafe_payloads_memory(mut self, max: u64) -> Self {
        self.max_unsafe_payloads_memory = max;
        self
    }
}
