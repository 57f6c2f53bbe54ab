//! The internal state of the engine controller.

use std::time::Instant;

use alloy_rpc_types_engine::ForkchoiceState;
use rollup_genesis::{ChainSpec, Hardfork};
use rollup_protocol::L2BlockInfo;

use crate::{Metrics, SyncMode, UnsafePayloadQueue};

/// Progress of the node through execution-layer sync.
///
/// The controller starts in [`SyncStatus::Cl`] unless EL sync is configured, in which
/// case it walks the EL states linearly. [`SyncStatus::Cl`] and
/// [`SyncStatus::FinishedEl`] are terminal.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Blocks are derived and inserted by the rollup node.
    #[default]
    Cl,
    /// EL sync is configured; the engine is probed for a finalized block first.
    WillStartEl,
    /// The engine is syncing itself.
    StartedEl,
    /// EL sync is done, but the last synced block still has to be marked finalized.
    FinishedElNotFinalized,
    /// EL sync is done and the node consolidates with L1.
    FinishedEl,
}

impl SyncStatus {
    /// The initial status for the given [`SyncMode`].
    pub const fn initial(mode: SyncMode) -> Self {
        match mode {
            SyncMode::ConsensusLayer => Self::Cl,
            SyncMode::ExecutionLayer => Self::WillStartEl,
        }
    }

    /// Returns true while EL sync is pending or in progress.
    pub const fn is_syncing(&self) -> bool {
        matches!(self, Self::WillStartEl | Self::StartedEl | Self::FinishedElNotFinalized)
    }
}

/// The head references of the L2 chain across the different safety levels.
///
/// Listed from least to most safe:
///
/// 1. **Unsafe** - Most recent block, received from peers or built locally
/// 2. **Cross-unsafe** - Unsafe block with verified cross-chain dependencies
/// 3. **Pending-safe** - Derived from L1, possibly from the middle of a span batch
/// 4. **Local-safe** - Derived from L1 as a completed span batch
/// 5. **Safe** - Local-safe and cross-verified
/// 6. **Finalized** - Derived from finalized L1 data only
///
/// The backup-unsafe head is not a safety level: it is the unsafe head to roll back to
/// when a pending-safe block fails to become safe.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct EngineHeads {
    unsafe_head: L2BlockInfo,
    cross_unsafe_head: L2BlockInfo,
    pending_safe_head: L2BlockInfo,
    local_safe_head: L2BlockInfo,
    safe_head: L2BlockInfo,
    finalized_head: L2BlockInfo,
    backup_unsafe_head: L2BlockInfo,
}

impl EngineHeads {
    /// Returns the current unsafe head.
    pub const fn unsafe_head(&self) -> L2BlockInfo {
        self.unsafe_head
    }

    /// Returns the current cross-verified unsafe head.
    pub const fn cross_unsafe_head(&self) -> L2BlockInfo {
        self.cross_unsafe_head
    }

    /// Returns the current pending safe head.
    pub const fn pending_safe_head(&self) -> L2BlockInfo {
        self.pending_safe_head
    }

    /// Returns the current local safe head.
    pub const fn local_safe_head(&self) -> L2BlockInfo {
        self.local_safe_head
    }

    /// Returns the current safe head.
    pub const fn safe_head(&self) -> L2BlockInfo {
        self.safe_head
    }

    /// Returns the current finalized head.
    pub const fn finalized_head(&self) -> L2BlockInfo {
        self.finalized_head
    }

    /// Returns the backup unsafe head.
    pub const fn backup_unsafe_head(&self) -> L2BlockInfo {
        self.backup_unsafe_head
    }

    /// Updates a block label metric, keyed by the label.
    #[cfg(feature = "metrics")]
    #[inline]
    fn update_block_label_metric(label: &'static str, number: u64) {
        rollup_macros::set!(gauge, Metrics::BLOCK_LABELS, "label", label, number as f64);
    }

    /// Updates a block label metric, keyed by the label.
    #[cfg(not(feature = "metrics"))]
    #[inline]
    const fn update_block_label_metric(_label: &'static str, _number: u64) {}
}

/// The chain state viewed by the engine controller.
///
/// Setters only assign and record metrics; the consistency rules between the heads
/// are enforced by the controller.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub(crate) heads: EngineHeads,
    pub(crate) sync_status: SyncStatus,
    /// A forkchoice update is owed to the engine.
    pub(crate) need_fcu_call: bool,
    /// Track when the rollup node changes the forkchoice to restore previous
    /// known unsafe chain. e.g. Unsafe Reorg caused by Invalid span batch.
    /// This update is not retried unless the engine returns a non-input error,
    /// because the engine may have forgotten the backup unsafe head.
    pub(crate) need_fcu_call_backup_unsafe_reorg: bool,
    pub(crate) el_sync_started_at: Option<Instant>,
    pub(crate) current_fork: Option<Hardfork>,
    pub(crate) unsafe_payloads: UnsafePayloadQueue,
}

impl EngineState {
    /// Creates the zero state for the given sync mode and payload queue ceiling.
    pub fn new(sync_mode: SyncMode, max_unsafe_payloads_memory: u64) -> Self {
        Self {
            heads: EngineHeads::default(),
            sync_status: SyncStatus::initial(sync_mode),
            need_fcu_call: false,
            need_fcu_call_backup_unsafe_reorg: false,
            el_sync_started_at: None,
            current_fork: None,
            unsafe_payloads: UnsafePayloadQueue::new(max_unsafe_payloads_memory),
        }
    }

    /// Returns the head references.
    pub const fn heads(&self) -> &EngineHeads {
        &self.heads
    }

    /// Returns the [`SyncStatus`].
    pub const fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Returns the buffered unsafe payloads.
    pub const fn unsafe_payloads(&self) -> &UnsafePayloadQueue {
        &self.unsafe_payloads
    }

    /// Returns the fork the unsafe head is on, once known.
    pub const fn current_fork(&self) -> Option<Hardfork> {
        self.current_fork
    }

    /// Returns true while EL sync is pending or in progress.
    pub const fn is_engine_syncing(&self) -> bool {
        self.sync_status.is_syncing()
    }

    /// Creates a `ForkchoiceState`
    ///
    /// - `head_block` = `unsafe_head`
    /// - `safe_block` = `safe_head`
    /// - `finalized_block` = `finalized_head`
    pub const fn forkchoice_state(&self) -> ForkchoiceState {
        ForkchoiceState {
            head_block_hash: self.heads.unsafe_head.hash(),
            safe_block_hash: self.heads.safe_head.hash(),
            finalized_block_hash: self.heads.finalized_head.hash(),
        }
    }

    /// Sets the unsafe head and tracks fork activations along the way.
    pub fn set_unsafe_head(&mut self, chain_spec: &ChainSpec, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::UNSAFE_BLOCK_LABEL, head.number());
        self.heads.unsafe_head = head;
        self.need_fcu_call = true;
        chain_spec.check_fork_activation(
            &mut self.current_fork,
            head.number(),
            head.hash(),
            head.block_info.timestamp,
        );
    }

    /// Sets the cross-unsafe head.
    pub fn set_cross_unsafe_head(&mut self, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::CROSS_UNSAFE_BLOCK_LABEL, head.number());
        self.heads.cross_unsafe_head = head;
    }

    /// Sets the pending safe head.
    pub fn set_pending_safe_head(&mut self, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::PENDING_SAFE_BLOCK_LABEL, head.number());
        self.heads.pending_safe_head = head;
    }

    /// Sets the local safe head.
    pub fn set_local_safe_head(&mut self, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::LOCAL_SAFE_BLOCK_LABEL, head.number());
        self.heads.local_safe_head = head;
    }

    /// Sets the cross-safe head.
    pub fn set_safe_head(&mut self, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::SAFE_BLOCK_LABEL, head.number());
        self.heads.safe_head = head;
        self.need_fcu_call = true;
    }

    /// Sets the finalized head.
    pub fn set_finalized_head(&mut self, head: L2BlockInfo) {
        EngineHeads::update_block_label_metric(Metrics::FINALIZED_BLOCK_LABEL, head.number());
        self.heads.finalized_head = head;
        self.need_fcu_call = true;
    }

    /// Sets the backup unsafe head, optionally requesting a reorg back onto it.
    pub fn set_backup_unsafe_head(&mut self, head: L2BlockInfo, trigger_reorg: bool) {
        EngineHeads::update_block_label_metric(Metrics::BACKUP_UNSAFE_BLOCK_LABEL, head.number());
        self.heads.backup_unsafe_head = head;
        self.need_fcu_call_backup_unsafe_reorg = trigger_reorg;
    }

    /// Overwrites every head at once. The pending safe head follows the local safe head
    /// and the backup unsafe head is cleared.
    pub(crate) fn force_engine_reset(
        &mut self,
        chain_spec: &ChainSpec,
        local_unsafe: L2BlockInfo,
        cross_unsafe: L2BlockInfo,
        local_safe: L2BlockInfo,
        cross_safe: L2BlockInfo,
        finalized: L2BlockInfo,
    ) {
        self.set_unsafe_head(chain_spec, local_unsafe);
        self.set_cross_unsafe_head(cross_unsafe);
        self.set_local_safe_head(local_safe);
        self.set_pending_safe_head(local_safe);
        self.set_safe_head(cross_safe);
        self.set_finalized_head(finalized);
        self.set_backup_unsafe_head(L2BlockInfo::default(), false);
    }

    /// Logs the progress made since `prev`, if the last forkchoice update went through.
    pub(crate) fn log_sync_progress(&self, prev: &EngineHeads) {
        if self.need_fcu_call || self.need_fcu_call_backup_unsafe_reorg {
            return;
        }
        let Some(reason) = sync_progress_reason(prev, &self.heads) else {
            return;
        };
        info!(
            target: "engine",
            reason,
            finalized = %self.heads.finalized_head.id().number,
            safe = %self.heads.safe_head.id().number,
            pending_safe = %self.heads.pending_safe_head.id().number,
            unsafe_head = %self.heads.unsafe_head.id().number,
            backup_unsafe = %self.heads.backup_unsafe_head.id().number,
            l2_time = self.heads.unsafe_head.block_info.timestamp,
            "Sync progress"
        );
    }
}

/// Names the most significant head change between two snapshots.
fn sync_progress_reason(prev: &EngineHeads, now: &EngineHeads) -> Option<&'static str> {
    if prev.finalized_head != now.finalized_head {
        Some("finalized block")
    } else if prev.safe_head != now.safe_head {
        if prev.safe_head == prev.unsafe_head {
            Some("derived safe block from L1")
        } else {
            Some("consolidated block with L1")
        }
    } else if prev.unsafe_head != now.unsafe_head {
        Some("new chain head block")
    } else if prev.pending_safe_head != now.pending_safe_head {
        Some("pending new safe block")
    } else if prev.backup_unsafe_head != now.backup_unsafe_head {
        Some("new backup unsafe block")
    } else {
        None
    }
}
