//! Optional components the controller notifies when heads move.
//!
//! None of them is required. The controller calls them while holding its state lock,
//! so implementations must not call back into the controller.

use rollup_protocol::L2BlockInfo;

/// Drops the block attributes queued for building when the engine is force-reset.
pub trait AttributesForceResetter: Send + Sync {
    /// Resets onto the given heads.
    fn force_reset(
        &self,
        local_unsafe: L2BlockInfo,
        cross_unsafe: L2BlockInfo,
        local_safe: L2BlockInfo,
        cross_safe: L2BlockInfo,
        finalized: L2BlockInfo,
    );
}

/// Resets the derivation pipeline when the engine is force-reset.
pub trait PipelineForceResetter: Send + Sync {
    /// Resets the pipeline.
    fn reset_pipeline(&self);
}

/// Resets the L1 origin selection of the sequencer when the engine is force-reset.
pub trait OriginSelectorForceResetter: Send + Sync {
    /// Resets the cached origins.
    fn reset_origins(&self);
}

/// Receives the cross-verified heads together with their local counterparts.
pub trait CrossUpdateHandler: Send + Sync {
    /// The cross-unsafe head changed.
    fn on_cross_unsafe_update(&self, cross_unsafe: L2BlockInfo, local_unsafe: L2BlockInfo);

    /// The cross-safe head changed.
    fn on_cross_safe_update(&self, cross_safe: L2BlockInfo, local_safe: L2BlockInfo);
}

/// Observes the start of execution-layer sync.
pub trait ElSyncObserver: Send + Sync {
    /// The engine started syncing itself.
    fn on_el_sync_started(&self);
}
