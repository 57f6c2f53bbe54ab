//! Block, payload and event fixtures shared by the engine tests.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use alloy_eips::BlockNumHash;
use alloy_primitives::{B256, Bytes};
use alloy_rpc_types_engine::{ForkchoiceUpdated, PayloadId, PayloadStatus, PayloadStatusEnum};
use rollup_genesis::{ChainGenesis, RollupConfig};
use rollup_protocol::{
    BlockInfo, ExecutionPayloadEnvelope, L2BlockInfo,
    test_utils::{l1_info_deposit, payload_with},
};
use tokio::sync::mpsc;

use crate::{
    AttributesForceResetter, CrossUpdateHandler, ElSyncObserver, EngineConfig, Event,
    OriginSelectorForceResetter, PipelineForceResetter,
};

/// The L1 origin every fixture block is derived from.
pub const FIXTURE_L1_ORIGIN: BlockNumHash = BlockNumHash { number: 1, hash: B256::repeat_byte(0x11) };

/// A deterministic, non-zero block hash for the given height.
pub fn hash_of(number: u64) -> B256 {
    B256::left_padding_from(&(number + 1).to_be_bytes())
}

/// A block reference on the fixture chain. Heights are linked by [`hash_of`].
pub fn block_ref(number: u64) -> L2BlockInfo {
    let parent_hash = if number == 0 { B256::ZERO } else { hash_of(number - 1) };
    L2BlockInfo::new(
        BlockInfo::new(hash_of(number), number, parent_hash, number * 2),
        FIXTURE_L1_ORIGIN,
        number,
    )
}

/// A block reference that forks off the fixture chain at the given height.
pub fn fork_ref(number: u64) -> L2BlockInfo {
    let mut block = block_ref(number);
    block.block_info.hash = B256::repeat_byte(0xf0 | (number as u8 & 0x0f));
    block
}

/// Builds a payload that decodes back into `block`, with the L1 info deposit first.
pub fn payload_for(block: &L2BlockInfo, extra: Vec<Bytes>) -> Arc<ExecutionPayloadEnvelope> {
    let mut transactions = vec![l1_info_deposit(
        block.l1_origin.number,
        block.l1_origin.hash,
        block.seq_num,
    )];
    transactions.extend(extra);
    let payload = payload_with(
        block.number(),
        block.hash(),
        block.block_info.parent_hash,
        block.block_info.timestamp,
        transactions,
    );
    Arc::new(ExecutionPayloadEnvelope::new(payload, Some(B256::ZERO)))
}

/// A rollup configuration whose genesis is block 0 of the fixture chain.
pub fn test_rollup_config() -> RollupConfig {
    RollupConfig {
        genesis: ChainGenesis {
            l1: FIXTURE_L1_ORIGIN,
            l2: block_ref(0).id(),
            l2_time: 0,
        },
        block_time: 2,
        l1_chain_id: 1,
        l2_chain_id: 10,
        ..Default::default()
    }
}

/// An engine configuration on the fixture chain.
pub fn test_config() -> EngineConfig {
    EngineConfig::new(Arc::new(test_rollup_config()))
}

/// A payload status without a latest valid hash.
pub const fn status(status: PayloadStatusEnum) -> PayloadStatus {
    PayloadStatus { status, latest_valid_hash: None }
}

/// A forkchoice-updated response with the given status.
pub const fn fcu_response(
    status: PayloadStatusEnum,
    payload_id: Option<PayloadId>,
) -> ForkchoiceUpdated {
    ForkchoiceUpdated {
        payload_status: PayloadStatus { status, latest_valid_hash: None },
        payload_id,
    }
}

/// An invalid payload status.
pub fn invalid_status() -> PayloadStatusEnum {
    PayloadStatusEnum::Invalid { validation_error: "bad block".to_string() }
}

/// Collects the events emitted during a test.
#[derive(Debug)]
pub struct EventCollector {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventCollector {
    /// Wraps the receiving side of an event channel.
    pub const fn new(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx }
    }

    /// Returns every event emitted since the last drain, in order.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// A plain error carrying a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub &'static str);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for TestError {}

/// Implements every collaborator and records the calls it receives.
#[derive(Debug, Default)]
pub struct RecordingCollaborator {
    calls: Mutex<Vec<String>>,
}

impl RecordingCollaborator {
    /// Creates a shareable recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl AttributesForceResetter for RecordingCollaborator {
    fn force_reset(
        &self,
        local_unsafe: L2BlockInfo,
        cross_unsafe: L2BlockInfo,
        local_safe: L2BlockInfo,
        cross_safe: L2BlockInfo,
        finalized: L2BlockInfo,
    ) {
        self.record(format!(
            "force_reset({},{},{},{},{})",
            local_unsafe.number(),
            cross_unsafe.number(),
            local_safe.number(),
            cross_safe.number(),
            finalized.number()
        ));
    }
}

impl PipelineForceResetter for RecordingCollaborator {
    fn reset_pipeline(&self) {
        self.record("reset_pipeline".to_string());
    }
}

impl OriginSelectorForceResetter for RecordingCollaborator {
    fn reset_origins(&self) {
        self.record("reset_origins".to_string());
    }
}

impl CrossUpdateHandler for RecordingCollaborator {
    fn on_cross_unsafe_update(&self, cross_unsafe: L2BlockInfo, local_unsafe: L2BlockInfo) {
        self.record(format!(
            "cross_unsafe({},{})",
            cross_unsafe.number(),
            local_unsafe.number()
        ));
    }

    fn on_cross_safe_update(&self, cross_safe: L2BlockInfo, local_safe: L2BlockInfo) {
        self.record(format!("cross_safe({},{})", cross_safe.number(), local_safe.number()));
    }
}

impl ElSyncObserver for RecordingCollaborator {
    fn on_el_sync_started(&self) {
        self.record("el_sync_started".to_string());
    }
}
