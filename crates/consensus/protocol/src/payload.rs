//! Execution payload envelopes and build-job handles.

use alloy_eips::BlockNumHash;
use alloy_primitives::{B256, Bytes};
use alloy_rpc_types_engine::{ExecutionPayloadV1, ExecutionPayloadV3, PayloadId};

use crate::BlockInfo;

/// A candidate L2 block body together with its parent beacon block root, as
/// returned by `engine_getPayload` or received from peers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ExecutionPayloadEnvelope {
    /// The parent beacon block root, present from Ecotone onwards.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub parent_beacon_block_root: Option<B256>,
    /// The execution payload.
    pub execution_payload: ExecutionPayloadV3,
}

impl ExecutionPayloadEnvelope {
    /// Creates a new envelope.
    pub const fn new(
        execution_payload: ExecutionPayloadV3,
        parent_beacon_block_root: Option<B256>,
    ) -> Self {
        Self { parent_beacon_block_root, execution_payload }
    }

    const fn inner(&self) -> &ExecutionPayloadV1 {
        &self.execution_payload.payload_inner.payload_inner
    }

    /// Returns the block hash.
    pub const fn block_hash(&self) -> B256 {
        self.inner().block_hash
    }

    /// Returns the block number.
    pub const fn block_number(&self) -> u64 {
        self.inner().block_number
    }

    /// Returns the parent block hash.
    pub const fn parent_hash(&self) -> B256 {
        self.inner().parent_hash
    }

    /// Returns the block timestamp.
    pub const fn timestamp(&self) -> u64 {
        self.inner().timestamp
    }

    /// Returns the EIP-2718 encoded transactions.
    pub fn transactions(&self) -> &[Bytes] {
        &self.inner().transactions
    }

    /// Returns the block id.
    pub const fn id(&self) -> BlockNumHash {
        BlockNumHash { number: self.block_number(), hash: self.block_hash() }
    }

    /// Returns the [`BlockInfo`] of the payload.
    pub const fn block_info(&self) -> BlockInfo {
        BlockInfo::new(self.block_hash(), self.block_number(), self.parent_hash(), self.timestamp())
    }
}

/// Handle of an in-progress block build on the execution engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PayloadInfo {
    /// The opaque build-job id returned by `engine_forkchoiceUpdated`.
    pub id: PayloadId,
    /// The timestamp of the block being built.
    pub timestamp: u64,
}

impl PayloadInfo {
    /// Creates a new [`PayloadInfo`].
    pub const fn new(id: PayloadId, timestamp: u64) -> Self {
        Self { id, timestamp }
    }
}
