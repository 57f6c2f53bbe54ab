//! The execution engine seam.

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use alloy_rpc_types_engine::{ExecutionPayloadV3, ForkchoiceState, ForkchoiceUpdated, PayloadStatus};
use alloy_transport::{RpcError, TransportErrorKind, TransportResult};
use async_trait::async_trait;
use rollup_protocol::{
    ExecutionPayloadEnvelope, FromPayloadError, L2BlockInfo, PayloadInfo, RollupPayloadAttributes,
};
use thiserror::Error;

/// An error that occurred in the [`EngineClient`].
#[derive(Error, Debug)]
pub enum EngineClientError {
    /// An RPC error occurred
    #[error("An RPC error occurred: {0}")]
    RpcError(#[from] RpcError<TransportErrorKind>),

    /// An error occurred while decoding the block reference
    #[error("An error occurred while decoding the block reference: {0}")]
    BlockInfoDecodeError(#[from] FromPayloadError),
}

/// The engine API operations the engine controller consumes.
///
/// Implementations wrap an authenticated engine API transport. Block-reference
/// lookups return `Ok(None)` when the engine does not know the requested block.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Updates the forkchoice of the engine, optionally starting a block build.
    async fn fork_choice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<RollupPayloadAttributes>,
    ) -> TransportResult<ForkchoiceUpdated>;

    /// Submits an execution payload for validation and insertion.
    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        parent_beacon_block_root: Option<B256>,
    ) -> TransportResult<PayloadStatus>;

    /// Retrieves the payload of a build job. The engine stops building once it is retrieved.
    async fn get_payload(&self, info: PayloadInfo) -> TransportResult<ExecutionPayloadEnvelope>;

    /// Fetches the [`L2BlockInfo`] by [`BlockNumberOrTag`].
    async fn l2_block_ref_by_label(
        &self,
        numtag: BlockNumberOrTag,
    ) -> Result<Option<L2BlockInfo>, EngineClientError>;

    /// Fetches the [`L2BlockInfo`] by block hash.
    async fn l2_block_ref_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<L2BlockInfo>, EngineClientError>;
}

/// Records the duration of an engine method call, labelled by method name.
#[cfg(feature = "metrics")]
pub(crate) async fn record_call_time<T>(
    method: &'static str,
    f: impl std::future::Future<Output = T>,
) -> T {
    let start = std::time::Instant::now();
    let result = f.await;
    rollup_macros::record!(
        histogram,
        crate::Metrics::ENGINE_METHOD_REQUEST_DURATION,
        "method",
        method,
        start.elapsed().as_secs_f64()
    );
    result
}

/// Records the duration of an engine method call, labelled by method name.
#[cfg(not(feature = "metrics"))]
pub(crate) async fn record_call_time<T>(
    _method: &'static str,
    f: impl std::future::Future<Output = T>,
) -> T {
    f.await
}
