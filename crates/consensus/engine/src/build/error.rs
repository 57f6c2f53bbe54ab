//! Errors of the block-build pipeline.

use std::time::Duration;

use alloy_primitives::B256;
use alloy_rpc_types_engine::{PayloadId, PayloadStatusEnum};
use alloy_transport::TransportError;
use rollup_protocol::{FromPayloadError, L2BlockInfo};
use thiserror::Error;

use crate::{
    BlockInsertionErrorKind, EngineError, EngineErrorSeverity, EventError, StartPayloadError,
    build::SanityCheckError,
};

/// A block build could not be started.
#[derive(Debug, Error)]
pub enum BuildStartError {
    /// The parent is older than the finalized head.
    #[error("cannot build block on top of {parent}, it is behind the finalized head {finalized}")]
    ParentBehindFinalized {
        /// Number of the requested parent.
        parent: u64,
        /// Number of the finalized head.
        finalized: u64,
    },
    /// The forkchoice update starting the build failed.
    #[error("failed to start block build: {0}")]
    Start(#[from] StartPayloadError),
}

impl EngineError for BuildStartError {
    fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::ParentBehindFinalized { .. } => EngineErrorSeverity::Critical,
            Self::Start(err) => match err.kind() {
                BlockInsertionErrorKind::Temporary => EngineErrorSeverity::Temporary,
                BlockInsertionErrorKind::Prestate => EngineErrorSeverity::Reset,
                // Reported as a build-invalid event instead.
                BlockInsertionErrorKind::Payload => EngineErrorSeverity::Temporary,
            },
        }
    }
}

/// A build job could not be sealed into a payload.
#[derive(Debug, Error)]
pub enum SealPayloadError {
    /// `engine_getPayload` failed.
    #[error("failed to seal execution payload (ID: {id}): {source}")]
    GetPayload {
        /// The build job id.
        id: PayloadId,
        /// The engine error.
        source: TransportError,
    },
    /// `engine_getPayload` did not complete in time.
    #[error("sealing execution payload (ID: {id}) timed out after {timeout:?}")]
    Timeout {
        /// The build job id.
        id: PayloadId,
        /// The exhausted budget.
        timeout: Duration,
    },
    /// The sealed payload is malformed.
    #[error("failed sanity-check of execution payload contents (ID: {id}, blockhash: {hash}): {source}")]
    SanityCheck {
        /// The build job id.
        id: PayloadId,
        /// Hash of the sealed block.
        hash: B256,
        /// The failed check.
        source: SanityCheckError,
    },
    /// The block reference of the sealed payload could not be decoded.
    #[error("failed to decode L2 block ref from payload (ID: {id}): {source}")]
    BlockRef {
        /// The build job id.
        id: PayloadId,
        /// The decoding error.
        source: FromPayloadError,
    },
}

/// A sealed payload could not be inserted into the engine.
#[derive(Debug, Error)]
pub enum PayloadProcessError {
    /// `engine_newPayload` failed.
    #[error("failed to insert execution payload: {0}")]
    NewPayload(TransportError),
    /// `engine_newPayload` did not complete in time.
    #[error("inserting execution payload timed out after {0:?}")]
    Timeout(Duration),
    /// The engine answered with a status other than valid or invalid.
    #[error("failed to process block with unexpected status {status} (block {block})")]
    UnexpectedStatus {
        /// The returned status.
        status: PayloadStatusEnum,
        /// The inserted block.
        block: L2BlockInfo,
    },
}

impl EngineError for PayloadProcessError {
    fn severity(&self) -> EngineErrorSeverity {
        EngineErrorSeverity::Temporary
    }
}

/// The engine reported a payload as invalid.
#[derive(Debug, Error)]
#[error("cannot process payload {number} ({hash}): {validation_error}")]
pub struct InvalidNewPayload {
    /// Number of the payload.
    pub number: u64,
    /// Hash of the payload.
    pub hash: B256,
    /// The validation error reported by the engine.
    pub validation_error: String,
}

/// A build job could not be cancelled.
#[derive(Debug, Error)]
pub enum CancelPayloadError {
    /// `engine_getPayload` failed.
    #[error("failed to cancel block building job (ID: {id}): {source}")]
    GetPayload {
        /// The build job id.
        id: PayloadId,
        /// The engine error.
        source: TransportError,
    },
    /// `engine_getPayload` did not complete in time.
    #[error("cancelling block building job (ID: {id}) timed out after {timeout:?}")]
    Timeout {
        /// The build job id.
        id: PayloadId,
        /// The exhausted budget.
        timeout: Duration,
    },
}

impl EngineError for CancelPayloadError {
    fn severity(&self) -> EngineErrorSeverity {
        EngineErrorSeverity::Temporary
    }
}

/// Attributes holding only deposits were rejected, which leaves no way forward.
#[derive(Debug, Error)]
#[error("failed to process block with only deposit transactions: {0}")]
pub struct DepositsOnlyBlockInvalid(pub EventError);

impl EngineError for DepositsOnlyBlockInvalid {
    fn severity(&self) -> EngineErrorSeverity {
        EngineErrorSeverity::Critical
    }
}
