//! Errors of the engine controller operations.

use alloy_eips::BlockNumberOrTag;
use alloy_rpc_types_engine::PayloadStatusEnum;
use alloy_transport::TransportError;
use rollup_protocol::L2BlockInfo;
use thiserror::Error;

use crate::{
    EngineClientError, EngineError, EngineErrorSeverity, ForkchoiceUpdateError, SyncStatus,
};

/// A failed attempt to bring the engine forkchoice in line with the controller heads.
#[derive(Debug, Error)]
pub enum EngineUpdateError {
    /// An unknown head could not be loaded from the engine.
    #[error("failed to load {label} head from engine: {source}")]
    LoadHead {
        /// The requested label.
        label: BlockNumberOrTag,
        /// The client error.
        source: EngineClientError,
    },
    /// The engine does not know a head it must have.
    #[error("engine has no {0} block")]
    HeadNotFound(BlockNumberOrTag),
    /// The unsafe head fell behind the finalized head.
    #[error("invalid sync state, unsafe head {unsafe_head} is behind finalized head {finalized}")]
    UnsafeBehindFinalized {
        /// Number of the unsafe head.
        unsafe_head: u64,
        /// Number of the finalized head.
        finalized: u64,
    },
    /// The forkchoice update failed.
    #[error(transparent)]
    Forkchoice(#[from] ForkchoiceUpdateError),
}

impl EngineError for EngineUpdateError {
    fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::LoadHead { .. } | Self::HeadNotFound(_) => EngineErrorSeverity::Temporary,
            Self::UnsafeBehindFinalized { .. } => EngineErrorSeverity::Critical,
            Self::Forkchoice(err) => err.severity(),
        }
    }
}

/// A failed synchronous insertion of an unsafe payload.
#[derive(Debug, Error)]
pub enum InsertPayloadError {
    /// The finalized label could not be probed before EL sync.
    #[error("failed to fetch finalized head before EL sync: {0}")]
    FetchFinalized(EngineClientError),
    /// `engine_newPayload` failed.
    #[error("failed to update insert payload: {0}")]
    NewPayload(TransportError),
    /// `engine_newPayload` returned a status the sync status does not accept.
    #[error("cannot process unsafe payload {block}: new payload status {status} is unacceptable in {sync_status:?}")]
    UnacceptableNewPayloadStatus {
        /// The inserted block.
        block: L2BlockInfo,
        /// The returned status.
        status: PayloadStatusEnum,
        /// The sync status at the time of the call.
        sync_status: SyncStatus,
    },
    /// The forkchoice update onto the payload failed.
    #[error(transparent)]
    Forkchoice(#[from] ForkchoiceUpdateError),
    /// `engine_forkchoiceUpdated` returned a status the sync status does not accept.
    #[error("cannot prepare unsafe chain for new payload {block}: forkchoice status {status} is unacceptable in {sync_status:?}")]
    UnacceptableForkchoiceStatus {
        /// The inserted block.
        block: L2BlockInfo,
        /// The returned status.
        status: PayloadStatusEnum,
        /// The sync status at the time of the call.
        sync_status: SyncStatus,
    },
}

impl EngineError for InsertPayloadError {
    fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::Forkchoice(err) => err.severity(),
            Self::FetchFinalized(_)
            | Self::NewPayload(_)
            | Self::UnacceptableNewPayloadStatus { .. }
            | Self::UnacceptableForkchoiceStatus { .. } => EngineErrorSeverity::Temporary,
        }
    }
}

/// A failed reorg back onto the backup unsafe head.
#[derive(Debug, Error)]
pub enum BackupReorgError {
    /// The forkchoice update failed.
    #[error(transparent)]
    Forkchoice(#[from] ForkchoiceUpdateError),
    /// The engine did not accept the backup unsafe head.
    #[error("cannot restore unsafe chain using backup unsafe head: forkchoice status {0}")]
    Rejected(PayloadStatusEnum),
}

impl EngineError for BackupReorgError {
    fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::Forkchoice(err) => err.severity(),
            Self::Rejected(_) => EngineErrorSeverity::Temporary,
        }
    }
}
