//! Events exchanged between the engine controller and its neighbours.
//!
//! Every subsystem boundary has its own closed enum; [`Event`] is the sum of them and
//! is what travels through the FIFO drained by the [`crate::EventRouter`].

use std::{error::Error, sync::Arc, time::Instant};

use alloy_eips::BlockNumHash;
use derive_more::From;
use rollup_protocol::{
    AttributesWithParent, BlockInfo, ExecutionPayloadEnvelope, L2BlockInfo, PayloadInfo,
};
use tokio::sync::mpsc;

use crate::EngineErrorSeverity;

/// A shareable error carried by events.
pub type EventError = Arc<dyn Error + Send + Sync>;

/// Any event travelling through the event FIFO.
#[derive(Debug, Clone, From)]
pub enum Event {
    /// An event handled by the engine controller.
    Engine(EngineEvent),
    /// A notification for the derivation pipeline.
    Derivation(DerivationEvent),
    /// An interop event.
    Interop(InteropEvent),
    /// An error raised by a handler.
    Error(ErrorEvent),
}

/// Events owned by the engine controller and the block-build pipeline.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The local unsafe head changed.
    UnsafeUpdate {
        /// The new unsafe head.
        block: L2BlockInfo,
    },
    /// A block is promoted to cross-unsafe.
    PromoteCrossUnsafe {
        /// The new cross-unsafe head.
        block: L2BlockInfo,
    },
    /// The pending safe head changed.
    PendingSafeUpdate {
        /// The pending safe head.
        pending_safe: L2BlockInfo,
        /// The unsafe head at the time of the update.
        unsafe_head: L2BlockInfo,
    },
    /// A block became local-safe.
    LocalSafeUpdate {
        /// The new local safe head.
        block: L2BlockInfo,
        /// The L1 block it was derived from.
        source: BlockInfo,
    },
    /// A block became cross-safe.
    SafeDerived {
        /// The new safe head.
        safe: L2BlockInfo,
        /// The L1 block it was derived from.
        source: BlockInfo,
    },
    /// A block was finalized.
    FinalizedUpdate {
        /// The new finalized head.
        block: L2BlockInfo,
    },
    /// The forkchoice state of the engine was updated.
    ForkchoiceUpdate {
        /// The unsafe head.
        unsafe_head: L2BlockInfo,
        /// The safe head.
        safe: L2BlockInfo,
        /// The finalized head.
        finalized: L2BlockInfo,
    },
    /// Requests a reset of the engine onto the forkchoice state it currently holds.
    ResetEngineRequest,
    /// The engine was force-reset to the carried heads.
    EngineResetConfirmed {
        /// The local unsafe head.
        local_unsafe: L2BlockInfo,
        /// The cross-unsafe head.
        cross_unsafe: L2BlockInfo,
        /// The local safe head.
        local_safe: L2BlockInfo,
        /// The cross-safe head.
        cross_safe: L2BlockInfo,
        /// The finalized head.
        finalized: L2BlockInfo,
    },
    /// Start building a block with the given attributes.
    BuildStart {
        /// The payload attributes.
        attributes: Arc<AttributesWithParent>,
    },
    /// The engine accepted the build job.
    BuildStarted {
        /// The build job.
        info: PayloadInfo,
        /// When the build was started.
        build_started: Instant,
        /// The parent the block is built on.
        parent: L2BlockInfo,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// Seal the in-progress build.
    BuildSeal {
        /// The build job.
        info: PayloadInfo,
        /// When the build was started.
        build_started: Instant,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// The build was sealed into a payload.
    BuildSealed {
        /// The build job.
        info: PayloadInfo,
        /// The sealed payload.
        envelope: Arc<ExecutionPayloadEnvelope>,
        /// The block reference of the payload.
        block: L2BlockInfo,
        /// When the build was started.
        build_started: Instant,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// The sealed payload failed the sanity checks and will not be retried.
    PayloadSealInvalid {
        /// The build job.
        info: PayloadInfo,
        /// Why the payload is invalid.
        err: EventError,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// The build job could not be sealed; the same attributes may be retried.
    PayloadSealExpiredError {
        /// The build job.
        info: PayloadInfo,
        /// Why sealing failed.
        err: EventError,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// Insert the payload into the engine.
    PayloadProcess {
        /// The payload.
        envelope: Arc<ExecutionPayloadEnvelope>,
        /// The block reference of the payload.
        block: L2BlockInfo,
        /// When the build was started.
        build_started: Instant,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// The payload was inserted.
    PayloadSuccess {
        /// The payload.
        envelope: Arc<ExecutionPayloadEnvelope>,
        /// The block reference of the payload.
        block: L2BlockInfo,
        /// Whether the block concludes its span batch.
        concluding: bool,
        /// The L1 block the attributes were derived from, if any.
        derived_from: Option<BlockInfo>,
    },
    /// The engine reported the payload as invalid.
    PayloadInvalid {
        /// The payload.
        envelope: Arc<ExecutionPayloadEnvelope>,
        /// The reason reported by the engine.
        err: EventError,
    },
    /// The engine rejected the payload attributes of a build.
    BuildInvalid {
        /// The rejected attributes.
        attributes: Arc<AttributesWithParent>,
        /// The error reported by the engine.
        err: EventError,
    },
    /// Cancel an in-progress build.
    BuildCancel {
        /// The build job.
        info: PayloadInfo,
        /// Suppress errors of the cancellation.
        force: bool,
    },
}

/// Notifications for the derivation pipeline.
#[derive(Debug, Clone)]
pub enum DerivationEvent {
    /// The attributes could not be built into a block and must be re-derived.
    InvalidPayloadAttributes {
        /// The rejected attributes.
        attributes: Arc<AttributesWithParent>,
        /// Why the attributes were rejected.
        err: EventError,
    },
    /// Requests deposits-only replacement attributes for a block that failed post-Holocene.
    DepositsOnlyPayloadAttributesRequest {
        /// The parent of the replaced block.
        parent: BlockNumHash,
        /// The L1 block the replaced block was derived from.
        derived_from: BlockInfo,
    },
    /// The derivation pipeline may resume after an engine reset.
    ConfirmPipelineReset,
}

/// Events of the interop block-replacement flow.
#[derive(Debug, Clone)]
pub enum InteropEvent {
    /// A block was found invalid and must be replaced by building the carried attributes.
    InvalidateBlock {
        /// The invalidated block.
        invalidated: BlockNumHash,
        /// The replacement attributes.
        attributes: Arc<AttributesWithParent>,
    },
    /// The replacement block was inserted.
    ReplacedBlock {
        /// The replacement payload.
        envelope: Arc<ExecutionPayloadEnvelope>,
        /// The block reference of the replacement.
        block: L2BlockInfo,
    },
}

/// An error raised by an event handler, selecting the recovery path.
#[derive(Debug, Clone)]
pub enum ErrorEvent {
    /// Retry the same step later.
    Temporary(EventError),
    /// Reset the engine before retrying.
    Reset(EventError),
    /// Stop the node.
    Critical(EventError),
}

impl ErrorEvent {
    /// Wraps an error with the given severity.
    pub fn new(severity: EngineErrorSeverity, err: impl Error + Send + Sync + 'static) -> Self {
        let err: EventError = Arc::new(err);
        match severity {
            EngineErrorSeverity::Temporary => Self::Temporary(err),
            EngineErrorSeverity::Reset => Self::Reset(err),
            EngineErrorSeverity::Critical => Self::Critical(err),
        }
    }

    /// The severity of the error.
    pub const fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::Temporary(_) => EngineErrorSeverity::Temporary,
            Self::Reset(_) => EngineErrorSeverity::Reset,
            Self::Critical(_) => EngineErrorSeverity::Critical,
        }
    }

    /// The carried error.
    pub const fn error(&self) -> &EventError {
        match self {
            Self::Temporary(err) | Self::Reset(err) | Self::Critical(err) => err,
        }
    }
}

/// Enqueues events onto the FIFO drained by the [`crate::EventRouter`].
///
/// Emitting never blocks and never runs a handler.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventEmitter {
    /// Creates an emitter and the receiving side of its FIFO.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues an event.
    pub fn emit(&self, event: impl Into<Event>) {
        if let Err(err) = self.tx.send(event.into()) {
            warn!(target: "engine_router", event = ?err.0, "Event FIFO closed, dropping event");
        }
    }

    /// Enqueues an error event of the given severity.
    pub fn emit_error(&self, severity: EngineErrorSeverity, err: impl Error + Send + Sync + 'static) {
        self.emit(ErrorEvent::new(severity, err));
    }
}
