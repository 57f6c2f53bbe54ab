#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! ## Architecture
//!
//! Every state transition happens in response to an event dequeued by the [`EventRouter`]:
//!
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │ Derivation  │───►│  Event FIFO  │───►│  EventRouter     │
//! │ Sequencer   │    │  (Emitter)   │    │                  │
//! └─────────────┘    └──────────────┘    └──────────────────┘
//!                           ▲                     │
//!                           │                     ▼
//!                    ┌──────────────┐    ┌──────────────────┐
//!                    │ Build        │◄───┤ EngineController │
//!                    │ Pipeline     │    │ (EngineState)    │
//!                    └──────────────┘    └──────────────────┘
//!                           │                     │
//!                           ▼                     ▼
//!                    ┌─────────────────────────────────────┐
//!                    │        EngineClient (Engine API)    │
//!                    └─────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - **Controller** - Head tracking and forkchoice sync via [`EngineController`]
//! - **Build** - The start, seal, process and cancel stages of block building
//! - **Queue** - Buffering of gossiped payloads via [`UnsafePayloadQueue`]
//! - **Events** - The event vocabulary of the node via [`Event`] and [`EventEmitter`]
//! - **Router** - The event loop via [`EventRouter`]
//! - **Client** - The Engine API seam via [`EngineClient`]
//! - **Metrics** - Optional Prometheus metrics collection via [`Metrics`]

#[macro_use]
extern crate tracing;

mod build;
pub use build::{
    BuildStartError, CancelPayloadError, DepositsOnlyBlockInvalid, InvalidNewPayload,
    PayloadProcessError, REPLACE_BLOCK_SOURCE, SanityCheckError, SealPayloadError, last_deposit,
    sanity_check_payload,
};

mod client;
pub use client::{EngineClient, EngineClientError};

mod config;
pub use config::{
    DEFAULT_ENGINE_CALL_TIMEOUT, DEFAULT_MAX_UNSAFE_PAYLOADS_MEMORY, EngineConfig, EngineTimeouts,
    SyncConfig, SyncMode,
};

mod controller;
pub use controller::{
    AttributesForceResetter, BackupReorgError, CrossUpdateHandler, ElSyncObserver,
    EngineController, EngineUpdateError, InsertPayloadError, OriginSelectorForceResetter,
    PipelineForceResetter,
};

mod errors;
pub use errors::{BlockInsertionErrorKind, EngineError, EngineErrorSeverity};

mod events;
pub use events::{
    DerivationEvent, EngineEvent, ErrorEvent, Event, EventEmitter, EventError, InteropEvent,
};

mod forkchoice;
pub use forkchoice::{
    ForkchoiceUpdateError, INVALID_FORKCHOICE_STATE, INVALID_PAYLOAD_ATTRIBUTES,
    StartPayloadError, UNKNOWN_PAYLOAD, check_forkchoice_updated_status, check_new_payload_status,
    error_code, is_engine_error_code, start_payload,
};

mod metrics;
pub use metrics::Metrics;

mod queue;
pub use queue::{
    PAYLOAD_MEM_FIXED_COST, PAYLOAD_TX_MEM_OVERHEAD, PayloadQueueError, QueueEntry,
    UnsafePayloadQueue, payload_mem_size,
};

mod router;
pub use router::{EventHandler, EventRouter, RouterError};

mod state;
pub use state::{EngineHeads, EngineState, SyncStatus};

mod sync;
pub use sync::{L2ForkchoiceState, SyncStartError};

#[cfg(any(test, feature = "test-utils"))]
/// Utilities that are useful when creating unit tests using structs within this library.
pub mod test_utils;
