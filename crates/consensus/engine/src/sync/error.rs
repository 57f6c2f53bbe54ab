//! Errors of loading the engine forkchoice state.

use alloy_eips::BlockNumberOrTag;
use thiserror::Error;

use crate::{EngineClientError, EngineError, EngineErrorSeverity};

/// An error that can occur while loading the forkchoice state of the engine.
#[derive(Error, Debug)]
pub enum SyncStartError {
    /// The engine client failed.
    #[error(transparent)]
    Client(#[from] EngineClientError),
    /// A block the forkchoice state requires is unknown to the engine.
    #[error("block not found: {0}")]
    BlockNotFound(BlockNumberOrTag),
}

impl EngineError for SyncStartError {
    fn severity(&self) -> EngineErrorSeverity {
        EngineErrorSeverity::Reset
    }
}
