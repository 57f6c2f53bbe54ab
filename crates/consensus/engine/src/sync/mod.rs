//! Loading the forkchoice state the execution engine currently holds.

mod forkchoice;
pub use forkchoice::L2ForkchoiceState;

mod error;
pub use error::SyncStartError;
pub(crate) use forkchoice::block_ref_compat;
