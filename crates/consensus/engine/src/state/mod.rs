//! Head references and sync status owned by the engine controller.

mod core;
pub use self::core::{EngineHeads, EngineState, SyncStatus};
