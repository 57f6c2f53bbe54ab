//! The engine controller.

mod collaborators;
pub use collaborators::{
    AttributesForceResetter, CrossUpdateHandler, ElSyncObserver, OriginSelectorForceResetter,
    PipelineForceResetter,
};

mod core;
pub use self::core::EngineController;

mod error;
pub use error::{BackupReorgError, EngineUpdateError, InsertPayloadError};

mod handlers;
