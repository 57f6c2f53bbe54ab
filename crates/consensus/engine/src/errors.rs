//! Error severities shared by every engine operation.

use derive_more::Display;

/// The severity of an engine error, selecting the recovery path of the node.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy, Hash)]
pub enum EngineErrorSeverity {
    /// The operation may be retried unchanged at a later time.
    #[display("temporary")]
    Temporary,
    /// The engine state diverged from the node; a full reset is required before retrying.
    #[display("reset")]
    Reset,
    /// An invariant was violated and the node must stop.
    #[display("critical")]
    Critical,
}

impl EngineErrorSeverity {
    /// The metric label of the severity.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Temporary => "temporary",
            Self::Reset => "reset",
            Self::Critical => "critical",
        }
    }
}

/// An error raised by an engine operation, carrying its [`EngineErrorSeverity`].
pub trait EngineError: std::error::Error + Send + Sync + 'static {
    /// The severity of the error.
    fn severity(&self) -> EngineErrorSeverity;
}

/// Classification of a failed attempt to start building a block.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BlockInsertionErrorKind {
    /// The insertion failed but may succeed later with the same payload.
    #[display("temporary")]
    Temporary,
    /// The pre-state for the payload could not be prepared, e.g. due to missing chain data.
    #[display("prestate")]
    Prestate,
    /// The payload is invalid and cannot become canonical.
    #[display("payload")]
    Payload,
}
