//! Engine forkchoice calls and the classification of their outcomes.

use std::time::Duration;

use alloy_rpc_types_engine::{
    ForkchoiceState, INVALID_FORK_CHOICE_STATE_ERROR, PayloadId, PayloadStatusEnum,
};
use alloy_transport::TransportError;
use rollup_protocol::RollupPayloadAttributes;
use thiserror::Error;

use crate::{
    BlockInsertionErrorKind, EngineClient, EngineError, EngineErrorSeverity, Metrics, SyncMode,
    SyncStatus, client::record_call_time,
};

/// JSON-RPC error code of an unknown build job.
pub const UNKNOWN_PAYLOAD: i64 = -38001;

/// JSON-RPC error code of a forkchoice state the engine cannot apply.
pub const INVALID_FORKCHOICE_STATE: i64 = INVALID_FORK_CHOICE_STATE_ERROR as i64;

/// JSON-RPC error code of payload attributes the engine rejects.
pub const INVALID_PAYLOAD_ATTRIBUTES: i64 = -38003;

/// Returns true if the code lies in the range reserved for engine API errors.
pub const fn is_engine_error_code(code: i64) -> bool {
    matches!(code, -38099..=-38000)
}

/// Returns the JSON-RPC error code of a failed engine call, if the engine responded with one.
pub fn error_code(err: &TransportError) -> Option<i64> {
    err.as_error_resp().map(|payload| payload.code)
}

/// A failed `engine_forkchoiceUpdated` call without payload attributes.
#[derive(Debug, Error)]
pub enum ForkchoiceUpdateError {
    /// The forkchoice state was rejected by the engine.
    #[error("forkchoice update was inconsistent with engine, need reset to resolve: {0}")]
    InconsistentForkchoiceState(TransportError),
    /// The engine responded with an error code other than an invalid forkchoice state.
    #[error("unexpected error code in forkchoice-updated response: {0}")]
    UnexpectedErrorCode(TransportError),
    /// The call failed without an engine response.
    #[error("failed to sync forkchoice with engine: {0}")]
    Transport(TransportError),
}

impl ForkchoiceUpdateError {
    /// Classifies a failed forkchoice update.
    pub fn classify(err: TransportError) -> Self {
        match error_code(&err) {
            Some(INVALID_FORKCHOICE_STATE) => Self::InconsistentForkchoiceState(err),
            Some(_) => Self::UnexpectedErrorCode(err),
            None => Self::Transport(err),
        }
    }
}

impl EngineError for ForkchoiceUpdateError {
    fn severity(&self) -> EngineErrorSeverity {
        match self {
            Self::InconsistentForkchoiceState(_) => EngineErrorSeverity::Reset,
            Self::UnexpectedErrorCode(_) | Self::Transport(_) => EngineErrorSeverity::Temporary,
        }
    }
}

/// Checks the status returned by `engine_newPayload` against the sync status.
///
/// In EL sync mode, a valid payload while syncing moves the status to
/// [`SyncStatus::FinishedElNotFinalized`].
pub fn check_new_payload_status(
    mode: SyncMode,
    sync_status: &mut SyncStatus,
    status: &PayloadStatusEnum,
) -> bool {
    match mode {
        SyncMode::ExecutionLayer => {
            finish_el_sync_if_valid(sync_status, status);
            matches!(
                status,
                PayloadStatusEnum::Valid | PayloadStatusEnum::Syncing | PayloadStatusEnum::Accepted
            )
        }
        SyncMode::ConsensusLayer => status.is_valid(),
    }
}

/// Checks the status returned by `engine_forkchoiceUpdated` against the sync status.
///
/// Unlike [`check_new_payload_status`], an `ACCEPTED` status is never acceptable.
pub fn check_forkchoice_updated_status(
    mode: SyncMode,
    sync_status: &mut SyncStatus,
    status: &PayloadStatusEnum,
) -> bool {
    match mode {
        SyncMode::ExecutionLayer => {
            finish_el_sync_if_valid(sync_status, status);
            matches!(status, PayloadStatusEnum::Valid | PayloadStatusEnum::Syncing)
        }
        SyncMode::ConsensusLayer => status.is_valid(),
    }
}

fn finish_el_sync_if_valid(sync_status: &mut SyncStatus, status: &PayloadStatusEnum) {
    if status.is_valid() && *sync_status == SyncStatus::StartedEl {
        *sync_status = SyncStatus::FinishedElNotFinalized;
    }
}

/// A failed attempt to start a block build.
#[derive(Debug, Error)]
pub enum StartPayloadError {
    /// The forkchoice state was rejected by the engine.
    #[error("pre-block-creation forkchoice update was inconsistent with engine, need reset to resolve: {0}")]
    InconsistentForkchoiceState(TransportError),
    /// The payload attributes were rejected by the engine.
    #[error("payload attributes are not valid, cannot build block: {0}")]
    InvalidPayloadAttributes(TransportError),
    /// The engine responded with another engine API error code.
    #[error("unexpected engine error code in forkchoice-updated response: {0}")]
    EngineErrorCode(TransportError),
    /// The engine responded with a generic JSON-RPC error code.
    #[error("unexpected generic error code in forkchoice-updated response: {0}")]
    GenericErrorCode(TransportError),
    /// The call failed without an engine response.
    #[error("failed to create new block via forkchoice: {0}")]
    Transport(TransportError),
    /// The call did not complete in time.
    #[error("forkchoice update to start a block build timed out after {0:?}")]
    Timeout(Duration),
    /// The engine reports the forkchoice state or the attributes as invalid.
    #[error("forkchoice update reported an invalid payload: {0}")]
    InvalidPayload(PayloadStatusEnum),
    /// The engine accepted the request but returned no build job id.
    #[error("nil id in forkchoice result when expecting a valid ID")]
    MissingPayloadId,
    /// The engine is syncing and cannot build.
    #[error("engine is syncing")]
    EngineSyncing,
    /// The engine responded with an unexpected payload status.
    #[error("unexpected forkchoice-updated payload status: {0}")]
    UnexpectedStatus(PayloadStatusEnum),
}

impl StartPayloadError {
    /// Classifies a failed forkchoice update carrying payload attributes.
    pub fn classify(err: TransportError) -> Self {
        match error_code(&err) {
            Some(INVALID_FORKCHOICE_STATE) => Self::InconsistentForkchoiceState(err),
            Some(INVALID_PAYLOAD_ATTRIBUTES) => Self::InvalidPayloadAttributes(err),
            Some(code) if is_engine_error_code(code) => Self::EngineErrorCode(err),
            Some(_) => Self::GenericErrorCode(err),
            None => Self::Transport(err),
        }
    }

    /// Whether the same attributes may be retried, need a reset first, or must be dropped.
    pub const fn kind(&self) -> BlockInsertionErrorKind {
        match self {
            Self::InconsistentForkchoiceState(_) | Self::EngineErrorCode(_) => {
                BlockInsertionErrorKind::Prestate
            }
            Self::InvalidPayloadAttributes(_) | Self::InvalidPayload(_) => {
                BlockInsertionErrorKind::Payload
            }
            Self::GenericErrorCode(_)
            | Self::Transport(_)
            | Self::Timeout(_)
            | Self::MissingPayloadId
            | Self::EngineSyncing
            | Self::UnexpectedStatus(_) => BlockInsertionErrorKind::Temporary,
        }
    }
}

/// Starts building a block on top of `forkchoice.head_block_hash` with the given attributes.
pub async fn start_payload<C: EngineClient + ?Sized>(
    client: &C,
    forkchoice: ForkchoiceState,
    attributes: RollupPayloadAttributes,
    timeout: Duration,
) -> Result<PayloadId, StartPayloadError> {
    let response = tokio::time::timeout(
        timeout,
        record_call_time(
            Metrics::FORKCHOICE_UPDATE_METHOD,
            client.fork_choice_updated(forkchoice, Some(attributes)),
        ),
    )
    .await
    .map_err(|_| StartPayloadError::Timeout(timeout))?
    .map_err(StartPayloadError::classify)?;

    match response.payload_status.status {
        PayloadStatusEnum::Valid => response.payload_id.ok_or(StartPayloadError::MissingPayloadId),
        status @ PayloadStatusEnum::Invalid { .. } => Err(StartPayloadError::InvalidPayload(status)),
        PayloadStatusEnum::Syncing => Err(StartPayloadError::EngineSyncing),
        status => Err(StartPayloadError::UnexpectedStatus(status)),
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use alloy_rpc_types_engine::{ForkchoiceUpdated, PayloadStatus};
    use alloy_transport::TransportErrorKind;
    use rstest::rstest;

    use super::*;
    use crate::test_utils::{MockEngineClientBuilder, rpc_error};

    fn invalid() -> PayloadStatusEnum {
        PayloadStatusEnum::Invalid { validation_error: "bad block".to_string() }
    }

    #[rstest]
    #[case::cl_valid(SyncMode::ConsensusLayer, SyncStatus::Cl, PayloadStatusEnum::Valid, true, SyncStatus::Cl)]
    #[case::cl_syncing(SyncMode::ConsensusLayer, SyncStatus::Cl, PayloadStatusEnum::Syncing, false, SyncStatus::Cl)]
    #[case::cl_accepted(SyncMode::ConsensusLayer, SyncStatus::Cl, PayloadStatusEnum::Accepted, false, SyncStatus::Cl)]
    #[case::el_accepted(
        SyncMode::ExecutionLayer,
        SyncStatus::StartedEl,
        PayloadStatusEnum::Accepted,
        true,
        SyncStatus::StartedEl
    )]
    #[case::el_syncing(
        SyncMode::ExecutionLayer,
        SyncStatus::StartedEl,
        PayloadStatusEnum::Syncing,
        true,
        SyncStatus::StartedEl
    )]
    #[case::el_valid_finishes(
        SyncMode::ExecutionLayer,
        SyncStatus::StartedEl,
        PayloadStatusEnum::Valid,
        true,
        SyncStatus::FinishedElNotFinalized
    )]
    #[case::el_valid_after_sync(
        SyncMode::ExecutionLayer,
        SyncStatus::FinishedEl,
        PayloadStatusEnum::Valid,
        true,
        SyncStatus::FinishedEl
    )]
    fn test_check_new_payload_status(
        #[case] mode: SyncMode,
        #[case] before: SyncStatus,
        #[case] status: PayloadStatusEnum,
        #[case] acceptable: bool,
        #[case] after: SyncStatus,
    ) {
        let mut sync_status = before;
        assert_eq!(check_new_payload_status(mode, &mut sync_status, &status), acceptable);
        assert_eq!(sync_status, after);
    }

    #[test]
    fn test_check_forkchoice_updated_status_rejects_accepted() {
        let mut sync_status = SyncStatus::StartedEl;
        assert!(!check_forkchoice_updated_status(
            SyncMode::ExecutionLayer,
            &mut sync_status,
            &PayloadStatusEnum::Accepted
        ));
        assert!(check_forkchoice_updated_status(
            SyncMode::ExecutionLayer,
            &mut sync_status,
            &PayloadStatusEnum::Syncing
        ));
        assert_eq!(sync_status, SyncStatus::StartedEl);
        assert!(!check_forkchoice_updated_status(
            SyncMode::ExecutionLayer,
            &mut sync_status,
            &invalid()
        ));
    }

    #[rstest]
    #[case::invalid_forkchoice(INVALID_FORKCHOICE_STATE, BlockInsertionErrorKind::Prestate)]
    #[case::invalid_attributes(INVALID_PAYLOAD_ATTRIBUTES, BlockInsertionErrorKind::Payload)]
    #[case::unknown_payload(UNKNOWN_PAYLOAD, BlockInsertionErrorKind::Prestate)]
    #[case::other_engine_code(-38099, BlockInsertionErrorKind::Prestate)]
    #[case::generic_code(-32603, BlockInsertionErrorKind::Temporary)]
    fn test_start_payload_error_kind(#[case] code: i64, #[case] kind: BlockInsertionErrorKind) {
        assert_eq!(StartPayloadError::classify(rpc_error(code)).kind(), kind);
    }

    #[test]
    fn test_forkchoice_update_error_severity() {
        let reset = ForkchoiceUpdateError::classify(rpc_error(INVALID_FORKCHOICE_STATE));
        assert_eq!(reset.severity(), EngineErrorSeverity::Reset);

        let temporary = ForkchoiceUpdateError::classify(rpc_error(-32000));
        assert!(matches!(temporary, ForkchoiceUpdateError::UnexpectedErrorCode(_)));
        assert_eq!(temporary.severity(), EngineErrorSeverity::Temporary);

        let transport =
            ForkchoiceUpdateError::classify(TransportErrorKind::custom_str("connection refused"));
        assert!(matches!(transport, ForkchoiceUpdateError::Transport(_)));
        assert_eq!(transport.severity(), EngineErrorSeverity::Temporary);
    }

    #[rstest]
    #[case::valid_with_id(PayloadStatusEnum::Valid, Some(PayloadId::new([1; 8])), None)]
    #[case::valid_without_id(
        PayloadStatusEnum::Valid,
        None,
        Some(BlockInsertionErrorKind::Temporary)
    )]
    #[case::invalid(invalid(), None, Some(BlockInsertionErrorKind::Payload))]
    #[case::syncing(PayloadStatusEnum::Syncing, None, Some(BlockInsertionErrorKind::Temporary))]
    #[case::accepted(PayloadStatusEnum::Accepted, None, Some(BlockInsertionErrorKind::Temporary))]
    #[tokio::test]
    async fn test_start_payload_status(
        #[case] status: PayloadStatusEnum,
        #[case] payload_id: Option<PayloadId>,
        #[case] expected_err: Option<BlockInsertionErrorKind>,
    ) {
        let client = MockEngineClientBuilder::new()
            .with_fork_choice_updated_response(ForkchoiceUpdated {
                payload_status: PayloadStatus { status, latest_valid_hash: Some(B256::ZERO) },
                payload_id,
            })
            .build();

        let result = start_payload(
            &client,
            ForkchoiceState::default(),
            RollupPayloadAttributes::default(),
            Duration::from_secs(1),
        )
        .await;

        match expected_err {
            None => assert_eq!(result.unwrap(), PayloadId::new([1; 8])),
            Some(kind) => assert_eq!(result.unwrap_err().kind(), kind),
        }
    }

    #[tokio::test]
    async fn test_start_payload_rpc_error() {
        let client = MockEngineClientBuilder::new()
            .with_fork_choice_updated_error(INVALID_PAYLOAD_ATTRIBUTES)
            .build();

        let err = start_payload(
            &client,
            ForkchoiceState::default(),
            RollupPayloadAttributes::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StartPayloadError::InvalidPayloadAttributes(_)));
        assert_eq!(err.kind(), BlockInsertionErrorKind::Payload);
    }
}
