//! Mock implementation of the [`EngineClient`] for testing the engine controller.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy_eips::BlockNumberOrTag;
use alloy_json_rpc::{ErrorPayload, RpcError};
use alloy_primitives::B256;
use alloy_rpc_types_engine::{
    ExecutionPayloadV3, ForkchoiceState, ForkchoiceUpdated, PayloadStatus,
};
use alloy_transport::{TransportError, TransportErrorKind, TransportResult};
use async_trait::async_trait;
use rollup_protocol::{
    ExecutionPayloadEnvelope, L2BlockInfo, PayloadInfo, RollupPayloadAttributes,
};
use tokio::sync::RwLock;

use crate::{EngineClient, EngineClientError};

/// Builds a JSON-RPC error response carrying the given code.
pub fn rpc_error(code: i64) -> TransportError {
    RpcError::ErrorResp(ErrorPayload { code, message: "mock engine error".into(), data: None })
}

/// A canned failure of a mocked engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// The engine responds with a JSON-RPC error code.
    Code(i64),
    /// The call fails without a response.
    Transport,
    /// The engine reports the block as unknown with a non-standard error message.
    NotFound,
}

impl MockError {
    fn into_transport(self) -> TransportError {
        match self {
            Self::Code(code) => rpc_error(code),
            Self::Transport => TransportErrorKind::custom_str("mock transport failure"),
            Self::NotFound => TransportErrorKind::custom_str("block not found"),
        }
    }
}

/// A forkchoice update received by the [`MockEngineClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedForkchoiceUpdate {
    /// The forkchoice state.
    pub state: ForkchoiceState,
    /// The payload attributes, if a build was requested.
    pub attributes: Option<RollupPayloadAttributes>,
}

/// Mock storage for engine client responses and received calls.
#[derive(Debug, Clone, Default)]
pub struct MockEngineStorage {
    /// Response of `engine_forkchoiceUpdated`.
    pub fork_choice_updated_response: Option<Result<ForkchoiceUpdated, MockError>>,
    /// Response of `engine_newPayload`.
    pub new_payload_response: Option<Result<PayloadStatus, MockError>>,
    /// Response of `engine_getPayload`.
    pub get_payload_response: Option<Result<ExecutionPayloadEnvelope, MockError>>,
    /// Block refs by label.
    pub block_info_by_label: HashMap<BlockNumberOrTag, L2BlockInfo>,
    /// Failing block-ref lookups by label.
    pub block_info_by_label_errors: HashMap<BlockNumberOrTag, MockError>,
    /// Block refs by hash.
    pub block_info_by_hash: HashMap<B256, L2BlockInfo>,
    /// Delay applied to every engine API call.
    pub delay: Option<Duration>,

    /// Forkchoice updates received, in order.
    pub fork_choice_updated_calls: Vec<RecordedForkchoiceUpdate>,
    /// Block hashes of the payloads received by `engine_newPayload`, in order.
    pub new_payload_calls: Vec<B256>,
    /// Build jobs requested by `engine_getPayload`, in order.
    pub get_payload_calls: Vec<PayloadInfo>,
}

/// Builder for constructing a [`MockEngineClient`] with pre-configured responses.
///
/// # Example
///
/// ```rust,ignore
/// use rollup_engine::test_utils::MockEngineClient;
/// use alloy_rpc_types_engine::{PayloadStatus, PayloadStatusEnum};
///
/// let mock = MockEngineClient::builder()
///     .with_new_payload_response(PayloadStatus {
///         status: PayloadStatusEnum::Valid,
///         latest_valid_hash: Some(B256::ZERO),
///     })
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct MockEngineClientBuilder {
    storage: MockEngineStorage,
}

impl MockEngineClientBuilder {
    /// Creates a new builder without any responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `engine_forkchoiceUpdated` response.
    pub fn with_fork_choice_updated_response(mut self, response: ForkchoiceUpdated) -> Self {
        self.storage.fork_choice_updated_response = Some(Ok(response));
        self
    }

    /// Makes `engine_forkchoiceUpdated` fail with the given JSON-RPC error code.
    pub fn with_fork_choice_updated_error(mut self, code: i64) -> Self {
        self.storage.fork_choice_updated_response = Some(Err(MockError::Code(code)));
        self
    }

    /// Sets the `engine_newPayload` response.
    pub fn with_new_payload_response(mut self, status: PayloadStatus) -> Self {
        self.storage.new_payload_response = Some(Ok(status));
        self
    }

    /// Makes `engine_newPayload` fail.
    pub fn with_new_payload_error(mut self, err: MockError) -> Self {
        self.storage.new_payload_response = Some(Err(err));
        self
    }

    /// Sets the `engine_getPayload` response.
    pub fn with_get_payload_response(mut self, envelope: ExecutionPayloadEnvelope) -> Self {
        self.storage.get_payload_response = Some(Ok(envelope));
        self
    }

    /// Makes `engine_getPayload` fail.
    pub fn with_get_payload_error(mut self, err: MockError) -> Self {
        self.storage.get_payload_response = Some(Err(err));
        self
    }

    /// Sets a block ref response for a specific label.
    pub fn with_block_info_by_label(mut self, label: BlockNumberOrTag, info: L2BlockInfo) -> Self {
        self.storage.block_info_by_label.insert(label, info);
        self
    }

    /// Makes the lookup of a specific label fail.
    pub fn with_block_info_by_label_error(mut self, label: BlockNumberOrTag, err: MockError) -> Self {
        self.storage.block_info_by_label_errors.insert(label, err);
        self
    }

    /// Sets a block ref response for a specific hash.
    pub fn with_block_info_by_hash(mut self, info: L2BlockInfo) -> Self {
        self.storage.block_info_by_hash.insert(info.hash(), info);
        self
    }

    /// Delays every engine API call.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.storage.delay = Some(delay);
        self
    }

    /// Builds the [`MockEngineClient`] with the configured values.
    pub fn build(self) -> MockEngineClient {
        MockEngineClient { storage: Arc::new(RwLock::new(self.storage)) }
    }
}

/// Mock implementation of the [`EngineClient`] trait for testing.
///
/// Responses are sticky: every call returns the configured response until it is
/// replaced through [`MockEngineClient::storage`]. Calls without a configured
/// response fail with a transport error.
#[derive(Debug, Clone)]
pub struct MockEngineClient {
    storage: Arc<RwLock<MockEngineStorage>>,
}

impl MockEngineClient {
    /// Creates a builder for constructing a mock engine client.
    pub fn builder() -> MockEngineClientBuilder {
        MockEngineClientBuilder::new()
    }

    /// Returns the shared mock storage.
    pub fn storage(&self) -> Arc<RwLock<MockEngineStorage>> {
        Arc::clone(&self.storage)
    }

    /// Returns the forkchoice updates received so far.
    pub async fn fork_choice_updated_calls(&self) -> Vec<RecordedForkchoiceUpdate> {
        self.storage.read().await.fork_choice_updated_calls.clone()
    }

    /// Returns the block hashes of the payloads received so far.
    pub async fn new_payload_calls(&self) -> Vec<B256> {
        self.storage.read().await.new_payload_calls.clone()
    }

    /// Returns the build jobs requested so far.
    pub async fn get_payload_calls(&self) -> Vec<PayloadInfo> {
        self.storage.read().await.get_payload_calls.clone()
    }

    /// Replaces the `engine_forkchoiceUpdated` response.
    pub async fn set_fork_choice_updated_response(
        &self,
        response: Result<ForkchoiceUpdated, MockError>,
    ) {
        self.storage.write().await.fork_choice_updated_response = Some(response);
    }

    /// Replaces the `engine_newPayload` response.
    pub async fn set_new_payload_response(&self, response: Result<PayloadStatus, MockError>) {
        self.storage.write().await.new_payload_response = Some(response);
    }

    /// Replaces the block ref response for a specific label.
    pub async fn set_block_info_by_label(&self, label: BlockNumberOrTag, info: L2BlockInfo) {
        self.storage.write().await.block_info_by_label.insert(label, info);
    }

    async fn maybe_delay(&self) {
        let delay = self.storage.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn missing(method: &str) -> TransportError {
    TransportErrorKind::custom_str(&format!("no mock response configured for {method}"))
}

#[async_trait]
impl EngineClient for MockEngineClient {
    async fn fork_choice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<RollupPayloadAttributes>,
    ) -> TransportResult<ForkchoiceUpdated> {
        self.maybe_delay().await;
        let mut storage = self.storage.write().await;
        storage.fork_choice_updated_calls.push(RecordedForkchoiceUpdate { state, attributes });
        match storage.fork_choice_updated_response.clone() {
            Some(Ok(response)) => Ok(response),
            Some(Err(err)) => Err(err.into_transport()),
            None => Err(missing("engine_forkchoiceUpdated")),
        }
    }

    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        _parent_beacon_block_root: Option<B256>,
    ) -> TransportResult<PayloadStatus> {
        self.maybe_delay().await;
        let mut storage = self.storage.write().await;
        storage.new_payload_calls.push(payload.payload_inner.payload_inner.block_hash);
        match storage.new_payload_response.clone() {
            Some(Ok(status)) => Ok(status),
            Some(Err(err)) => Err(err.into_transport()),
            None => Err(missing("engine_newPayload")),
        }
    }

    async fn get_payload(&self, info: PayloadInfo) -> TransportResult<ExecutionPayloadEnvelope> {
        self.maybe_delay().await;
        let mut storage = self.storage.write().await;
        storage.get_payload_calls.push(info);
        match storage.get_payload_response.clone() {
            Some(Ok(envelope)) => Ok(envelope),
            Some(Err(err)) => Err(err.into_transport()),
            None => Err(missing("engine_getPayload")),
        }
    }

    async fn l2_block_ref_by_label(
        &self,
        numtag: BlockNumberOrTag,
    ) -> Result<Option<L2BlockInfo>, EngineClientError> {
        let storage = self.storage.read().await;
        if let Some(err) = storage.block_info_by_label_errors.get(&numtag) {
            return Err(err.into_transport().into());
        }
        Ok(storage.block_info_by_label.get(&numtag).copied())
    }

    async fn l2_block_ref_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<L2BlockInfo>, EngineClientError> {
        Ok(self.storage.read().await.block_info_by_hash.get(&hash).copied())
    }
}
