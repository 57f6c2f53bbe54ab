//! Test utilities for the engine controller and the build pipeline.

mod engine_client;
pub use engine_client::{
    MockEngineClient, MockEngineClientBuilder, MockEngineStorage, MockError,
    RecordedForkchoiceUpdate, rpc_error,
};

mod fixtures;
pub use fixtures::{
    EventCollector, FIXTURE_L1_ORIGIN, RecordingCollaborator, TestError, block_ref, fcu_response,
    fork_ref, hash_of, invalid_status, payload_for, status, test_config, test_rollup_config,
};
