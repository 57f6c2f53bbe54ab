//! Tests for the block-build pipeline handlers.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_primitives::B256;
use alloy_rpc_types_engine::{PayloadAttributes, PayloadId, PayloadStatusEnum};
use rollup_protocol::{
    AttributesWithParent, BlockInfo, L2BlockInfo, PayloadInfo, RollupPayloadAttributes,
    test_utils::{l1_info_deposit, payload_with, user_tx},
};

use crate::{
    DerivationEvent, EngineConfig, EngineController, EngineErrorSeverity, EngineEvent, Event,
    EventEmitter, InteropEvent,
    build::REPLACE_BLOCK_SOURCE,
    forkchoice::{INVALID_FORKCHOICE_STATE, INVALID_PAYLOAD_ATTRIBUTES, UNKNOWN_PAYLOAD},
    test_utils::{
        EventCollector, FIXTURE_L1_ORIGIN, MockEngineClient, MockError, TestError, block_ref,
        fcu_response, invalid_status, payload_for, status, test_config, test_rollup_config,
    },
};

fn payload_id() -> PayloadId {
    PayloadId::new([7; 8])
}

fn l1_source() -> BlockInfo {
    BlockInfo::new(B256::repeat_byte(0x22), 2, B256::repeat_byte(0x11), 100)
}

fn holocene_config() -> EngineConfig {
    let mut rollup = test_rollup_config();
    rollup.hardforks.holocene_time = Some(0);
    EngineConfig::new(Arc::new(rollup))
}

fn setup_with(
    client: MockEngineClient,
    config: EngineConfig,
) -> (EngineController<MockEngineClient>, EventCollector) {
    let (emitter, rx) = EventEmitter::channel();
    (EngineController::new(Arc::new(client), config, emitter), EventCollector::new(rx))
}

fn setup(client: MockEngineClient) -> (EngineController<MockEngineClient>, EventCollector) {
    setup_with(client, test_config())
}

/// Puts every head on `head`, except the finalized head.
async fn seed_heads(
    controller: &EngineController<MockEngineClient>,
    head: L2BlockInfo,
    finalized: L2BlockInfo,
) {
    let mut state = controller.state.lock().await;
    state.force_engine_reset(&controller.chain_spec, head, head, head, head, finalized);
    state.need_fcu_call = false;
}

fn attributes(parent: L2BlockInfo, derived_from: Option<BlockInfo>) -> Arc<AttributesWithParent> {
    let attributes = RollupPayloadAttributes {
        payload_attributes: PayloadAttributes {
            timestamp: parent.block_info.timestamp + 2,
            ..Default::default()
        },
        transactions: Some(vec![l1_info_deposit(1, FIXTURE_L1_ORIGIN.hash, parent.seq_num + 1)]),
        no_tx_pool: Some(false),
        gas_limit: Some(30_000_000),
    };
    Arc::new(AttributesWithParent::new(attributes, parent, derived_from, true))
}

fn deposits_only(parent: L2BlockInfo, derived_from: Option<BlockInfo>) -> Arc<AttributesWithParent> {
    Arc::new(attributes(parent, derived_from).as_deposits_only())
}

fn error_severities(events: &[Event]) -> Vec<EngineErrorSeverity> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Error(err) => Some(err.severity()),
            _ => None,
        })
        .collect()
}

async fn dispatch(controller: &EngineController<MockEngineClient>, event: impl Into<Event>) {
    assert!(controller.on_event(&event.into()).await);
}

#[tokio::test]
async fn test_build_start_emits_forkchoice_update_and_started() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, Some(payload_id())))
        .build();
    let (controller, mut events) = setup(client.clone());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;

    dispatch(&controller, EngineEvent::BuildStart { attributes: attributes(block_ref(2), None) })
        .await;

    let events = events.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::ForkchoiceUpdate { unsafe_head, safe, finalized })
            if *unsafe_head == block_ref(2) && *safe == block_ref(2) && *finalized == block_ref(1)
    ));
    assert!(matches!(
        &events[1],
        Event::Engine(EngineEvent::BuildStarted { info, parent, concluding: true, derived_from: None, .. })
            if *info == PayloadInfo::new(payload_id(), 6) && *parent == block_ref(2)
    ));

    let calls = client.fork_choice_updated_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].state.head_block_hash, block_ref(2).hash());
    assert_eq!(calls[0].state.finalized_block_hash, block_ref(1).hash());
    assert!(calls[0].attributes.is_some());
}

#[tokio::test]
async fn test_build_start_rejected_attributes_emit_build_invalid() {
    let client =
        MockEngineClient::builder().with_fork_choice_updated_error(INVALID_PAYLOAD_ATTRIBUTES).build();
    let (controller, mut events) = setup(client);
    seed_heads(&controller, block_ref(2), block_ref(1)).await;

    let attrs = attributes(block_ref(2), Some(l1_source()));
    dispatch(&controller, EngineEvent::BuildStart { attributes: Arc::clone(&attrs) }).await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::BuildInvalid { attributes, .. }) if Arc::ptr_eq(attributes, &attrs)
    ));
}

#[tokio::test]
async fn test_build_start_failure_severities() {
    // An inconsistent forkchoice state needs a reset.
    let client =
        MockEngineClient::builder().with_fork_choice_updated_error(INVALID_FORKCHOICE_STATE).build();
    let (controller, mut events) = setup(client);
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    dispatch(&controller, EngineEvent::BuildStart { attributes: attributes(block_ref(2), None) })
        .await;
    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Reset]);

    // A failed transport is retried.
    let (controller, mut events) = setup(MockEngineClient::builder().build());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    dispatch(&controller, EngineEvent::BuildStart { attributes: attributes(block_ref(2), None) })
        .await;
    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Temporary]);

    // A syncing engine cannot build.
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Syncing, None))
        .build();
    let (controller, mut events) = setup(client);
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    dispatch(&controller, EngineEvent::BuildStart { attributes: attributes(block_ref(2), None) })
        .await;
    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Temporary]);
}

#[tokio::test]
async fn test_build_start_behind_finalized_is_critical() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, Some(payload_id())))
        .build();
    let (controller, mut events) = setup(client.clone());
    seed_heads(&controller, block_ref(5), block_ref(4)).await;

    dispatch(&controller, EngineEvent::BuildStart { attributes: attributes(block_ref(3), None) })
        .await;

    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Critical]);
    assert!(client.fork_choice_updated_calls().await.is_empty());
}

#[tokio::test]
async fn test_build_started_seals_derived_blocks_only() {
    let (controller, mut events) = setup(MockEngineClient::builder().build());
    let info = PayloadInfo::new(payload_id(), 6);
    let parent = block_ref(2);

    dispatch(
        &controller,
        EngineEvent::BuildStarted {
            info,
            build_started: Instant::now(),
            parent,
            concluding: false,
            derived_from: None,
        },
    )
    .await;
    assert!(events.drain().is_empty());

    dispatch(
        &controller,
        EngineEvent::BuildStarted {
            info,
            build_started: Instant::now(),
            parent,
            concluding: true,
            derived_from: Some(l1_source()),
        },
    )
    .await;
    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::BuildSeal { info: sealed, concluding: true, derived_from: Some(_), .. })
            if *sealed == info
    ));
}

#[tokio::test]
async fn test_build_seal_success() {
    let block = block_ref(3);
    let client = MockEngineClient::builder()
        .with_get_payload_response(Arc::unwrap_or_clone(payload_for(&block, vec![user_tx()])))
        .build();
    let (controller, mut events) = setup(client.clone());
    let info = PayloadInfo::new(payload_id(), 6);

    dispatch(
        &controller,
        EngineEvent::BuildSeal {
            info,
            build_started: Instant::now(),
            concluding: true,
            derived_from: None,
        },
    )
    .await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::BuildSealed { block: sealed, envelope, derived_from: None, .. })
            if *sealed == block && envelope.transactions().len() == 2
    ));
    assert_eq!(client.get_payload_calls().await, vec![info]);
}

#[tokio::test]
async fn test_build_seal_malformed_payload_is_invalid() {
    let block = block_ref(3);
    let payload = payload_with(
        block.number(),
        block.hash(),
        block.block_info.parent_hash,
        block.block_info.timestamp,
        vec![user_tx()],
    );
    let client = MockEngineClient::builder()
        .with_get_payload_response(rollup_protocol::ExecutionPayloadEnvelope::new(payload, None))
        .build();
    let (controller, mut events) = setup(client);

    dispatch(
        &controller,
        EngineEvent::BuildSeal {
            info: PayloadInfo::new(payload_id(), 6),
            build_started: Instant::now(),
            concluding: false,
            derived_from: Some(l1_source()),
        },
    )
    .await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::PayloadSealInvalid { derived_from: Some(_), .. })
    ));
}

#[tokio::test]
async fn test_build_seal_unknown_payload_expires() {
    let client =
        MockEngineClient::builder().with_get_payload_error(MockError::Code(UNKNOWN_PAYLOAD)).build();
    let (controller, mut events) = setup(client);

    dispatch(
        &controller,
        EngineEvent::BuildSeal {
            info: PayloadInfo::new(payload_id(), 6),
            build_started: Instant::now(),
            concluding: false,
            derived_from: None,
        },
    )
    .await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Engine(EngineEvent::PayloadSealExpiredError { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_build_seal_timeout_expires() {
    let client = MockEngineClient::builder()
        .with_get_payload_response(Arc::unwrap_or_clone(payload_for(&block_ref(3), vec![])))
        .with_delay(Duration::from_secs(30))
        .build();
    let mut config = test_config();
    config.timeouts.build_seal = Duration::from_secs(1);
    let (controller, mut events) = setup_with(client, config);

    dispatch(
        &controller,
        EngineEvent::BuildSeal {
            info: PayloadInfo::new(payload_id(), 6),
            build_started: Instant::now(),
            concluding: false,
            derived_from: None,
        },
    )
    .await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::PayloadSealExpiredError { err, .. })
            if err.to_string().contains("timed out")
    ));
}

#[tokio::test]
async fn test_build_sealed_processes_derived_blocks_only() {
    let (controller, mut events) = setup(MockEngineClient::builder().build());
    let block = block_ref(3);
    let envelope = payload_for(&block, vec![]);

    dispatch(
        &controller,
        EngineEvent::BuildSealed {
            info: PayloadInfo::new(payload_id(), 6),
            envelope: Arc::clone(&envelope),
            block,
            build_started: Instant::now(),
            concluding: false,
            derived_from: None,
        },
    )
    .await;
    assert!(events.drain().is_empty());

    dispatch(
        &controller,
        EngineEvent::BuildSealed {
            info: PayloadInfo::new(payload_id(), 6),
            envelope,
            block,
            build_started: Instant::now(),
            concluding: true,
            derived_from: Some(l1_source()),
        },
    )
    .await;
    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::PayloadProcess { block: processed, concluding: true, .. })
            if *processed == block
    ));
}

fn process_event(block: L2BlockInfo, derived_from: Option<BlockInfo>) -> EngineEvent {
    EngineEvent::PayloadProcess {
        envelope: payload_for(&block, vec![]),
        block,
        build_started: Instant::now(),
        concluding: true,
        derived_from,
    }
}

#[tokio::test]
async fn test_payload_process_valid_emits_success() {
    let client =
        MockEngineClient::builder().with_new_payload_response(status(PayloadStatusEnum::Valid)).build();
    let (controller, mut events) = setup(client.clone());
    let block = block_ref(3);

    dispatch(&controller, process_event(block, Some(l1_source()))).await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::PayloadSuccess { block: inserted, concluding: true, derived_from: Some(_), .. })
            if *inserted == block
    ));
    assert_eq!(client.new_payload_calls().await, vec![block.hash()]);
}

#[tokio::test]
async fn test_payload_process_invalid_before_holocene() {
    let client = MockEngineClient::builder().with_new_payload_response(status(invalid_status())).build();
    let (controller, mut events) = setup(client);
    let block = block_ref(3);

    dispatch(&controller, process_event(block, Some(l1_source()))).await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Engine(EngineEvent::PayloadInvalid { envelope, err })
            if envelope.block_hash() == block.hash() && err.to_string().contains("bad block")
    ));
}

#[tokio::test]
async fn test_payload_process_invalid_after_holocene_requests_deposits_only() {
    let client = MockEngineClient::builder().with_new_payload_response(status(invalid_status())).build();
    let (controller, mut events) = setup_with(client, holocene_config());
    let block = block_ref(3);

    dispatch(&controller, process_event(block, Some(l1_source()))).await;

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Derivation(DerivationEvent::DepositsOnlyPayloadAttributesRequest { parent, derived_from })
            if *parent == block.block_info.parent_id() && *derived_from == l1_source()
    ));
}

#[tokio::test]
async fn test_payload_process_unexpected_status_is_temporary() {
    let client =
        MockEngineClient::builder().with_new_payload_response(status(PayloadStatusEnum::Syncing)).build();
    let (controller, mut events) = setup(client);

    dispatch(&controller, process_event(block_ref(3), None)).await;

    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Temporary]);
}

#[tokio::test]
async fn test_payload_success_advances_heads() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, None))
        .build();
    let (controller, mut events) = setup(client.clone());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    let block = block_ref(3);

    dispatch(
        &controller,
        EngineEvent::PayloadSuccess {
            envelope: payload_for(&block, vec![]),
            block,
            concluding: true,
            derived_from: Some(l1_source()),
        },
    )
    .await;

    let heads = controller.heads().await;
    assert_eq!(heads.unsafe_head(), block);
    assert_eq!(heads.pending_safe_head(), block);
    assert_eq!(heads.local_safe_head(), block);
    assert_eq!(heads.safe_head(), block_ref(2));

    let events = events.drain();
    assert!(matches!(&events[0], Event::Engine(EngineEvent::UnsafeUpdate { block: b }) if *b == block));
    assert!(matches!(
        &events[1],
        Event::Engine(EngineEvent::PendingSafeUpdate { pending_safe, .. }) if *pending_safe == block
    ));
    assert!(matches!(
        &events[2],
        Event::Engine(EngineEvent::LocalSafeUpdate { block: b, source }) if *b == block && *source == l1_source()
    ));
    assert!(matches!(
        &events[3],
        Event::Engine(EngineEvent::ForkchoiceUpdate { unsafe_head, .. }) if *unsafe_head == block
    ));
    assert_eq!(events.len(), 4);
    assert_eq!(client.fork_choice_updated_calls().await.len(), 1);
}

#[tokio::test]
async fn test_payload_success_mid_span_keeps_local_safe() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, None))
        .build();
    let (controller, mut events) = setup(client);
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    let block = block_ref(3);

    dispatch(
        &controller,
        EngineEvent::PayloadSuccess {
            envelope: payload_for(&block, vec![]),
            block,
            concluding: false,
            derived_from: Some(l1_source()),
        },
    )
    .await;

    let heads = controller.heads().await;
    assert_eq!(heads.pending_safe_head(), block);
    assert_eq!(heads.local_safe_head(), block_ref(2));
    assert!(
        !events
            .drain()
            .iter()
            .any(|event| matches!(event, Event::Engine(EngineEvent::LocalSafeUpdate { .. })))
    );
}

#[tokio::test]
async fn test_payload_success_sequenced_block_backs_up_reorged_head() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, None))
        .build();
    let (controller, _events) = setup(client);
    seed_heads(&controller, block_ref(1), block_ref(0)).await;
    controller.set_unsafe_head(block_ref(4)).await;
    let block = block_ref(3);

    dispatch(
        &controller,
        EngineEvent::PayloadSuccess {
            envelope: payload_for(&block, vec![]),
            block,
            concluding: false,
            derived_from: None,
        },
    )
    .await;

    let heads = controller.heads().await;
    assert_eq!(heads.unsafe_head(), block);
    assert_eq!(heads.backup_unsafe_head(), block_ref(4));
    assert_eq!(heads.pending_safe_head(), block_ref(1));
}

#[tokio::test]
async fn test_payload_success_replacement_block_resets_chain() {
    let client = MockEngineClient::builder()
        .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, None))
        .build();
    let (controller, mut events) = setup(client);
    seed_heads(&controller, block_ref(5), block_ref(2)).await;
    let block = block_ref(3);

    dispatch(
        &controller,
        EngineEvent::PayloadSuccess {
            envelope: payload_for(&block, vec![]),
            block,
            concluding: false,
            derived_from: Some(REPLACE_BLOCK_SOURCE),
        },
    )
    .await;

    let heads = controller.heads().await;
    assert_eq!(heads.unsafe_head(), block);
    assert_eq!(heads.cross_unsafe_head(), block);
    assert_eq!(heads.local_safe_head(), block);
    assert_eq!(heads.safe_head(), block);
    assert_eq!(heads.finalized_head(), block_ref(2));

    let events = events.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::Engine(EngineEvent::EngineResetConfirmed { cross_safe, .. }) if *cross_safe == block
    )));
    assert!(matches!(
        events.last(),
        Some(Event::Interop(InteropEvent::ReplacedBlock { block: replaced, .. })) if *replaced == block
    ));
}

#[tokio::test]
async fn test_build_invalid_deposits_only_is_critical() {
    let (controller, mut events) = setup(MockEngineClient::builder().build());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;

    dispatch(
        &controller,
        EngineEvent::BuildInvalid {
            attributes: deposits_only(block_ref(2), Some(l1_source())),
            err: Arc::new(TestError("rejected")),
        },
    )
    .await;

    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Critical]);
}

#[tokio::test]
async fn test_build_invalid_rolls_back_pending_safe() {
    let (controller, mut events) = setup(MockEngineClient::builder().build());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    controller.set_pending_safe_head(block_ref(3)).await;
    controller.set_backup_unsafe_head(block_ref(4), false).await;

    let attrs = attributes(block_ref(3), Some(l1_source()));
    dispatch(
        &controller,
        EngineEvent::BuildInvalid { attributes: Arc::clone(&attrs), err: Arc::new(TestError("rejected")) },
    )
    .await;

    let heads = controller.heads().await;
    assert_eq!(heads.pending_safe_head(), block_ref(2));
    assert_eq!(heads.backup_unsafe_head(), block_ref(4));
    assert!(controller.state.lock().await.need_fcu_call_backup_unsafe_reorg);

    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Derivation(DerivationEvent::InvalidPayloadAttributes { attributes, err })
            if Arc::ptr_eq(attributes, &attrs) && err.to_string() == "rejected"
    ));
}

#[tokio::test]
async fn test_build_invalid_after_holocene_requests_deposits_only() {
    let (controller, mut events) = setup_with(MockEngineClient::builder().build(), holocene_config());
    seed_heads(&controller, block_ref(2), block_ref(1)).await;
    controller.set_pending_safe_head(block_ref(3)).await;

    dispatch(
        &controller,
        EngineEvent::BuildInvalid {
            attributes: attributes(block_ref(3), Some(l1_source())),
            err: Arc::new(TestError("rejected")),
        },
    )
    .await;

    assert_eq!(controller.pending_safe_head().await, block_ref(3));
    let events = events.drain();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Derivation(DerivationEvent::DepositsOnlyPayloadAttributesRequest { parent, .. })
            if *parent == block_ref(3).id()
    ));
}

#[tokio::test]
async fn test_build_cancel() {
    let info = PayloadInfo::new(payload_id(), 6);

    // Jobs the engine does not know need no cancelling.
    let client =
        MockEngineClient::builder().with_get_payload_error(MockError::Code(UNKNOWN_PAYLOAD)).build();
    let (controller, mut events) = setup(client.clone());
    dispatch(&controller, EngineEvent::BuildCancel { info, force: false }).await;
    assert!(events.drain().is_empty());
    assert_eq!(client.get_payload_calls().await, vec![info]);

    // Other failures are reported unless forced.
    let client = MockEngineClient::builder().with_get_payload_error(MockError::Transport).build();
    let (controller, mut events) = setup(client);
    dispatch(&controller, EngineEvent::BuildCancel { info, force: false }).await;
    assert_eq!(error_severities(&events.drain()), vec![EngineErrorSeverity::Temporary]);
    dispatch(&controller, EngineEvent::BuildCancel { info, force: true }).await;
    assert!(events.drain().is_empty());
}
