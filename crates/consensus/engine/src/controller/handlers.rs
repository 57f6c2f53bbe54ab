//! Event dispatch of the engine controller.

use std::sync::Arc;

use rollup_protocol::{ExecutionPayloadEnvelope, L2BlockInfo};

use crate::{
    EngineClient, EngineController, EngineErrorSeverity, EngineEvent, EngineState, Event,
    EventError, InteropEvent, L2ForkchoiceState,
};

impl<C: EngineClient> EngineController<C> {
    /// Handles an event, holding the state lock for the whole handler.
    ///
    /// Returns false if the event is not meant for the controller.
    pub async fn on_event(&self, event: &Event) -> bool {
        let mut state = self.state.lock().await;
        match event {
            Event::Engine(event) => self.on_engine_event(&mut state, event).await,
            Event::Interop(InteropEvent::InvalidateBlock { invalidated, attributes }) => {
                info!(
                    target: "engine",
                    ?invalidated,
                    parent = ?attributes.parent.id(),
                    "Building replacement for invalidated block"
                );
                self.emitter.emit(EngineEvent::BuildStart { attributes: Arc::clone(attributes) });
                true
            }
            Event::Interop(InteropEvent::ReplacedBlock { .. })
            | Event::Derivation(_)
            | Event::Error(_) => false,
        }
    }

    async fn on_engine_event(&self, state: &mut EngineState, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::UnsafeUpdate { block } => {
                // Pre-interop, every local-unsafe block is immediately cross-unsafe.
                if !self.config.rollup.is_interop_active(block.block_info.timestamp) {
                    self.emitter.emit(EngineEvent::PromoteCrossUnsafe { block: *block });
                }
                self.try_update_engine_and_report(state).await;
            }
            EngineEvent::PromoteCrossUnsafe { block } => {
                state.set_cross_unsafe_head(*block);
                if let Some(handler) = &self.cross_update_handler {
                    handler.on_cross_unsafe_update(*block, state.heads.unsafe_head());
                }
            }
            EngineEvent::LocalSafeUpdate { block, source } => {
                // Pre-interop, every local-safe block is immediately cross-safe.
                if !self.config.rollup.is_interop_active(block.block_info.timestamp) {
                    self.promote_safe_inner(state, *block, *source).await;
                }
            }
            EngineEvent::ForkchoiceUpdate { unsafe_head, safe, .. } => {
                self.on_forkchoice_update(state, unsafe_head, safe).await;
            }
            EngineEvent::PayloadInvalid { envelope, err } => {
                self.on_invalid_payload(state, envelope, err);
            }
            EngineEvent::ResetEngineRequest => self.on_reset_engine_request(state).await,
            EngineEvent::BuildStart { attributes } => {
                self.on_build_start(state, Arc::clone(attributes)).await;
            }
            EngineEvent::BuildStarted { info, build_started, concluding, derived_from, .. } => {
                self.on_build_started(*info, *build_started, *concluding, *derived_from);
            }
            EngineEvent::BuildSeal { info, build_started, concluding, derived_from } => {
                self.on_build_seal(*info, *build_started, *concluding, *derived_from).await;
            }
            EngineEvent::BuildSealed { envelope, block, build_started, concluding, derived_from, .. } => {
                self.on_build_sealed(envelope, *block, *build_started, *concluding, *derived_from);
            }
            EngineEvent::PayloadProcess { envelope, block, build_started, concluding, derived_from } => {
                self.on_payload_process(envelope, *block, *build_started, *concluding, *derived_from)
                    .await;
            }
            EngineEvent::PayloadSuccess { envelope, block, concluding, derived_from } => {
                self.on_payload_success(state, envelope, *block, *concluding, *derived_from).await;
            }
            EngineEvent::BuildInvalid { attributes, err } => {
                self.on_build_invalid(state, attributes, err);
            }
            EngineEvent::BuildCancel { info, force } => self.on_build_cancel(*info, *force).await,
            EngineEvent::PendingSafeUpdate { .. }
            | EngineEvent::SafeDerived { .. }
            | EngineEvent::FinalizedUpdate { .. }
            | EngineEvent::EngineResetConfirmed { .. }
            | EngineEvent::PayloadSealInvalid { .. }
            | EngineEvent::PayloadSealExpiredError { .. } => return false,
        }
        true
    }

    /// Applies the next buffered unsafe payload if it extends the unsafe head.
    async fn on_forkchoice_update(
        &self,
        state: &mut EngineState,
        unsafe_head: &L2BlockInfo,
        safe: &L2BlockInfo,
    ) {
        debug!(
            target: "engine_queue",
            unsafe_head = ?unsafe_head.id(),
            safe = ?safe.id(),
            "Received forkchoice update"
        );
        state.unsafe_payloads.drop_inapplicable(unsafe_head, safe);

        let Some(next) = state.unsafe_payloads.peek().map(Arc::clone) else {
            debug!(target: "engine_queue", "No unsafe payload to process");
            return;
        };
        // Non-adjacent payloads wait until the gap is filled.
        if !unsafe_head.block_info.is_parent_of(&next.block_info()) {
            return;
        }
        self.process_unsafe_payload(state, &next).await;
    }

    async fn process_unsafe_payload(&self, state: &mut EngineState, envelope: &ExecutionPayloadEnvelope) {
        let block = match L2BlockInfo::from_payload_and_genesis(
            &envelope.execution_payload,
            &self.config.rollup.genesis,
        ) {
            Ok(block) => block,
            Err(err) => {
                error!(target: "engine_queue", ?err, "Failed to decode L2 block ref from payload");
                return;
            }
        };
        if block.id() == state.heads.unsafe_head().id() {
            return;
        }

        let txs = envelope.transactions().len();
        match self.insert_unsafe_payload_inner(state, envelope, block).await {
            Ok(()) => info!(target: "engine_queue", block = %block, txs, "Successfully processed payload"),
            Err(err) => {
                info!(target: "engine_queue", block = %block, txs, %err, "Failed to insert payload");
                self.report(err);
            }
        }
    }

    /// Drops the front of the payload queue if it is the payload the engine rejected.
    fn on_invalid_payload(
        &self,
        state: &mut EngineState,
        envelope: &ExecutionPayloadEnvelope,
        err: &EventError,
    ) {
        debug!(
            target: "engine_queue",
            block = ?envelope.id(),
            timestamp = envelope.timestamp(),
            %err,
            "Received invalid payload report"
        );
        let is_front = state
            .unsafe_payloads
            .peek()
            .is_some_and(|front| front.block_hash() == envelope.block_hash());
        if is_front {
            warn!(target: "engine_queue", block = ?envelope.id(), %err, "Dropping invalid unsafe payload");
            state.unsafe_payloads.pop();
        }
    }

    /// Force-resets onto the forkchoice state the engine currently holds.
    async fn on_reset_engine_request(&self, state: &mut EngineState) {
        match L2ForkchoiceState::current(&self.config.rollup, &*self.client).await {
            Ok(fc) => {
                info!(target: "engine", %fc, "Resetting onto engine forkchoice state");
                self.force_reset_inner(state, fc.un_safe, fc.un_safe, fc.safe, fc.safe, fc.finalized)
                    .await;
            }
            Err(err) => {
                warn!(target: "engine", %err, "Failed to load engine forkchoice state for reset");
                self.emitter.emit_error(EngineErrorSeverity::Reset, err);
            }
        }
    }
}
