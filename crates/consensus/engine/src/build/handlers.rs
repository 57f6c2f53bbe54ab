//! Handlers of the block-build pipeline.
//!
//! A build moves through `BuildStart -> BuildStarted -> BuildSeal -> BuildSealed ->
//! PayloadProcess -> PayloadSuccess | PayloadInvalid`. Blocks derived from L1 advance
//! through every stage on their own. Locally sequenced blocks stop after `BuildStarted`
//! and `BuildSealed` until the sequencer asks for the next stage.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_eips::BlockNumHash;
use alloy_rpc_types_engine::{ForkchoiceState, PayloadStatusEnum};
use rollup_protocol::{
    AttributesWithParent, BlockInfo, ExecutionPayloadEnvelope, L2BlockInfo, PayloadInfo,
};

use crate::{
    BlockInsertionErrorKind, BuildStartError, CancelPayloadError, DepositsOnlyBlockInvalid,
    DerivationEvent, EngineClient, EngineController, EngineError, EngineErrorSeverity,
    EngineEvent, EngineState, EventError, InteropEvent, InvalidNewPayload, Metrics,
    PayloadProcessError, SealPayloadError,
    build::{REPLACE_BLOCK_SOURCE, last_deposit, sanity_check_payload},
    client::record_call_time,
    forkchoice::{UNKNOWN_PAYLOAD, error_code, start_payload},
};

impl<C: EngineClient> EngineController<C> {
    pub(crate) async fn on_build_start(
        &self,
        state: &mut EngineState,
        attributes: Arc<AttributesWithParent>,
    ) {
        let parent = attributes.parent;
        let pending_safe = state.heads.pending_safe_head();
        if attributes.derived_from.is_some() && pending_safe.hash() != parent.hash() {
            warn!(
                target: "engine_builder",
                pending_safe = %pending_safe,
                attributes_parent = %parent,
                "Block attributes derived from L1 do not build on pending safe output, pending safe head is being reorged"
            );
        }

        let safe = state.heads.safe_head();
        let finalized = state.heads.finalized_head();
        if parent.number() < finalized.number() {
            self.report(BuildStartError::ParentBehindFinalized {
                parent: parent.number(),
                finalized: finalized.number(),
            });
            return;
        }

        let fc = ForkchoiceState {
            head_block_hash: parent.hash(),
            safe_block_hash: safe.hash(),
            finalized_block_hash: finalized.hash(),
        };
        let build_started = Instant::now();
        let id = match start_payload(
            &*self.client,
            fc,
            attributes.attributes.clone(),
            self.config.timeouts.build_start,
        )
        .await
        {
            Ok(id) => id,
            Err(err) if err.kind() == BlockInsertionErrorKind::Payload => {
                self.emitter.emit(EngineEvent::BuildInvalid { attributes, err: Arc::new(err) });
                return;
            }
            Err(err) => {
                warn!(target: "engine_builder", %err, parent = ?parent.id(), "Failed to start block build");
                self.report(BuildStartError::Start(err));
                return;
            }
        };

        self.emitter.emit(EngineEvent::ForkchoiceUpdate { unsafe_head: parent, safe, finalized });
        self.emitter.emit(EngineEvent::BuildStarted {
            info: PayloadInfo::new(id, attributes.attributes.payload_attributes.timestamp),
            build_started,
            parent,
            concluding: attributes.is_last_in_span,
            derived_from: attributes.derived_from,
        });
    }

    pub(crate) fn on_build_started(
        &self,
        info: PayloadInfo,
        build_started: Instant,
        concluding: bool,
        derived_from: Option<BlockInfo>,
    ) {
        // Derived blocks have no tx pool to wait on and are sealed right away.
        if derived_from.is_some() {
            self.emitter.emit(EngineEvent::BuildSeal { info, build_started, concluding, derived_from });
        }
    }

    pub(crate) async fn on_build_seal(
        &self,
        info: PayloadInfo,
        build_started: Instant,
        concluding: bool,
        derived_from: Option<BlockInfo>,
    ) {
        let sealing_started = Instant::now();
        let envelope = match self.seal_payload(info, build_started).await {
            Ok(envelope) => envelope,
            Err(err @ (SealPayloadError::GetPayload { .. } | SealPayloadError::Timeout { .. })) => {
                // The same attributes may be retried with a fresh build job.
                self.emitter.emit(EngineEvent::PayloadSealExpiredError {
                    info,
                    err: Arc::new(err),
                    concluding,
                    derived_from,
                });
                return;
            }
            Err(err) => {
                self.emitter.emit(EngineEvent::PayloadSealInvalid {
                    info,
                    err: Arc::new(err),
                    concluding,
                    derived_from,
                });
                return;
            }
        };
        let block = match L2BlockInfo::from_payload_and_genesis(
            &envelope.execution_payload,
            &self.config.rollup.genesis,
        ) {
            Ok(block) => block,
            Err(source) => {
                self.emitter.emit(EngineEvent::PayloadSealInvalid {
                    info,
                    err: Arc::new(SealPayloadError::BlockRef { id: info.id, source }),
                    concluding,
                    derived_from,
                });
                return;
            }
        };

        let seal_time = sealing_started.elapsed();
        let build_time = build_started.elapsed();
        let txs = envelope.transactions().len();
        // Sanity-checked payloads always lead with at least one deposit.
        let deposits = last_deposit(&envelope).map(|last| last + 1).unwrap_or_default();
        record_seal_metrics(seal_time, build_time, self.config.rollup.block_time, txs, deposits);
        debug!(
            target: "engine_builder",
            l2_unsafe = %block,
            l1_origin = ?block.l1_origin,
            txs,
            deposits,
            time = block.block_info.timestamp,
            ?seal_time,
            ?build_time,
            "Built new L2 block"
        );

        self.emitter.emit(EngineEvent::BuildSealed {
            info,
            envelope: Arc::new(envelope),
            block,
            build_started,
            concluding,
            derived_from,
        });
    }

    /// Retrieves and sanity-checks the payload of a build job.
    async fn seal_payload(
        &self,
        info: PayloadInfo,
        build_started: Instant,
    ) -> Result<ExecutionPayloadEnvelope, SealPayloadError> {
        let timeout = self.config.timeouts.build_seal;
        let envelope = tokio::time::timeout(
            timeout,
            record_call_time(Metrics::GET_PAYLOAD_METHOD, self.client.get_payload(info)),
        )
        .await
        .map_err(|_| SealPayloadError::Timeout { id: info.id, timeout })?
        .map_err(|source| {
            if error_code(&source) == Some(UNKNOWN_PAYLOAD) {
                warn!(
                    target: "engine_builder",
                    payload_id = %info.id,
                    payload_time = info.timestamp,
                    started = ?build_started.elapsed(),
                    "Cannot seal block, payload ID is unknown"
                );
            }
            SealPayloadError::GetPayload { id: info.id, source }
        })?;

        sanity_check_payload(&envelope).map_err(|source| SealPayloadError::SanityCheck {
            id: info.id,
            hash: envelope.block_hash(),
            source,
        })?;
        Ok(envelope)
    }

    pub(crate) fn on_build_sealed(
        &self,
        envelope: &Arc<ExecutionPayloadEnvelope>,
        block: L2BlockInfo,
        build_started: Instant,
        concluding: bool,
        derived_from: Option<BlockInfo>,
    ) {
        // Blocks meant to become (pending) safe are inserted right away.
        if derived_from.is_some() {
            self.emitter.emit(EngineEvent::PayloadProcess {
                envelope: Arc::clone(envelope),
                block,
                build_started,
                concluding,
                derived_from,
            });
        }
    }

    pub(crate) async fn on_payload_process(
        &self,
        envelope: &Arc<ExecutionPayloadEnvelope>,
        block: L2BlockInfo,
        build_started: Instant,
        concluding: bool,
        derived_from: Option<BlockInfo>,
    ) {
        let timeout = self.config.timeouts.payload_process;
        let status = match tokio::time::timeout(
            timeout,
            record_call_time(
                Metrics::NEW_PAYLOAD_METHOD,
                self.client.new_payload(
                    envelope.execution_payload.clone(),
                    envelope.parent_beacon_block_root,
                ),
            ),
        )
        .await
        {
            Ok(Ok(status)) => status.status,
            Ok(Err(err)) => return self.report(PayloadProcessError::NewPayload(err)),
            Err(_) => return self.report(PayloadProcessError::Timeout(timeout)),
        };

        match status {
            PayloadStatusEnum::Valid => {
                debug!(
                    target: "engine_builder",
                    block = %block,
                    build_time = ?build_started.elapsed(),
                    "Inserted sealed payload"
                );
                self.emitter.emit(EngineEvent::PayloadSuccess {
                    envelope: Arc::clone(envelope),
                    block,
                    concluding,
                    derived_from,
                });
            }
            PayloadStatusEnum::Invalid { validation_error } => {
                // Not every validity check runs when the build starts or is sealed.
                if let Some(source) = derived_from
                    && self.config.rollup.is_holocene_active(source.timestamp)
                {
                    self.request_deposits_only(block.block_info.parent_id(), source);
                    return;
                }
                self.emitter.emit(EngineEvent::PayloadInvalid {
                    envelope: Arc::clone(envelope),
                    err: Arc::new(InvalidNewPayload {
                        number: block.number(),
                        hash: block.hash(),
                        validation_error,
                    }),
                });
            }
            status => self.report(PayloadProcessError::UnexpectedStatus { status, block }),
        }
    }

    pub(crate) async fn on_payload_success(
        &self,
        state: &mut EngineState,
        envelope: &Arc<ExecutionPayloadEnvelope>,
        block: L2BlockInfo,
        concluding: bool,
        derived_from: Option<BlockInfo>,
    ) {
        if derived_from == Some(REPLACE_BLOCK_SOURCE) {
            warn!(
                target: "engine_builder",
                replacement = %block,
                "Successfully built replacement block, resetting chain to continue now"
            );
            // The replacement becomes the cross-safe tip and syncing continues from it.
            let finalized = state.heads.finalized_head();
            self.force_reset_inner(state, block, block, block, block, finalized).await;
            self.emitter.emit(InteropEvent::ReplacedBlock { envelope: Arc::clone(envelope), block });
            self.try_update_engine_and_report(state).await;
            return;
        }

        self.try_update_unsafe_inner(state, block);
        if let Some(source) = derived_from {
            self.try_update_pending_safe_inner(state, block, concluding, source);
            self.try_update_local_safe_inner(state, block, concluding, source);
        }

        if let Err(err) = self.try_update_engine_inner(state).await {
            error!(target: "engine_builder", %err, "Failed to update engine");
            if err.severity() == EngineErrorSeverity::Critical {
                self.report(err);
            }
        }

        let payload = &envelope.execution_payload.payload_inner.payload_inner;
        info!(
            target: "engine_builder",
            hash = %block.hash(),
            number = block.number(),
            state_root = %payload.state_root,
            timestamp = block.block_info.timestamp,
            parent = %block.block_info.parent_hash,
            prev_randao = %payload.prev_randao,
            fee_recipient = %payload.fee_recipient,
            txs = payload.transactions.len(),
            last_in_span = concluding,
            derived_from = ?derived_from.map(|source| source.id()),
            mgas = payload.gas_used as f64 / 1_000_000.0,
            "Inserted new L2 unsafe block"
        );
    }

    pub(crate) fn on_build_invalid(
        &self,
        state: &mut EngineState,
        attributes: &Arc<AttributesWithParent>,
        err: &EventError,
    ) {
        warn!(target: "engine_builder", %err, "Could not process payload attributes");

        // Deposits cannot be dropped, so there is no way to recover.
        if attributes.is_deposits_only() {
            error!(
                target: "engine_builder",
                parent = %attributes.parent,
                %err,
                "Deposit only block was invalid"
            );
            self.report(DepositsOnlyBlockInvalid(Arc::clone(err)));
            return;
        }
        if let Some(source) = attributes.derived_from
            && self.config.rollup.is_holocene_active(source.timestamp)
        {
            self.request_deposits_only(attributes.parent.id(), source);
            return;
        }

        // Roll the pending safe head back and restore the previous unsafe chain.
        let safe = state.heads.safe_head();
        state.set_pending_safe_head(safe);
        let backup = state.heads.backup_unsafe_head();
        state.set_backup_unsafe_head(backup, true);
        self.emitter.emit(DerivationEvent::InvalidPayloadAttributes {
            attributes: Arc::clone(attributes),
            err: Arc::clone(err),
        });
    }

    pub(crate) async fn on_build_cancel(&self, info: PayloadInfo, force: bool) {
        // A build job ends once its payload is retrieved; the engine API has no cancel call.
        warn!(target: "engine_builder", payload_id = %info.id, "Cancelling block building job");
        let timeout = self.config.timeouts.build_cancel;
        let err = match tokio::time::timeout(
            timeout,
            record_call_time(Metrics::GET_PAYLOAD_METHOD, self.client.get_payload(info)),
        )
        .await
        {
            Ok(Ok(_)) => return,
            // Unknown jobs need no cancelling.
            Ok(Err(err)) if error_code(&err) == Some(UNKNOWN_PAYLOAD) => return,
            Ok(Err(source)) => CancelPayloadError::GetPayload { id: info.id, source },
            Err(_) => CancelPayloadError::Timeout { id: info.id, timeout },
        };
        error!(target: "engine_builder", payload_id = %info.id, %err, "Failed to cancel block building job");
        if !force {
            self.report(err);
        }
    }

    fn request_deposits_only(&self, parent: BlockNumHash, derived_from: BlockInfo) {
        warn!(
            target: "engine_builder",
            ?parent,
            derived_from = ?derived_from.id(),
            "Holocene active, requesting deposits-only attributes"
        );
        self.emitter.emit(DerivationEvent::DepositsOnlyPayloadAttributesRequest { parent, derived_from });
    }
}

/// Records the sealing time, the build time beyond the block time and the sequenced
/// transaction counts of a sealed block.
#[cfg(feature = "metrics")]
fn record_seal_metrics(
    seal_time: Duration,
    build_time: Duration,
    block_time: u64,
    txs: usize,
    deposits: usize,
) {
    rollup_macros::record!(histogram, Metrics::SEQUENCER_SEALING_DURATION, seal_time.as_secs_f64());
    rollup_macros::record!(
        histogram,
        Metrics::SEQUENCER_BUILDING_DIFF_DURATION,
        build_time.as_secs_f64() - block_time as f64
    );
    rollup_macros::inc!(
        counter,
        Metrics::SEQUENCED_TRANSACTIONS,
        by deposits as u64,
        "kind" => Metrics::DEPOSIT_TX_KIND
    );
    rollup_macros::inc!(
        counter,
        Metrics::SEQUENCED_TRANSACTIONS,
        by txs.saturating_sub(deposits) as u64,
        "kind" => Metrics::USER_TX_KIND
    );
}

/// Records the sealing time, the build time beyond the block time and the sequenced
/// transaction counts of a sealed block.
#[cfg(not(feature = "metrics"))]
const fn record_seal_metrics(
    _seal_time: Duration,
    _build_time: Duration,
    _block_time: u64,
    _txs: usize,
    _deposits: usize,
) {
}
