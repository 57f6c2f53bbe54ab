//! The engine controller: head references and the forkchoice protocol.

use std::{sync::Arc, time::Instant};

use alloy_eips::BlockNumberOrTag;
use alloy_rpc_types_engine::{ForkchoiceState, PayloadStatusEnum};
use rollup_genesis::ChainSpec;
use rollup_protocol::{BlockInfo, ExecutionPayloadEnvelope, L2BlockInfo};
use tokio::sync::Mutex;

use crate::{
    AttributesForceResetter, BackupReorgError, CrossUpdateHandler, ElSyncObserver, EngineClient,
    EngineConfig, EngineError, EngineErrorSeverity, EngineEvent, EngineHeads, EngineState,
    EngineUpdateError, EventEmitter, ForkchoiceUpdateError, InsertPayloadError, Metrics,
    OriginSelectorForceResetter, PipelineForceResetter, SyncStatus,
    client::record_call_time,
    forkchoice::{check_forkchoice_updated_status, check_new_payload_status},
    sync::block_ref_compat,
};

/// Owns the head references of the L2 chain and keeps the execution engine in line with them.
///
/// All state sits behind a single lock. Every public method holds it for its whole
/// duration, so each head transition is atomic with respect to the others. Events are
/// only enqueued while the lock is held and are handled after it is released.
pub struct EngineController<C: EngineClient> {
    pub(crate) client: Arc<C>,
    pub(crate) chain_spec: ChainSpec,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) emitter: EventEmitter,
    pub(crate) attributes_resetter: Option<Arc<dyn AttributesForceResetter>>,
    pub(crate) pipeline_resetter: Option<Arc<dyn PipelineForceResetter>>,
    pub(crate) origin_selector_resetter: Option<Arc<dyn OriginSelectorForceResetter>>,
    pub(crate) cross_update_handler: Option<Arc<dyn CrossUpdateHandler>>,
    pub(crate) el_sync_observer: Option<Arc<dyn ElSyncObserver>>,
}

impl<C: EngineClient> EngineController<C> {
    /// Creates a controller with zero heads.
    pub fn new(client: Arc<C>, config: EngineConfig, emitter: EventEmitter) -> Self {
        let state = EngineState::new(config.sync.sync_mode, config.max_unsafe_payloads_memory);
        Self {
            client,
            chain_spec: ChainSpec::new(Arc::clone(&config.rollup)),
            config,
            state: Mutex::new(state),
            emitter,
            attributes_resetter: None,
            pipeline_resetter: None,
            origin_selector_resetter: None,
            cross_update_handler: None,
            el_sync_observer: None,
        }
    }

    /// Sets the [`AttributesForceResetter`].
    pub fn with_attributes_resetter(mut self, resetter: Arc<dyn AttributesForceResetter>) -> Self {
        self.attributes_resetter = Some(resetter);
        self
    }

    /// Sets the [`PipelineForceResetter`].
    pub fn with_pipeline_resetter(mut self, resetter: Arc<dyn PipelineForceResetter>) -> Self {
        self.pipeline_resetter = Some(resetter);
        self
    }

    /// Sets the [`OriginSelectorForceResetter`].
    pub fn with_origin_selector_resetter(
        mut self,
        resetter: Arc<dyn OriginSelectorForceResetter>,
    ) -> Self {
        self.origin_selector_resetter = Some(resetter);
        self
    }

    /// Sets the [`CrossUpdateHandler`].
    pub fn with_cross_update_handler(mut self, handler: Arc<dyn CrossUpdateHandler>) -> Self {
        self.cross_update_handler = Some(handler);
        self
    }

    /// Sets the [`ElSyncObserver`].
    pub fn with_el_sync_observer(mut self, observer: Arc<dyn ElSyncObserver>) -> Self {
        self.el_sync_observer = Some(observer);
        self
    }

    /// Returns the [`ChainSpec`] of the chain.
    pub const fn chain_spec(&self) -> &ChainSpec {
        &self.chain_spec
    }

    /// Returns the [`EngineConfig`].
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a snapshot of every head reference.
    pub async fn heads(&self) -> EngineHeads {
        *self.state.lock().await.heads()
    }

    /// Returns the unsafe head.
    pub async fn unsafe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().unsafe_head()
    }

    /// Returns the cross-unsafe head.
    pub async fn cross_unsafe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().cross_unsafe_head()
    }

    /// Returns the pending safe head.
    pub async fn pending_safe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().pending_safe_head()
    }

    /// Returns the local safe head.
    pub async fn local_safe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().local_safe_head()
    }

    /// Returns the cross-safe head.
    pub async fn safe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().safe_head()
    }

    /// Returns the finalized head.
    pub async fn finalized_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().finalized_head()
    }

    /// Returns the backup unsafe head.
    pub async fn backup_unsafe_head(&self) -> L2BlockInfo {
        self.state.lock().await.heads().backup_unsafe_head()
    }

    /// Returns the [`SyncStatus`].
    pub async fn sync_status(&self) -> SyncStatus {
        self.state.lock().await.sync_status()
    }

    /// Returns true while EL sync is pending or in progress.
    pub async fn is_engine_syncing(&self) -> bool {
        self.state.lock().await.is_engine_syncing()
    }

    /// Sets the unsafe head.
    pub async fn set_unsafe_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_unsafe_head(&self.chain_spec, head);
    }

    /// Sets the cross-unsafe head.
    pub async fn set_cross_unsafe_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_cross_unsafe_head(head);
    }

    /// Sets the pending safe head.
    pub async fn set_pending_safe_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_pending_safe_head(head);
    }

    /// Sets the local safe head.
    pub async fn set_local_safe_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_local_safe_head(head);
    }

    /// Sets the cross-safe head.
    pub async fn set_safe_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_safe_head(head);
    }

    /// Sets the finalized head.
    pub async fn set_finalized_head(&self, head: L2BlockInfo) {
        self.state.lock().await.set_finalized_head(head);
    }

    /// Sets the backup unsafe head. With `trigger_reorg`, the next
    /// [`Self::try_backup_unsafe_reorg`] restores it.
    pub async fn set_backup_unsafe_head(&self, head: L2BlockInfo, trigger_reorg: bool) {
        self.state.lock().await.set_backup_unsafe_head(head, trigger_reorg);
    }

    /// Emits a [`EngineEvent::ForkchoiceUpdate`] carrying the current heads.
    pub async fn request_forkchoice_update(&self) {
        let state = self.state.lock().await;
        self.request_forkchoice_update_inner(&state);
    }

    /// Emits a [`EngineEvent::PendingSafeUpdate`] carrying the current heads.
    pub async fn request_pending_safe_update(&self) {
        let state = self.state.lock().await;
        self.emitter.emit(EngineEvent::PendingSafeUpdate {
            pending_safe: state.heads.pending_safe_head(),
            unsafe_head: state.heads.unsafe_head(),
        });
    }

    /// Sends the current heads to the engine if a forkchoice update is owed.
    ///
    /// Returns `Ok(false)` without calling the engine when no update is owed.
    pub async fn try_update_engine(&self) -> Result<bool, EngineUpdateError> {
        let mut state = self.state.lock().await;
        self.try_update_engine_inner(&mut state).await
    }

    /// Inserts an unsafe payload and makes it the unsafe head.
    pub async fn insert_unsafe_payload(
        &self,
        envelope: &ExecutionPayloadEnvelope,
        block: L2BlockInfo,
    ) -> Result<(), InsertPayloadError> {
        let mut state = self.state.lock().await;
        self.insert_unsafe_payload_inner(&mut state, envelope, block).await
    }

    /// Restores the backup unsafe head as the unsafe head, if a reorg onto it was requested.
    ///
    /// Returns `Ok(false)` when no reorg was attempted.
    pub async fn try_backup_unsafe_reorg(&self) -> Result<bool, BackupReorgError> {
        let mut state = self.state.lock().await;
        self.try_backup_unsafe_reorg_inner(&mut state).await
    }

    /// Raises the pending safe head to `block` if it is newer.
    pub async fn try_update_pending_safe(
        &self,
        block: L2BlockInfo,
        concluding: bool,
        source: BlockInfo,
    ) {
        let mut state = self.state.lock().await;
        self.try_update_pending_safe_inner(&mut state, block, concluding, source);
    }

    /// Raises the local safe head to `block` if it is newer and concludes its span batch.
    pub async fn try_update_local_safe(&self, block: L2BlockInfo, concluding: bool, source: BlockInfo) {
        let mut state = self.state.lock().await;
        self.try_update_local_safe_inner(&mut state, block, concluding, source);
    }

    /// Promotes `block` to the cross-safe head.
    pub async fn promote_safe(&self, block: L2BlockInfo, source: BlockInfo) {
        let mut state = self.state.lock().await;
        self.promote_safe_inner(&mut state, block, source).await;
    }

    /// Promotes `block` to the finalized head. Rewinds and blocks that are not safe yet are
    /// rejected without touching the state.
    pub async fn promote_finalized(&self, block: L2BlockInfo) {
        let mut state = self.state.lock().await;
        self.promote_finalized_inner(&mut state, block).await;
    }

    /// Resets every head at once, notifying the resetters beforehand.
    pub async fn force_reset(
        &self,
        local_unsafe: L2BlockInfo,
        cross_unsafe: L2BlockInfo,
        local_safe: L2BlockInfo,
        cross_safe: L2BlockInfo,
        finalized: L2BlockInfo,
    ) {
        let mut state = self.state.lock().await;
        self.force_reset_inner(&mut state, local_unsafe, cross_unsafe, local_safe, cross_safe, finalized)
            .await;
    }

    /// Returns the block reference of the lowest buffered unsafe payload, or the zero
    /// reference if there is none or it cannot be decoded.
    pub async fn lowest_queued_unsafe_block(&self) -> L2BlockInfo {
        let state = self.state.lock().await;
        let Some(envelope) = state.unsafe_payloads.peek() else {
            return L2BlockInfo::default();
        };
        match L2BlockInfo::from_payload_and_genesis(
            &envelope.execution_payload,
            &self.config.rollup.genesis,
        ) {
            Ok(block) => block,
            Err(err) => {
                warn!(
                    target: "engine",
                    ?err,
                    number = envelope.block_number(),
                    hash = %envelope.block_hash(),
                    "Failed to decode lowest queued unsafe payload"
                );
                L2BlockInfo::default()
            }
        }
    }

    /// Buffers an unsafe payload received from peers and requests a forkchoice update so
    /// it may be applied.
    pub async fn add_unsafe_payload(&self, envelope: Arc<ExecutionPayloadEnvelope>) {
        let mut state = self.state.lock().await;
        trace!(
            target: "engine_queue",
            number = envelope.block_number(),
            hash = %envelope.block_hash(),
            "Received unsafe payload"
        );
        let id = envelope.id();
        let timestamp = envelope.timestamp();
        if let Err(err) = state.unsafe_payloads.push(envelope) {
            warn!(target: "engine_queue", ?id, timestamp, %err, "Could not add unsafe payload");
            return;
        }

        let next = state.unsafe_payloads.peek().map(|next| next.id()).unwrap_or_default();
        rollup_macros::set!(
            gauge,
            Metrics::UNSAFE_PAYLOADS_BUFFER_LEN,
            state.unsafe_payloads.len() as f64
        );
        rollup_macros::set!(
            gauge,
            Metrics::UNSAFE_PAYLOADS_BUFFER_MEM,
            state.unsafe_payloads.mem_size() as f64
        );
        rollup_macros::set!(gauge, Metrics::UNSAFE_PAYLOADS_NEXT, next.number as f64);
        trace!(target: "engine_queue", ?next, "Next unsafe payload to process");

        self.request_forkchoice_update_inner(&state);
    }

    /// Emits an error event with the severity of `err`.
    pub(crate) fn report<E: EngineError>(&self, err: E) {
        self.emitter.emit_error(err.severity(), err);
    }

    /// Sends the current heads to the engine, reporting any failure as an error event.
    pub(crate) async fn try_update_engine_and_report(&self, state: &mut EngineState) {
        if let Err(err) = self.try_update_engine_inner(state).await {
            self.report(err);
        }
    }

    pub(crate) fn request_forkchoice_update_inner(&self, state: &EngineState) {
        self.emitter.emit(EngineEvent::ForkchoiceUpdate {
            unsafe_head: state.heads.unsafe_head(),
            safe: state.heads.safe_head(),
            finalized: state.heads.finalized_head(),
        });
    }

    pub(crate) async fn try_update_engine_inner(
        &self,
        state: &mut EngineState,
    ) -> Result<bool, EngineUpdateError> {
        if !state.need_fcu_call {
            return Ok(false);
        }
        if state.is_engine_syncing() {
            warn!(target: "engine", "Attempting to update forkchoice state while EL syncing");
        }
        self.initialize_unknowns(state).await?;

        let heads = state.heads;
        if heads.unsafe_head().number() < heads.finalized_head().number() {
            return Err(EngineUpdateError::UnsafeBehindFinalized {
                unsafe_head: heads.unsafe_head().number(),
                finalized: heads.finalized_head().number(),
            });
        }

        let response = record_call_time(
            Metrics::FORKCHOICE_UPDATE_METHOD,
            self.client.fork_choice_updated(state.forkchoice_state(), None),
        )
        .await
        .map_err(ForkchoiceUpdateError::classify)?;

        if response.payload_status.status.is_valid() {
            self.request_forkchoice_update_inner(state);
        }
        let now = state.heads;
        if now.unsafe_head() == now.safe_head() && now.safe_head() == now.pending_safe_head() {
            state.set_backup_unsafe_head(L2BlockInfo::default(), false);
        }
        state.need_fcu_call = false;
        state.log_sync_progress(&heads);
        Ok(true)
    }

    /// Loads the heads that were never set from the engine.
    async fn initialize_unknowns(&self, state: &mut EngineState) -> Result<(), EngineUpdateError> {
        if state.heads.unsafe_head().is_unset() {
            let head = self.load_head(BlockNumberOrTag::Latest).await?;
            state.set_unsafe_head(&self.chain_spec, head);
            info!(target: "engine", local_unsafe = %head, "Loaded initial local-unsafe block ref");
        }
        if state.heads.finalized_head().is_unset() {
            let head = self.load_head(BlockNumberOrTag::Finalized).await?;
            state.set_finalized_head(head);
            info!(target: "engine", finalized = %head, "Loaded initial finalized block ref");
        }
        if state.heads.safe_head().is_unset() {
            let label = BlockNumberOrTag::Safe;
            match block_ref_compat(&*self.client, label).await {
                Ok(Some(head)) => {
                    state.set_safe_head(head);
                    info!(target: "engine", cross_safe = %head, "Loaded initial cross-safe block ref");
                }
                Ok(None) => {
                    let head = state.heads.finalized_head();
                    state.set_safe_head(head);
                    info!(target: "engine", cross_safe = %head, "Loaded initial cross-safe block from finalized");
                }
                Err(source) => return Err(EngineUpdateError::LoadHead { label, source }),
            }
        }
        if state.heads.cross_unsafe_head().is_unset() {
            let head = state.heads.safe_head();
            state.set_cross_unsafe_head(head);
            info!(target: "engine", cross_unsafe = %head, "Set initial cross-unsafe block ref to match cross-safe");
        }
        if state.heads.local_safe_head().is_unset() {
            let head = state.heads.safe_head();
            state.set_local_safe_head(head);
            info!(target: "engine", local_safe = %head, "Set initial local-safe block ref to match cross-safe");
        }
        Ok(())
    }

    async fn load_head(&self, label: BlockNumberOrTag) -> Result<L2BlockInfo, EngineUpdateError> {
        block_ref_compat(&*self.client, label)
            .await
            .map_err(|source| EngineUpdateError::LoadHead { label, source })?
            .ok_or(EngineUpdateError::HeadNotFound(label))
    }

    pub(crate) async fn insert_unsafe_payload_inner(
        &self,
        state: &mut EngineState,
        envelope: &ExecutionPayloadEnvelope,
        block: L2BlockInfo,
    ) -> Result<(), InsertPayloadError> {
        let sync_mode = self.config.sync.sync_mode;

        // Probe once for a finalized block. If there is one, EL sync is skipped.
        if state.sync_status == SyncStatus::WillStartEl {
            let finalized = block_ref_compat(&*self.client, BlockNumberOrTag::Finalized).await;
            let post_finalization = self.config.sync.supports_post_finalization_el_sync;
            let start = match &finalized {
                Ok(None) => true,
                Ok(Some(finalized)) => {
                    finalized.hash() == self.config.rollup.genesis.l2.hash || post_finalization
                }
                Err(_) => post_finalization,
            };
            if start {
                state.sync_status = SyncStatus::StartedEl;
                state.el_sync_started_at = Some(Instant::now());
                info!(target: "engine", "Starting EL sync");
                if let Some(observer) = &self.el_sync_observer {
                    observer.on_el_sync_started();
                }
            } else {
                match finalized {
                    Ok(finalized) => {
                        state.sync_status = SyncStatus::FinishedEl;
                        info!(
                            target: "engine",
                            id = ?finalized.map(|f| f.id()),
                            "Skipping EL sync and going straight to CL sync because there is a finalized block"
                        );
                        return Ok(());
                    }
                    Err(err) => return Err(InsertPayloadError::FetchFinalized(err)),
                }
            }
        }

        let new_payload_start = Instant::now();
        let status = record_call_time(
            Metrics::NEW_PAYLOAD_METHOD,
            self.client.new_payload(
                envelope.execution_payload.clone(),
                envelope.parent_beacon_block_root,
            ),
        )
        .await
        .map_err(InsertPayloadError::NewPayload)?
        .status;

        if let PayloadStatusEnum::Invalid { validation_error } = &status {
            self.emitter.emit(EngineEvent::PayloadInvalid {
                envelope: Arc::new(envelope.clone()),
                err: Arc::new(crate::InvalidNewPayload {
                    number: envelope.block_number(),
                    hash: envelope.block_hash(),
                    validation_error: validation_error.clone(),
                }),
            });
        }
        if !check_new_payload_status(sync_mode, &mut state.sync_status, &status) {
            return Err(InsertPayloadError::UnacceptableNewPayloadStatus {
                block,
                status,
                sync_status: state.sync_status,
            });
        }
        let new_payload_time = new_payload_start.elapsed();

        let mut fc = ForkchoiceState {
            head_block_hash: envelope.block_hash(),
            safe_block_hash: state.heads.safe_head().hash(),
            finalized_block_hash: state.heads.finalized_head().hash(),
        };
        if state.sync_status == SyncStatus::FinishedElNotFinalized {
            fc.safe_block_hash = envelope.block_hash();
            fc.finalized_block_hash = envelope.block_hash();
            // The unsafe head must stay ahead of the safe and finalized heads.
            state.set_unsafe_head(&self.chain_spec, block);
            self.emitter.emit(EngineEvent::UnsafeUpdate { block });
            state.set_local_safe_head(block);
            state.set_safe_head(block);
            if let Some(handler) = &self.cross_update_handler {
                handler.on_cross_safe_update(block, block);
            }
            state.set_finalized_head(block);
        }

        let prev = state.heads;
        let fcu_start = Instant::now();
        let response = record_call_time(
            Metrics::FORKCHOICE_UPDATE_METHOD,
            self.client.fork_choice_updated(fc, None),
        )
        .await
        .map_err(ForkchoiceUpdateError::classify)?;
        let fcu_status = response.payload_status.status;
        if !check_forkchoice_updated_status(sync_mode, &mut state.sync_status, &fcu_status) {
            return Err(InsertPayloadError::UnacceptableForkchoiceStatus {
                block,
                status: fcu_status,
                sync_status: state.sync_status,
            });
        }
        let fcu_time = fcu_start.elapsed();

        state.set_unsafe_head(&self.chain_spec, block);
        state.need_fcu_call = false;
        self.emitter.emit(EngineEvent::UnsafeUpdate { block });

        if state.sync_status == SyncStatus::FinishedElNotFinalized {
            let sync_duration = state.el_sync_started_at.map(|start| start.elapsed()).unwrap_or_default();
            info!(
                target: "engine",
                ?sync_duration,
                finalized_block = ?block.id(),
                "Finished EL sync"
            );
            rollup_macros::record!(histogram, Metrics::EL_SYNC_DURATION, sync_duration.as_secs_f64());
            state.sync_status = SyncStatus::FinishedEl;
        }

        if fcu_status.is_valid() {
            self.request_forkchoice_update_inner(state);
        }
        state.log_sync_progress(&prev);

        let total_time = new_payload_time + fcu_time;
        let gas_used = envelope.execution_payload.payload_inner.payload_inner.gas_used;
        let mgas = gas_used as f64 / 1_000_000.0;
        info!(
            target: "engine",
            hash = %block.hash(),
            number = block.number(),
            state_root = %envelope.execution_payload.payload_inner.payload_inner.state_root,
            timestamp = block.block_info.timestamp,
            parent = %block.block_info.parent_hash,
            txs = envelope.transactions().len(),
            ?new_payload_time,
            ?fcu_time,
            ?total_time,
            mgas,
            mgasps = mgas / total_time.as_secs_f64().max(f64::EPSILON),
            "Inserted new L2 unsafe block (synchronous)"
        );
        Ok(())
    }

    pub(crate) async fn try_backup_unsafe_reorg_inner(
        &self,
        state: &mut EngineState,
    ) -> Result<bool, BackupReorgError> {
        if !state.need_fcu_call_backup_unsafe_reorg {
            return Ok(false);
        }
        if state.is_engine_syncing() {
            warn!(target: "engine", "Attempting to unsafe reorg using backup unsafe head while EL syncing");
            return Ok(false);
        }
        let backup = state.heads.backup_unsafe_head();
        if backup.is_unset() {
            warn!(target: "engine", "Attempting to unsafe reorg using backup unsafe head even though it is empty");
            state.set_backup_unsafe_head(L2BlockInfo::default(), false);
            return Ok(false);
        }

        // Only try once: the engine may have forgotten the backup head, or it is not part
        // of the chain anymore. Transport failures and unexpected codes are retried.
        state.need_fcu_call_backup_unsafe_reorg = false;
        warn!(
            target: "engine",
            backup_unsafe = ?backup.id(),
            unsafe_head = ?state.heads.unsafe_head().id(),
            "Trying to restore unsafe head"
        );
        let fc = ForkchoiceState {
            head_block_hash: backup.hash(),
            safe_block_hash: state.heads.safe_head().hash(),
            finalized_block_hash: state.heads.finalized_head().hash(),
        };

        let prev = state.heads;
        let response = match record_call_time(
            Metrics::FORKCHOICE_UPDATE_METHOD,
            self.client.fork_choice_updated(fc, None),
        )
        .await
        {
            Ok(response) => response,
            Err(err) => {
                let err = ForkchoiceUpdateError::classify(err);
                if err.severity() == EngineErrorSeverity::Reset {
                    state.set_backup_unsafe_head(L2BlockInfo::default(), false);
                } else {
                    state.need_fcu_call_backup_unsafe_reorg = true;
                }
                return Err(err.into());
            }
        };

        let status = response.payload_status.status;
        state.set_backup_unsafe_head(L2BlockInfo::default(), false);
        if !status.is_valid() {
            return Err(BackupReorgError::Rejected(status));
        }
        info!(target: "engine", unsafe_head = ?backup.id(), "Successfully reorged unsafe head using backup unsafe head");
        state.set_unsafe_head(&self.chain_spec, backup);
        self.request_forkchoice_update_inner(state);
        state.log_sync_progress(&prev);
        Ok(true)
    }

    pub(crate) fn try_update_pending_safe_inner(
        &self,
        state: &mut EngineState,
        block: L2BlockInfo,
        concluding: bool,
        source: BlockInfo,
    ) {
        // Resets and overwrites go through engine resets, never through promotion.
        if block.number() <= state.heads.pending_safe_head().number() {
            return;
        }
        debug!(
            target: "engine",
            pending_safe = %block,
            local_safe = ?state.heads.local_safe_head().id(),
            unsafe_head = ?state.heads.unsafe_head().id(),
            concluding,
            source = ?source.id(),
            "Updating pending safe"
        );
        state.set_pending_safe_head(block);
        self.emitter.emit(EngineEvent::PendingSafeUpdate {
            pending_safe: block,
            unsafe_head: state.heads.unsafe_head(),
        });
    }

    pub(crate) fn try_update_local_safe_inner(
        &self,
        state: &mut EngineState,
        block: L2BlockInfo,
        concluding: bool,
        source: BlockInfo,
    ) {
        if !concluding || block.number() <= state.heads.local_safe_head().number() {
            return;
        }
        debug!(
            target: "engine",
            local_safe = %block,
            safe = ?state.heads.safe_head().id(),
            unsafe_head = ?state.heads.unsafe_head().id(),
            "Updating local safe"
        );
        state.set_local_safe_head(block);
        self.emitter.emit(EngineEvent::LocalSafeUpdate { block, source });
    }

    pub(crate) fn try_update_unsafe_inner(&self, state: &mut EngineState, block: L2BlockInfo) {
        // Back up the unsafe head when the new block does not extend it.
        let unsafe_head = state.heads.unsafe_head();
        if unsafe_head.number() >= block.number() {
            state.set_backup_unsafe_head(unsafe_head, false);
        }
        state.set_unsafe_head(&self.chain_spec, block);
        self.emitter.emit(EngineEvent::UnsafeUpdate { block });
    }

    pub(crate) async fn promote_safe_inner(
        &self,
        state: &mut EngineState,
        block: L2BlockInfo,
        source: BlockInfo,
    ) {
        debug!(
            target: "engine",
            safe = %block,
            unsafe_head = ?state.heads.unsafe_head().id(),
            "Updating safe"
        );
        state.set_safe_head(block);
        self.emitter.emit(EngineEvent::SafeDerived { safe: block, source });
        if let Some(handler) = &self.cross_update_handler {
            handler.on_cross_safe_update(block, state.heads.local_safe_head());
        }
        if block.number() > state.heads.cross_unsafe_head().number() {
            debug!(
                target: "engine",
                cross_unsafe = ?state.heads.cross_unsafe_head().id(),
                cross_safe = ?block.id(),
                "Cross unsafe head is stale, updating to match cross safe"
            );
            state.set_cross_unsafe_head(block);
            if let Some(handler) = &self.cross_update_handler {
                handler.on_cross_unsafe_update(block, state.heads.unsafe_head());
            }
        }
        self.try_update_engine_and_report(state).await;
    }

    pub(crate) async fn promote_finalized_inner(&self, state: &mut EngineState, block: L2BlockInfo) {
        let heads = state.heads;
        if block.number() < heads.finalized_head().number() {
            error!(
                target: "engine",
                block = %block,
                finalized = %heads.finalized_head(),
                "Cannot rewind finality"
            );
            return;
        }
        if block.number() > heads.safe_head().number() {
            error!(
                target: "engine",
                block = %block,
                safe = %heads.safe_head(),
                "Block must be safe before it can be finalized"
            );
            return;
        }
        state.set_finalized_head(block);
        self.emitter.emit(EngineEvent::FinalizedUpdate { block });
        self.try_update_engine_and_report(state).await;
    }

    pub(crate) async fn force_reset_inner(
        &self,
        state: &mut EngineState,
        local_unsafe: L2BlockInfo,
        cross_unsafe: L2BlockInfo,
        local_safe: L2BlockInfo,
        cross_safe: L2BlockInfo,
        finalized: L2BlockInfo,
    ) {
        // Other components are reset before any head moves.
        if let Some(resetter) = &self.attributes_resetter {
            resetter.force_reset(local_unsafe, cross_unsafe, local_safe, cross_safe, finalized);
        }
        if let Some(resetter) = &self.pipeline_resetter {
            resetter.reset_pipeline();
        }
        if let Some(resetter) = &self.origin_selector_resetter {
            resetter.reset_origins();
        }

        info!(
            target: "engine",
            local_unsafe = ?local_unsafe.id(),
            cross_unsafe = ?cross_unsafe.id(),
            local_safe = ?local_safe.id(),
            cross_safe = ?cross_safe.id(),
            finalized = ?finalized.id(),
            "Resetting engine"
        );
        state.force_engine_reset(
            &self.chain_spec,
            local_unsafe,
            cross_unsafe,
            local_safe,
            cross_safe,
            finalized,
        );
        rollup_macros::inc!(counter, Metrics::ENGINE_RESET_COUNT);

        // Derivation sees the reset confirmed before any forkchoice update is dequeued.
        if self.pipeline_resetter.is_some() {
            self.emitter.emit(crate::DerivationEvent::ConfirmPipelineReset);
        }

        self.try_update_engine_and_report(state).await;

        let heads = state.heads;
        self.emitter.emit(EngineEvent::EngineResetConfirmed {
            local_unsafe: heads.unsafe_head(),
            cross_unsafe: heads.cross_unsafe_head(),
            local_safe: heads.local_safe_head(),
            cross_safe: heads.safe_head(),
            finalized: heads.finalized_head(),
        });
        info!(
            target: "engine",
            local_unsafe = ?heads.unsafe_head().id(),
            cross_unsafe = ?heads.cross_unsafe_head().id(),
            local_safe = ?heads.local_safe_head().id(),
            cross_safe = ?heads.safe_head().id(),
            finalized = ?heads.finalized_head().id(),
            "Reset of Engine is completed"
        );
    }
}

impl<C: EngineClient> std::fmt::Debug for EngineController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
