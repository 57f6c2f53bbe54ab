//! The event loop driving the engine controller.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    EngineClient, EngineController, EngineErrorSeverity, EngineEvent, ErrorEvent, Event,
    EventError,
};

/// A subsystem that reacts to events travelling through the event FIFO.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles an event. Returns false if the event is not meant for this handler.
    async fn on_event(&self, event: &Event) -> bool;
}

/// The event loop stopped.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A handler raised an error the node cannot recover from.
    #[error("critical error: {0}")]
    Critical(EventError),
}

/// Drains the event FIFO one event at a time, handing every event to the
/// [`EngineController`] and then to every registered [`EventHandler`].
///
/// Handlers only enqueue follow-up events, so an event is fully handled before the
/// next one is dequeued.
pub struct EventRouter<C: EngineClient> {
    rx: mpsc::UnboundedReceiver<Event>,
    controller: Arc<EngineController<C>>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl<C: EngineClient> EventRouter<C> {
    /// Creates a router over the receiving side of the controller's event FIFO.
    pub const fn new(
        controller: Arc<EngineController<C>>,
        rx: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self { rx, controller, handlers: Vec::new() }
    }

    /// Registers a handler. Handlers see events in registration order.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Returns the routed [`EngineController`].
    pub const fn controller(&self) -> &Arc<EngineController<C>> {
        &self.controller
    }

    /// Handles events until the FIFO is empty, returning how many were handled.
    pub async fn drain(&mut self) -> Result<usize, RouterError> {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.dispatch(&event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handles events as they arrive until cancelled or a critical error is raised.
    pub async fn run(mut self, cancellation: CancellationToken) -> Result<(), RouterError> {
        info!(target: "engine_router", handlers = self.handlers.len(), "Starting event router");
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    info!(target: "engine_router", "Received shutdown signal. Exiting event router.");
                    return Ok(());
                }
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        warn!(target: "engine_router", "Event FIFO closed, exiting event router");
                        return Ok(());
                    };
                    self.dispatch(&event).await?;
                }
            }
        }
    }

    async fn dispatch(&self, event: &Event) -> Result<(), RouterError> {
        if let Event::Error(err) = event {
            self.on_error(err)?;
        }

        let mut handled = self.controller.on_event(event).await;
        for handler in &self.handlers {
            handled |= handler.on_event(event).await;
        }
        if !handled && !matches!(event, Event::Error(_)) {
            trace!(target: "engine_router", ?event, "Event not handled");
        }
        Ok(())
    }

    fn on_error(&self, err: &ErrorEvent) -> Result<(), RouterError> {
        let severity = err.severity();
        rollup_macros::inc!(
            counter,
            crate::Metrics::ENGINE_ERRORS,
            "severity" => severity.as_str()
        );
        match severity {
            EngineErrorSeverity::Temporary => {
                warn!(target: "engine_router", err = %err.error(), "Temporary engine error");
            }
            EngineErrorSeverity::Reset => {
                warn!(target: "engine_router", err = %err.error(), "Engine reset required");
                self.controller.emitter.emit(EngineEvent::ResetEngineRequest);
            }
            EngineErrorSeverity::Critical => {
                error!(target: "engine_router", err = %err.error(), "Critical engine error");
                return Err(RouterError::Critical(Arc::clone(err.error())));
            }
        }
        Ok(())
    }
}

impl<C: EngineClient> std::fmt::Debug for EventRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("controller", &self.controller)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use alloy_eips::BlockNumberOrTag;
    use alloy_rpc_types_engine::PayloadStatusEnum;

    use super::*;
    use crate::{
        DerivationEvent, EventEmitter,
        test_utils::{
            MockEngineClient, TestError, block_ref, fcu_response, payload_for, status,
            test_config,
        },
    };

    #[derive(Debug, Default)]
    struct DerivationRecorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for DerivationRecorder {
        async fn on_event(&self, event: &Event) -> bool {
            let Event::Derivation(event) = event else {
                return false;
            };
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("{event:?}"));
            }
            true
        }
    }

    fn router(client: MockEngineClient) -> (EventRouter<MockEngineClient>, EventEmitter) {
        let (emitter, rx) = EventEmitter::channel();
        let controller =
            Arc::new(EngineController::new(Arc::new(client), test_config(), emitter.clone()));
        (EventRouter::new(controller, rx), emitter)
    }

    fn valid_client() -> MockEngineClient {
        MockEngineClient::builder()
            .with_fork_choice_updated_response(fcu_response(PayloadStatusEnum::Valid, None))
            .with_new_payload_response(status(PayloadStatusEnum::Valid))
            .with_block_info_by_label(BlockNumberOrTag::Latest, block_ref(2))
            .with_block_info_by_label(BlockNumberOrTag::Safe, block_ref(2))
            .with_block_info_by_label(BlockNumberOrTag::Finalized, block_ref(1))
            .build()
    }

    #[tokio::test]
    async fn test_drain_runs_follow_up_events() {
        let (mut router, emitter) = router(valid_client());
        let controller = Arc::clone(router.controller());

        emitter.emit(EngineEvent::ResetEngineRequest);
        controller.add_unsafe_payload(payload_for(&block_ref(3), vec![])).await;
        assert!(router.drain().await.unwrap() > 2);

        assert_eq!(controller.unsafe_head().await, block_ref(3));
        assert_eq!(controller.cross_unsafe_head().await, block_ref(3));
        assert_eq!(controller.safe_head().await, block_ref(2));
        assert_eq!(router.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_reach_registered_handlers() {
        let recorder = Arc::new(DerivationRecorder::default());
        let (router, emitter) = router(valid_client());
        let mut router = router.with_handler(recorder.clone());

        emitter.emit(DerivationEvent::ConfirmPipelineReset);
        assert_eq!(router.drain().await.unwrap(), 1);

        let seen = recorder.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec!["ConfirmPipelineReset".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_error_requests_engine_reset() {
        let (mut router, emitter) = router(valid_client());

        emitter.emit_error(EngineErrorSeverity::Reset, TestError("diverged"));
        router.drain().await.unwrap();

        let heads = router.controller().heads().await;
        assert_eq!(heads.unsafe_head(), block_ref(2));
        assert_eq!(heads.safe_head(), block_ref(2));
        assert_eq!(heads.finalized_head(), block_ref(1));
    }

    #[tokio::test]
    async fn test_temporary_error_keeps_draining() {
        let recorder = Arc::new(DerivationRecorder::default());
        let (router, emitter) = router(valid_client());
        let mut router = router.with_handler(recorder.clone());

        emitter.emit_error(EngineErrorSeverity::Temporary, TestError("flaky"));
        emitter.emit(DerivationEvent::ConfirmPipelineReset);
        assert_eq!(router.drain().await.unwrap(), 2);
        assert!(router.controller().unsafe_head().await.is_unset());
    }

    #[tokio::test]
    async fn test_critical_error_stops_router() {
        let (mut router, emitter) = router(valid_client());

        emitter.emit_error(EngineErrorSeverity::Critical, TestError("boom"));
        emitter.emit(DerivationEvent::ConfirmPipelineReset);

        let err = router.drain().await.unwrap_err();
        assert!(matches!(&err, RouterError::Critical(inner) if inner.to_string() == "boom"));
        // The remaining events stay queued.
        assert_eq!(router.drain().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_critical_error() {
        let (router, emitter) = router(valid_client());
        emitter.emit_error(EngineErrorSeverity::Critical, TestError("boom"));

        let err = router.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RouterError::Critical(_)));
    }

    #[tokio::test]
    #[cfg(feature = "metrics")]
    async fn test_error_events_are_counted_by_severity() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);
        let (mut router, emitter) = router(valid_client());

        emitter.emit_error(EngineErrorSeverity::Temporary, TestError("flaky"));
        emitter.emit_error(EngineErrorSeverity::Temporary, TestError("flaky"));
        router.drain().await.unwrap();

        assert!(handle.render().contains("rollup_node_engine_errors{severity=\"temporary\"} 2"));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let (router, emitter) = router(valid_client());
        emitter.emit(EngineEvent::ResetEngineRequest);

        let cancellation = CancellationToken::new();
        cancellation.cancel();
        router.run(cancellation).await.unwrap();
    }
}
