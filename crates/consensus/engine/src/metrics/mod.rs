//! Prometheus metrics collection for engine operations.
//!
//! Provides metric identifiers and labels for monitoring the head references,
//! the unsafe payload buffer, block sealing and engine API latencies.

/// Metrics container with constants for Prometheus metric collection.
///
/// Contains identifiers for gauges, counters, and histograms used to monitor
/// engine operations when the `metrics` feature is enabled. Metrics track:
///
/// - Block progression through safety levels (unsafe → finalized)
/// - Occupancy of the unsafe payload buffer
/// - Sealing latency and transaction counts of built blocks
/// - Engine API method call latencies, errors and resets
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Identifier for the gauge that tracks block labels.
    pub const BLOCK_LABELS: &str = "rollup_node_block_labels";
    /// Unsafe block label.
    pub const UNSAFE_BLOCK_LABEL: &str = "unsafe";
    /// Cross-unsafe block label.
    pub const CROSS_UNSAFE_BLOCK_LABEL: &str = "cross-unsafe";
    /// Pending-safe block label.
    pub const PENDING_SAFE_BLOCK_LABEL: &str = "pending-safe";
    /// Local-safe block label.
    pub const LOCAL_SAFE_BLOCK_LABEL: &str = "local-safe";
    /// Safe block label.
    pub const SAFE_BLOCK_LABEL: &str = "safe";
    /// Finalized block label.
    pub const FINALIZED_BLOCK_LABEL: &str = "finalized";
    /// Backup-unsafe block label.
    pub const BACKUP_UNSAFE_BLOCK_LABEL: &str = "backup-unsafe";

    /// Identifier for the gauge that tracks the number of buffered unsafe payloads.
    pub const UNSAFE_PAYLOADS_BUFFER_LEN: &str = "rollup_node_unsafe_payloads_buffer_len";
    /// Identifier for the gauge that tracks the memory held by buffered unsafe payloads.
    pub const UNSAFE_PAYLOADS_BUFFER_MEM: &str = "rollup_node_unsafe_payloads_buffer_mem_bytes";
    /// Identifier for the gauge that tracks the number of the next buffered unsafe payload.
    pub const UNSAFE_PAYLOADS_NEXT: &str = "rollup_node_unsafe_payloads_next";

    /// Identifier for the histogram that tracks `engine_getPayload` sealing time.
    pub const SEQUENCER_SEALING_DURATION: &str = "rollup_node_sequencer_sealing_duration";
    /// Identifier for the histogram that tracks the build time beyond the block time.
    pub const SEQUENCER_BUILDING_DIFF_DURATION: &str =
        "rollup_node_sequencer_building_diff_duration";
    /// Identifier for the counter of transactions in sealed blocks.
    pub const SEQUENCED_TRANSACTIONS: &str = "rollup_node_sequenced_transactions";
    /// Deposit transaction kind label.
    pub const DEPOSIT_TX_KIND: &str = "deposit";
    /// User transaction kind label.
    pub const USER_TX_KIND: &str = "user";

    /// Identifier for the histogram that tracks engine method call time.
    pub const ENGINE_METHOD_REQUEST_DURATION: &str = "rollup_node_engine_method_request_duration";
    /// `engine_forkchoiceUpdated` label
    pub const FORKCHOICE_UPDATE_METHOD: &str = "engine_forkchoiceUpdated";
    /// `engine_newPayload` label.
    pub const NEW_PAYLOAD_METHOD: &str = "engine_newPayload";
    /// `engine_getPayload` label.
    pub const GET_PAYLOAD_METHOD: &str = "engine_getPayload";

    /// Identifier for the counter of error events, labelled by severity.
    pub const ENGINE_ERRORS: &str = "rollup_node_engine_errors";
    /// Identifier for the counter that tracks the number of times the engine has been reset.
    pub const ENGINE_RESET_COUNT: &str = "rollup_node_engine_reset_count";
    /// Identifier for the histogram that tracks how long execution-layer sync took.
    pub const EL_SYNC_DURATION: &str = "rollup_node_el_sync_duration";

    /// Initializes metrics for the engine.
    ///
    /// This does two things:
    /// * Describes various metrics.
    /// * Initializes metrics to 0 so they can be queried immediately.
    #[cfg(feature = "metrics")]
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    /// Describes metrics used in [`rollup_engine`][crate].
    #[cfg(feature = "metrics")]
    pub fn describe() {
        metrics::describe_gauge!(Self::BLOCK_LABELS, "Blockchain head labels");

        metrics::describe_gauge!(
            Self::UNSAFE_PAYLOADS_BUFFER_LEN,
            metrics::Unit::Count,
            "Number of buffered unsafe payloads"
        );
        metrics::describe_gauge!(
            Self::UNSAFE_PAYLOADS_BUFFER_MEM,
            metrics::Unit::Bytes,
            "Estimated memory held by buffered unsafe payloads"
        );
        metrics::describe_gauge!(
            Self::UNSAFE_PAYLOADS_NEXT,
            "Block number of the next buffered unsafe payload"
        );

        metrics::describe_histogram!(
            Self::SEQUENCER_SEALING_DURATION,
            metrics::Unit::Seconds,
            "Time spent sealing a built block"
        );
        metrics::describe_histogram!(
            Self::SEQUENCER_BUILDING_DIFF_DURATION,
            metrics::Unit::Seconds,
            "Block build time minus the configured block time"
        );
        metrics::describe_counter!(
            Self::SEQUENCED_TRANSACTIONS,
            metrics::Unit::Count,
            "Transactions included in sealed blocks"
        );

        metrics::describe_histogram!(
            Self::ENGINE_METHOD_REQUEST_DURATION,
            metrics::Unit::Seconds,
            "Engine method request duration"
        );
        metrics::describe_counter!(
            Self::ENGINE_ERRORS,
            metrics::Unit::Count,
            "Engine error events by severity"
        );
        metrics::describe_counter!(
            Self::ENGINE_RESET_COUNT,
            metrics::Unit::Count,
            "Engine reset count"
        );
        metrics::describe_histogram!(
            Self::EL_SYNC_DURATION,
            metrics::Unit::Seconds,
            "Duration of execution-layer sync"
        );
    }

    /// Initializes metrics to `0` so they can be queried immediately by consumers of prometheus
    /// metrics.
    #[cfg(feature = "metrics")]
    pub fn zero() {
        rollup_macros::set!(gauge, Self::UNSAFE_PAYLOADS_BUFFER_LEN, 0.0);
        rollup_macros::set!(gauge, Self::UNSAFE_PAYLOADS_BUFFER_MEM, 0.0);

        rollup_macros::set!(counter, Self::SEQUENCED_TRANSACTIONS, "kind", Self::DEPOSIT_TX_KIND, 0);
        rollup_macros::set!(counter, Self::SEQUENCED_TRANSACTIONS, "kind", Self::USER_TX_KIND, 0);

        rollup_macros::set!(counter, Self::ENGINE_ERRORS, "severity", "temporary", 0);
        rollup_macros::set!(counter, Self::ENGINE_ERRORS, "severity", "reset", 0);
        rollup_macros::set!(counter, Self::ENGINE_ERRORS, "severity", "critical", 0);

        rollup_macros::set!(counter, Self::ENGINE_RESET_COUNT, 0);
    }
}
