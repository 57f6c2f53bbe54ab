//! Macros for recording metrics.
//!
//! Every expansion is gated on the *calling* crate's `metrics` feature, so a crate that
//! compiles without it pays nothing for the call sites.

/// Sets a gauge or an absolute counter value, optionally with a single label.
#[macro_export]
macro_rules! set {
    (counter, $metric:path, $key:expr, $value:expr, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::counter!($metric, $key => $value).absolute($amount);
    };
    ($instrument:ident, $metric:path, $key:expr, $value:expr, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric, $key => $value).set($amount);
    };
    (counter, $metric:path, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::counter!($metric).absolute($amount);
    };
    ($instrument:ident, $metric:path, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric).set($amount);
    };
}

/// Increments a counter.
///
/// With a trailing amount after `by`, the counter grows by that amount instead of one.
#[macro_export]
macro_rules! inc {
    ($instrument:ident, $metric:path, by $amount:expr $(, $label_key:expr => $label_value:expr)*$(,)?) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric $(, $label_key => $label_value)*).increment($amount);
    };
    ($instrument:ident, $metric:path $(, $label_key:expr => $label_value:expr)*$(,)?) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric $(, $label_key => $label_value)*).increment(1);
    };
}

/// Records a histogram sample, optionally with a single label.
#[macro_export]
macro_rules! record {
    ($instrument:ident, $metric:path, $key:expr, $value:expr, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric, $key => $value).record($amount);
    };
    ($instrument:ident, $metric:path, $amount:expr) => {
        #[cfg(feature = "metrics")]
        metrics::$instrument!($metric).record($amount);
    };
}
