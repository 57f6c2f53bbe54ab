//! The block-build pipeline.

mod error;
pub use error::{
    BuildStartError, CancelPayloadError, DepositsOnlyBlockInvalid, InvalidNewPayload,
    PayloadProcessError, SealPayloadError,
};

mod sanity;
pub use sanity::{REPLACE_BLOCK_SOURCE, SanityCheckError, last_deposit, sanity_check_payload};

mod handlers;

#[cfg(test)]
mod build_test;
