#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod block;
pub use block::{BlockInfo, FromPayloadError, L2BlockInfo};

mod payload;
pub use payload::{ExecutionPayloadEnvelope, PayloadInfo};

mod attributes;
pub use attributes::{AttributesWithParent, RollupPayloadAttributes};

mod deposits;
pub use deposits::{DEPOSIT_TX_TYPE, DepositDecodeError, deposit_input, is_deposit};

mod info;
pub use info::{L1BlockInfoTx, L1InfoDecodeError, L1InfoFormat};

#[cfg(any(test, feature = "test-utils"))]
/// Fixtures for building payloads and deposit transactions in tests.
pub mod test_utils;
