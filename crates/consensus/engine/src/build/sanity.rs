//! Structural checks of sealed payloads.

use alloy_primitives::B256;
use rollup_protocol::{BlockInfo, ExecutionPayloadEnvelope, is_deposit};
use thiserror::Error;

/// The L1 source marking an interop replacement block.
///
/// A [`crate::EngineEvent::PayloadSuccess`] derived from this source force-resets the
/// engine onto the replacement block instead of advancing the heads normally.
pub const REPLACE_BLOCK_SOURCE: BlockInfo =
    BlockInfo::new(B256::repeat_byte(0xff), u64::MAX, B256::repeat_byte(0xff), 0);

/// A sealed payload that cannot be inserted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanityCheckError {
    /// The payload has no transactions, not even the L1 info deposit.
    #[error("payload is empty, and does not contain L1 info deposit tx")]
    EmptyTransactions,
    /// The first transaction is not a deposit.
    #[error("first transaction was not deposit tx. Got {0}")]
    FirstTxNotDeposit(u8),
    /// A transaction is empty.
    #[error("transaction {0} is empty")]
    EmptyTransaction(usize),
    /// A deposit follows a non-deposit transaction.
    #[error("deposit tx (#{index}) found after other non-deposit txs (last leading deposit: #{last_deposit})")]
    DepositAfterNonDeposit {
        /// Index of the misplaced deposit.
        index: usize,
        /// Index of the last leading deposit.
        last_deposit: usize,
    },
}

/// Returns the index of the last deposit in the leading run of deposits.
pub fn last_deposit(envelope: &ExecutionPayloadEnvelope) -> Result<usize, SanityCheckError> {
    let txs = envelope.transactions();
    let first = txs.first().ok_or(SanityCheckError::EmptyTransactions)?;
    if !is_deposit(first) {
        return Err(SanityCheckError::FirstTxNotDeposit(first.first().copied().unwrap_or_default()));
    }

    let mut last = 0;
    for (index, tx) in txs.iter().enumerate().skip(1) {
        if tx.is_empty() {
            return Err(SanityCheckError::EmptyTransaction(index));
        }
        if !is_deposit(tx) {
            break;
        }
        last = index;
    }
    Ok(last)
}

/// Checks that the payload starts with one or more deposits and has none afterwards.
pub fn sanity_check_payload(envelope: &ExecutionPayloadEnvelope) -> Result<(), SanityCheckError> {
    let last = last_deposit(envelope)?;
    for (index, tx) in envelope.transactions().iter().enumerate().skip(last + 1) {
        if tx.is_empty() {
            return Err(SanityCheckError::EmptyTransaction(index));
        }
        if is_deposit(tx) {
            return Err(SanityCheckError::DepositAfterNonDeposit { index, last_deposit: last });
        }
    }
    Ok(())
}
