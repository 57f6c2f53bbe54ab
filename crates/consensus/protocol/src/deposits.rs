//! Deposit transaction helpers.

use alloy_rlp::Header;

/// The EIP-2718 transaction type of a deposit transaction.
pub const DEPOSIT_TX_TYPE: u8 = 0x7E;

/// Number of RLP fields of a deposit transaction that precede the `data` field.
const DEPOSIT_FIELDS_BEFORE_DATA: usize = 7;

/// An error raised while decoding an encoded deposit transaction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DepositDecodeError {
    /// The transaction is not deposit-typed.
    #[error("unexpected transaction type: {0:#04x}")]
    UnexpectedType(u8),
    /// The transaction body is truncated.
    #[error("truncated deposit transaction")]
    Truncated,
    /// The transaction body is not a valid RLP list.
    #[error("malformed deposit transaction: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

/// Returns true if the EIP-2718 encoded transaction is a deposit.
pub fn is_deposit(tx: &[u8]) -> bool {
    tx.first() == Some(&DEPOSIT_TX_TYPE)
}

/// Returns the `data` field of an EIP-2718 encoded deposit transaction.
///
/// The deposit body is the RLP list
/// `[source_hash, from, to, mint, value, gas, is_system_tx, data]`.
pub fn deposit_input(tx: &[u8]) -> Result<&[u8], DepositDecodeError> {
    let (&ty, mut buf) = tx.split_first().ok_or(DepositDecodeError::Truncated)?;
    if ty != DEPOSIT_TX_TYPE {
        return Err(DepositDecodeError::UnexpectedType(ty));
    }

    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(alloy_rlp::Error::UnexpectedString.into());
    }
    let mut body = buf.get(..header.payload_length).ok_or(DepositDecodeError::Truncated)?;

    for _ in 0..DEPOSIT_FIELDS_BEFORE_DATA {
        let field = Header::decode(&mut body)?;
        body = body.get(field.payload_length..).ok_or(DepositDecodeError::Truncated)?;
    }
    Ok(Header::decode_bytes(&mut body, false)?)
}
