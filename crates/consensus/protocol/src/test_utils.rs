use alloy_primitives::{Address, B256, Bloom, Bytes, U256};
use alloy_rlp::{Encodable, Header};
use alloy_rpc_types_engine::{ExecutionPayloadV1, ExecutionPayloadV2, ExecutionPayloadV3};

use crate::{DEPOSIT_TX_TYPE, L1BlockInfoTx, L1InfoFormat};

/// Encodes a deposit transaction carrying the given calldata.
pub fn deposit_tx(input: &[u8]) -> Bytes {
    let mut payload = Vec::new();
    B256::ZERO.encode(&mut payload);
    Address::ZERO.encode(&mut payload);
    Address::ZERO.encode(&mut payload);
    U256::ZERO.encode(&mut payload);
    U256::ZERO.encode(&mut payload);
    1_000_000u64.encode(&mut payload);
    false.encode(&mut payload);
    Bytes::copy_from_slice(input).encode(&mut payload);

    let mut out = vec![DEPOSIT_TX_TYPE];
    Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out.into()
}

/// Encodes an Ecotone L1 info deposit for the given L1 origin.
pub fn l1_info_deposit(l1_number: u64, l1_hash: B256, sequence_number: u64) -> Bytes {
    let info = L1BlockInfoTx {
        format: L1InfoFormat::Ecotone,
        number: l1_number,
        time: l1_number * 12,
        block_hash: l1_hash,
        sequence_number,
    };
    deposit_tx(&info.encode_calldata())
}

/// A minimal non-deposit (EIP-1559 typed) transaction.
pub fn user_tx() -> Bytes {
    Bytes::from_static(&[0x02, 0xc0])
}

/// Builds an execution payload with the given identity and transactions.
pub fn payload_with(
    number: u64,
    hash: B256,
    parent_hash: B256,
    timestamp: u64,
    transactions: Vec<Bytes>,
) -> ExecutionPayloadV3 {
    ExecutionPayloadV3 {
        payload_inner: ExecutionPayloadV2 {
            payload_inner: ExecutionPayloadV1 {
                parent_hash,
                fee_recipient: Address::ZERO,
                state_root: B256::ZERO,
                receipts_root: B256::ZERO,
                logs_bloom: Bloom::ZERO,
                prev_randao: B256::ZERO,
                block_number: number,
                gas_limit: 30_000_000,
                gas_used: 0,
                timestamp,
                extra_data: Bytes::new(),
                base_fee_per_gas: U256::from(1u64),
                block_hash: hash,
                transactions,
            },
            withdrawals: Vec::new(),
        },
        blob_gas_used: 0,
        excess_blob_gas: 0,
    }
}
