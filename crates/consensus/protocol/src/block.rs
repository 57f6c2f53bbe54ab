//! Block Types

use alloy_eips::BlockNumHash;
use alloy_primitives::B256;
use alloy_rpc_types_engine::ExecutionPayloadV3;
use derive_more::Display;
use rollup_genesis::ChainGenesis;

use crate::{DEPOSIT_TX_TYPE, DepositDecodeError, L1BlockInfoTx, L1InfoDecodeError, deposit_input};

/// Block Header Info
#[derive(Debug, Clone, Display, Copy, Eq, Hash, PartialEq, Default)]
#[display(
    "BlockInfo {{ hash: {hash}, number: {number}, parent_hash: {parent_hash}, timestamp: {timestamp} }}"
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct BlockInfo {
    /// The block hash
    pub hash: B256,
    /// The block number
    pub number: u64,
    /// The parent block hash
    pub parent_hash: B256,
    /// The block timestamp
    pub timestamp: u64,
}

impl BlockInfo {
    /// Instantiates a new [`BlockInfo`].
    pub const fn new(hash: B256, number: u64, parent_hash: B256, timestamp: u64) -> Self {
        Self { hash, number, parent_hash, timestamp }
    }

    /// Returns the block ID.
    pub const fn id(&self) -> BlockNumHash {
        BlockNumHash { hash: self.hash, number: self.number }
    }

    /// Returns the ID of the parent block.
    pub const fn parent_id(&self) -> BlockNumHash {
        BlockNumHash { hash: self.parent_hash, number: self.number.saturating_sub(1) }
    }

    /// Returns `true` if this [`BlockInfo`] is the direct parent of the given block.
    pub fn is_parent_of(&self, block: &Self) -> bool {
        self.number.checked_add(1) == Some(block.number) && self.hash == block.parent_hash
    }
}

/// L2 Block Header Info
///
/// Identifies a position on the L2 chain together with the L1 block it was
/// derived from. Ordering between references is by number unless a caller
/// compares hashes explicitly.
#[derive(Debug, Display, Clone, Copy, Hash, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[display(
    "L2BlockInfo {{ block_info: {block_info}, l1_origin: {l1_origin:?}, seq_num: {seq_num} }}"
)]
pub struct L2BlockInfo {
    /// The base [`BlockInfo`]
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub block_info: BlockInfo,
    /// The L1 origin [`BlockNumHash`]
    #[cfg_attr(feature = "serde", serde(rename = "l1origin", alias = "l1Origin"))]
    pub l1_origin: BlockNumHash,
    /// The sequence number of the L2 block
    #[cfg_attr(feature = "serde", serde(rename = "sequenceNumber", alias = "seqNum"))]
    pub seq_num: u64,
}

impl L2BlockInfo {
    /// Instantiates a new [`L2BlockInfo`].
    pub const fn new(block_info: BlockInfo, l1_origin: BlockNumHash, seq_num: u64) -> Self {
        Self { block_info, l1_origin, seq_num }
    }

    /// Returns the block hash.
    pub const fn hash(&self) -> B256 {
        self.block_info.hash
    }

    /// Returns the block number.
    pub const fn number(&self) -> u64 {
        self.block_info.number
    }

    /// Returns the block ID.
    pub const fn id(&self) -> BlockNumHash {
        self.block_info.id()
    }

    /// Returns true if this is the zero reference, i.e. the head has not been set yet.
    pub fn is_unset(&self) -> bool {
        self.block_info.hash == B256::ZERO
    }

    /// Derives the [`L2BlockInfo`] of an execution payload.
    ///
    /// The L2 genesis block has no L1 info deposit, so its origin is taken from the
    /// [`ChainGenesis`]. Every other block carries its L1 origin and sequence number in
    /// the calldata of its first transaction.
    pub fn from_payload_and_genesis(
        payload: &ExecutionPayloadV3,
        genesis: &ChainGenesis,
    ) -> Result<Self, FromPayloadError> {
        let inner = &payload.payload_inner.payload_inner;
        let block_info = BlockInfo::new(
            inner.block_hash,
            inner.block_number,
            inner.parent_hash,
            inner.timestamp,
        );

        if inner.block_number == genesis.l2.number {
            if inner.block_hash != genesis.l2.hash {
                return Err(FromPayloadError::InvalidGenesisHash);
            }
            return Ok(Self { block_info, l1_origin: genesis.l1, seq_num: 0 });
        }

        let tx = inner
            .transactions
            .first()
            .ok_or(FromPayloadError::MissingL1InfoDeposit(inner.block_hash))?;
        let ty = tx.first().copied().unwrap_or_default();
        if ty != DEPOSIT_TX_TYPE {
            return Err(FromPayloadError::FirstTxNonDeposit(ty));
        }

        let info = L1BlockInfoTx::decode_calldata(deposit_input(tx)?)?;
        Ok(Self { block_info, l1_origin: info.id(), seq_num: info.sequence_number })
    }
}

/// An error that can occur when deriving an [`L2BlockInfo`] from an execution payload.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FromPayloadError {
    /// The genesis block hash does not match the expected value.
    #[error("invalid genesis hash")]
    InvalidGenesisHash,
    /// The L2 block is missing the L1 info deposit transaction.
    #[error("L2 block is missing L1 info deposit transaction ({0})")]
    MissingL1InfoDeposit(B256),
    /// The first payload transaction is not a deposit transaction.
    #[error("first payload transaction is not a deposit transaction, type: {0}")]
    FirstTxNonDeposit(u8),
    /// The L1 info deposit could not be decoded.
    #[error(transparent)]
    Deposit(#[from] DepositDecodeError),
    /// The L1 info calldata could not be decoded.
    #[error(transparent)]
    L1Info(#[from] L1InfoDecodeError),
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, b256};

    use super::*;
    use crate::test_utils::{deposit_tx, payload_with};

    fn genesis() -> ChainGenesis {
        ChainGenesis {
            l1: BlockNumHash { hash: B256::from([0xaa; 32]), number: 100 },
            l2: BlockNumHash { hash: B256::from([0xbb; 32]), number: 0 },
            l2_time: 0,
        }
    }

    #[test]
    fn test_block_info_display() {
        let hash = B256::from([1; 32]);
        let parent_hash = B256::from([2; 32]);
        let block_info = BlockInfo::new(hash, 1, parent_hash, 1);
        assert_eq!(
            block_info.to_string(),
            "BlockInfo { hash: 0x0101010101010101010101010101010101010101010101010101010101010101, number: 1, parent_hash: 0x0202020202020202020202020202020202020202020202020202020202020202, timestamp: 1 }"
        );
    }

    #[test]
    fn test_is_parent_of() {
        let parent = BlockInfo::new(B256::from([1u8; 32]), 10, B256::ZERO, 1000);
        let child = BlockInfo::new(B256::from([2u8; 32]), 11, parent.hash, 1010);
        let unrelated = BlockInfo::new(B256::from([3u8; 32]), 12, B256::from([9u8; 32]), 1020);

        assert!(parent.is_parent_of(&child));
        assert!(!child.is_parent_of(&parent));
        assert!(!parent.is_parent_of(&unrelated));
    }

    #[test]
    fn test_is_parent_of_at_max_height() {
        let tip = BlockInfo::new(B256::from([1u8; 32]), u64::MAX, B256::ZERO, 1000);
        let wrapped = BlockInfo::new(B256::from([2u8; 32]), 0, tip.hash, 1010);

        assert!(!tip.is_parent_of(&wrapped));
        assert!(!tip.is_parent_of(&tip));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_deserialize_l2_block_info() {
        let l2_block_info = L2BlockInfo {
            block_info: BlockInfo {
                hash: B256::from([1; 32]),
                number: 1,
                parent_hash: B256::from([2; 32]),
                timestamp: 1,
            },
            l1_origin: BlockNumHash { hash: B256::from([3; 32]), number: 2 },
            seq_num: 3,
        };

        let json = r#"{
            "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "number": 1,
            "parentHash": "0x0202020202020202020202020202020202020202020202020202020202020202",
            "timestamp": 1,
            "l1origin": {
                "hash": "0x0303030303030303030303030303030303030303030303030303030303030303",
                "number": 2
            },
            "sequenceNumber": 3
        }"#;

        let deserialized: L2BlockInfo = serde_json::from_str(json).unwrap();
        assert_eq!(deserialized, l2_block_info);
    }

    #[test]
    fn test_from_payload_genesis_block() {
        let genesis = genesis();
        let payload = payload_with(0, genesis.l2.hash, B256::ZERO, 0, vec![]);
        let info = L2BlockInfo::from_payload_and_genesis(&payload, &genesis).unwrap();
        assert_eq!(info.l1_origin, genesis.l1);
        assert_eq!(info.seq_num, 0);
    }

    #[test]
    fn test_from_payload_genesis_hash_mismatch() {
        let genesis = genesis();
        let payload = payload_with(0, B256::from([0xcc; 32]), B256::ZERO, 0, vec![]);
        assert_eq!(
            L2BlockInfo::from_payload_and_genesis(&payload, &genesis),
            Err(FromPayloadError::InvalidGenesisHash)
        );
    }

    #[test]
    fn test_from_payload_decodes_l1_origin() {
        let l1_hash = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        let info = L1BlockInfoTx {
            format: crate::L1InfoFormat::Ecotone,
            number: 120,
            time: 1_000,
            block_hash: l1_hash,
            sequence_number: 4,
        };
        let payload = payload_with(
            7,
            B256::from([7; 32]),
            B256::from([6; 32]),
            14,
            vec![deposit_tx(&info.encode_calldata())],
        );

        let block = L2BlockInfo::from_payload_and_genesis(&payload, &genesis()).unwrap();
        assert_eq!(block.block_info.number, 7);
        assert_eq!(block.block_info.parent_hash, B256::from([6; 32]));
        assert_eq!(block.l1_origin, BlockNumHash { number: 120, hash: l1_hash });
        assert_eq!(block.seq_num, 4);
    }

    #[test]
    fn test_from_payload_rejects_missing_or_non_deposit_first_tx() {
        let genesis = genesis();
        let hash = B256::from([7; 32]);
        let empty = payload_with(7, hash, B256::ZERO, 14, vec![]);
        assert_eq!(
            L2BlockInfo::from_payload_and_genesis(&empty, &genesis),
            Err(FromPayloadError::MissingL1InfoDeposit(hash))
        );

        let user_tx = payload_with(7, hash, B256::ZERO, 14, vec![Bytes::from_static(&[0x02, 0xc0])]);
        assert_eq!(
            L2BlockInfo::from_payload_and_genesis(&user_tx, &genesis),
            Err(FromPayloadError::FirstTxNonDeposit(0x02))
        );
    }
}
