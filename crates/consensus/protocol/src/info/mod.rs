//! Decoding of the L1 info deposit calldata that opens every non-genesis L2 block.

use alloy_eips::BlockNumHash;
use alloy_primitives::{B256, Bytes};

/// The calldata layout of an L1 info deposit, one per protocol revision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum L1InfoFormat {
    /// ABI-encoded `setL1BlockValues`.
    Bedrock,
    /// Packed `setL1BlockValuesEcotone`.
    Ecotone,
    /// Packed `setL1BlockValuesIsthmus`.
    Isthmus,
    /// Packed `setL1BlockValuesJovian`.
    Jovian,
}

impl L1InfoFormat {
    /// Returns the function selector of the format.
    pub const fn selector(&self) -> [u8; 4] {
        match self {
            Self::Bedrock => [0x01, 0x5d, 0x8e, 0xb9],
            Self::Ecotone => [0x44, 0x0a, 0x5e, 0x20],
            Self::Isthmus => [0x09, 0x89, 0x99, 0xbe],
            Self::Jovian => [0x3d, 0xb6, 0xbe, 0x2b],
        }
    }

    /// Returns the exact calldata length of the format, selector included.
    pub const fn calldata_len(&self) -> usize {
        match self {
            Self::Bedrock => 4 + 32 * 8,
            Self::Ecotone => 164,
            Self::Isthmus => 176,
            Self::Jovian => 178,
        }
    }

    fn from_selector(selector: &[u8]) -> Option<Self> {
        [Self::Bedrock, Self::Ecotone, Self::Isthmus, Self::Jovian]
            .into_iter()
            .find(|format| format.selector() == selector)
    }
}

/// An error raised while decoding L1 info calldata.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum L1InfoDecodeError {
    /// The calldata is shorter than a selector.
    #[error("L1 info calldata too short: {0} bytes")]
    TooShort(usize),
    /// The selector does not match any known format.
    #[error("unknown L1 info selector: {0:?}")]
    UnknownSelector([u8; 4]),
    /// The calldata length does not match the selected format.
    #[error("invalid {format:?} L1 info length: expected {expected}, got {actual}")]
    InvalidLength {
        /// The detected format.
        format: L1InfoFormat,
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
    },
}

/// The L1 block attributes carried by the L1 info deposit.
///
/// Only the fields consumed when rebuilding an L2 block reference are retained;
/// fee parameters are skipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct L1BlockInfoTx {
    /// The calldata layout the values were decoded from.
    pub format: L1InfoFormat,
    /// The L1 origin block number.
    pub number: u64,
    /// The L1 origin timestamp.
    pub time: u64,
    /// The L1 origin block hash.
    pub block_hash: B256,
    /// The sequence number of the L2 block within its epoch.
    pub sequence_number: u64,
}

impl L1BlockInfoTx {
    /// Returns the L1 origin block id.
    pub const fn id(&self) -> BlockNumHash {
        BlockNumHash { number: self.number, hash: self.block_hash }
    }

    /// Decodes the L1 info values from deposit calldata.
    pub fn decode_calldata(data: &[u8]) -> Result<Self, L1InfoDecodeError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(L1InfoDecodeError::TooShort(data.len()))?;
        let format = L1InfoFormat::from_selector(&selector)
            .ok_or(L1InfoDecodeError::UnknownSelector(selector))?;
        if data.len() != format.calldata_len() {
            return Err(L1InfoDecodeError::InvalidLength {
                format,
                expected: format.calldata_len(),
                actual: data.len(),
            });
        }

        let info = match format {
            L1InfoFormat::Bedrock => Self {
                format,
                number: read_u64(data, 28),
                time: read_u64(data, 60),
                block_hash: B256::from_slice(&data[100..132]),
                sequence_number: read_u64(data, 156),
            },
            _ => Self {
                format,
                sequence_number: read_u64(data, 12),
                time: read_u64(data, 20),
                number: read_u64(data, 28),
                block_hash: B256::from_slice(&data[100..132]),
            },
        };
        Ok(info)
    }

    /// Encodes the retained values into calldata of the configured format.
    ///
    /// Fields that are not retained are encoded as zero.
    pub fn encode_calldata(&self) -> Bytes {
        let mut data = vec![0u8; self.format.calldata_len()];
        data[..4].copy_from_slice(&self.format.selector());
        match self.format {
            L1InfoFormat::Bedrock => {
                data[28..36].copy_from_slice(&self.number.to_be_bytes());
                data[60..68].copy_from_slice(&self.time.to_be_bytes());
                data[156..164].copy_from_slice(&self.sequence_number.to_be_bytes());
            }
            _ => {
                data[12..20].copy_from_slice(&self.sequence_number.to_be_bytes());
                data[20..28].copy_from_slice(&self.time.to_be_bytes());
                data[28..36].copy_from_slice(&self.number.to_be_bytes());
            }
        }
        data[100..132].copy_from_slice(self.block_hash.as_slice());
        data.into()
    }
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(word)
}
