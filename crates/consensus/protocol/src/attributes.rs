//! Payload attributes handed to the execution engine when starting a block build.

use alloy_primitives::Bytes;
use alloy_rpc_types_engine::PayloadAttributes;

use crate::{BlockInfo, L2BlockInfo, is_deposit};

/// Rollup payload attributes: the L1 engine API attributes plus the forced
/// transaction list and rollup-specific build controls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RollupPayloadAttributes {
    /// The payload attributes.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub payload_attributes: PayloadAttributes,
    /// Transactions to force into the block, always at the start of the transactions list.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub transactions: Option<Vec<Bytes>>,
    /// Whether to build the block without transactions from the tx pool.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub no_tx_pool: Option<bool>,
    /// The gas limit of the block.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none", with = "alloy_serde::quantity::opt")
    )]
    pub gas_limit: Option<u64>,
}

impl RollupPayloadAttributes {
    /// Returns the forced transactions, or an empty slice.
    pub fn transactions(&self) -> &[Bytes] {
        self.transactions.as_deref().unwrap_or_default()
    }

    /// Returns true if every forced transaction is a deposit and the tx pool is excluded.
    pub fn is_deposits_only(&self) -> bool {
        self.transactions().iter().all(|tx| is_deposit(tx)) && self.no_tx_pool.unwrap_or(false)
    }

    /// Returns a copy of the attributes restricted to the deposit transactions,
    /// with the tx pool excluded.
    pub fn as_deposits_only(&self) -> Self {
        Self {
            transactions: Some(
                self.transactions().iter().filter(|tx| is_deposit(tx)).cloned().collect(),
            ),
            no_tx_pool: Some(true),
            ..self.clone()
        }
    }
}

/// Payload attributes, the L2 block they build on, and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributesWithParent {
    /// The payload attributes.
    pub attributes: RollupPayloadAttributes,
    /// The parent block reference.
    pub parent: L2BlockInfo,
    /// The L1 block the attributes were derived from.
    ///
    /// `None` for locally sequenced blocks.
    pub derived_from: Option<BlockInfo>,
    /// Whether the attributes conclude the current span batch, so the resulting
    /// block may become local-safe.
    pub is_last_in_span: bool,
}

impl AttributesWithParent {
    /// Create a new [`AttributesWithParent`] instance.
    pub const fn new(
        attributes: RollupPayloadAttributes,
        parent: L2BlockInfo,
        derived_from: Option<BlockInfo>,
        is_last_in_span: bool,
    ) -> Self {
        Self { attributes, parent, derived_from, is_last_in_span }
    }

    /// Returns the L2 block number for the payload attributes.
    pub const fn block_number(&self) -> u64 {
        self.parent.block_info.number + 1
    }

    /// Returns true if the attributes only carry deposits.
    pub fn is_deposits_only(&self) -> bool {
        self.attributes.is_deposits_only()
    }

    /// Returns a copy restricted to deposit transactions.
    pub fn as_deposits_only(&self) -> Self {
        Self { attributes: self.attributes.as_deposits_only(), ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::deposit_tx;

    fn user_tx() -> Bytes {
        Bytes::from_static(&[0x02, 0xc0])
    }

    #[test]
    fn test_is_deposits_only() {
        let mut attributes = RollupPayloadAttributes {
            transactions: Some(vec![deposit_tx(&[1]), deposit_tx(&[2])]),
            no_tx_pool: Some(true),
            ..Default::default()
        };
        assert!(attributes.is_deposits_only());

        attributes.no_tx_pool = Some(false);
        assert!(!attributes.is_deposits_only());

        attributes.no_tx_pool = Some(true);
        attributes.transactions.as_mut().unwrap().push(user_tx());
        assert!(!attributes.is_deposits_only());
    }

    #[test]
    fn test_as_deposits_only_drops_user_transactions() {
        let deposit = deposit_tx(&[1]);
        let with_parent = AttributesWithParent::new(
            RollupPayloadAttributes {
                transactions: Some(vec![deposit.clone(), user_tx()]),
                no_tx_pool: Some(false),
                gas_limit: Some(30_000_000),
                ..Default::default()
            },
            L2BlockInfo::default(),
            Some(BlockInfo::default()),
            true,
        );

        let deposits_only = with_parent.as_deposits_only();
        assert!(deposits_only.is_deposits_only());
        assert_eq!(deposits_only.attributes.transactions, Some(vec![deposit]));
        assert_eq!(deposits_only.attributes.gas_limit, Some(30_000_000));
        assert!(deposits_only.is_last_in_span);
        assert_eq!(deposits_only.block_number(), 1);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_attributes_serde_flattens_engine_fields() {
        let attributes = RollupPayloadAttributes {
            payload_attributes: PayloadAttributes { timestamp: 0x10, ..Default::default() },
            transactions: Some(vec![deposit_tx(&[1])]),
            no_tx_pool: Some(true),
            gas_limit: Some(0x1c9c380),
        };
        let json = serde_json::to_value(&attributes).unwrap();
        assert_eq!(json["timestamp"], "0x10");
        assert_eq!(json["noTxPool"], true);
        assert_eq!(json["gasLimit"], "0x1c9c380");

        let back: RollupPayloadAttributes = serde_json::from_value(json).unwrap();
        assert_eq!(back, attributes);
    }
}
