//! Contains the forkchoice state for the L2.

use std::fmt::Display;

use alloy_eips::BlockNumberOrTag;
use rollup_genesis::RollupConfig;
use rollup_protocol::L2BlockInfo;

use crate::{EngineClient, EngineClientError, SyncStartError};

/// An unsafe, safe, and finalized [`L2BlockInfo`] as held by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2ForkchoiceState {
    /// The unsafe L2 block.
    pub un_safe: L2BlockInfo,
    /// The safe L2 block.
    pub safe: L2BlockInfo,
    /// The finalized L2 block.
    pub finalized: L2BlockInfo,
}

impl Display for L2ForkchoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FINALIZED: {} (#{}) | SAFE: {} (#{}) | UNSAFE: {} (#{})",
            self.finalized.block_info.hash,
            self.finalized.block_info.number,
            self.safe.block_info.hash,
            self.safe.block_info.number,
            self.un_safe.block_info.hash,
            self.un_safe.block_info.number,
        )
    }
}

impl L2ForkchoiceState {
    /// Fetches the current forkchoice state of the L2 execution layer.
    ///
    /// - The finalized block may not always be available. If it is not, we fall back to genesis.
    /// - The safe block may not always be available. If it is not, we fall back to the finalized
    ///   block.
    /// - The unsafe block is always assumed to be available.
    pub async fn current<C: EngineClient + ?Sized>(
        cfg: &RollupConfig,
        engine_client: &C,
    ) -> Result<Self, SyncStartError> {
        let finalized = match block_ref_compat(engine_client, BlockNumberOrTag::Finalized).await? {
            Some(block) => block,
            None => {
                let genesis = BlockNumberOrTag::Number(cfg.genesis.l2.number);
                engine_client
                    .l2_block_ref_by_label(genesis)
                    .await?
                    .ok_or(SyncStartError::BlockNotFound(genesis))?
            }
        };
        let safe =
            block_ref_compat(engine_client, BlockNumberOrTag::Safe).await?.unwrap_or(finalized);
        let un_safe = block_ref_compat(engine_client, BlockNumberOrTag::Latest)
            .await?
            .ok_or(SyncStartError::BlockNotFound(BlockNumberOrTag::Latest))?;

        Ok(Self { un_safe, safe, finalized })
    }
}

/// Wrapper around [`EngineClient::l2_block_ref_by_label`] to handle compatibility issues with geth
/// and erigon. When serving a block-by-label request, these clients return non-standard errors for
/// the safe and finalized heads when the chain has just started and nothing is marked as safe or
/// finalized yet.
pub(crate) async fn block_ref_compat<C: EngineClient + ?Sized>(
    engine_client: &C,
    label: BlockNumberOrTag,
) -> Result<Option<L2BlockInfo>, EngineClientError> {
    match engine_client.l2_block_ref_by_label(label).await {
        Err(e) => {
            let err_str = e.to_string();
            if err_str.contains("block not found") || err_str.contains("Unknown block") {
                Ok(None)
            } else {
                Err(e)
            }
        }
        r => r,
    }
}
