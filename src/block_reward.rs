//! Resolves the block reward paid out by a block's coinbase transaction.
//!
//! The first transaction of a block is always the coinbase, so the reward is the sum of
//! that transaction's output values. A zero reward is a valid-looking but wrong economic
//! signal, so any failure to resolve the coinbase short-circuits instead of defaulting.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::explorer_api::{BlockRef, ExplorerApi, ExplorerError};

#[derive(Clone, Debug, PartialEq)]
pub struct RewardEstimate {
    pub block: BlockRef,
    pub total_value: Decimal,
}

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("block {hash} reports no transactions, coinbase is missing")]
    NoTransactions { hash: String },
    #[error("coinbase transaction {txid} of block {hash} could not be resolved")]
    CoinbaseUnavailable {
        hash: String,
        txid: String,
        #[source]
        source: ExplorerError,
    },
    #[error(transparent)]
    Explorer(#[from] ExplorerError),
}

pub async fn resolve_reward(
    api: &impl ExplorerApi,
    block: &BlockRef,
) -> Result<RewardEstimate, RewardError> {
    let body = api.block_body(&block.hash).await?;

    let coinbase_txid = body.tx.first().ok_or_else(|| RewardError::NoTransactions {
        hash: block.hash.clone(),
    })?;

    let coinbase = api.raw_transaction(coinbase_txid).await.map_err(|source| {
        RewardError::CoinbaseUnavailable {
            hash: block.hash.clone(),
            txid: coinbase_txid.clone(),
            source,
        }
    })?;

    // Outputs without a value contribute nothing.
    let total_value: Decimal = coinbase.vout.iter().filter_map(|out| out.value).sum();

    debug!(height = block.height, %total_value, "resolved coinbase reward");

    Ok(RewardEstimate {
        block: block.clone(),
        total_value,
    })
}
