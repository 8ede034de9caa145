//! Maps a unix timestamp to a block number by bisecting over block timestamps.
//!
//! The search keeps the convergence behaviour of a plain bisection over sorted keys: when no
//! block carries exactly the target timestamp the result is the bound the loop last held,
//! which is the latest block before the target. This is not a nearest-block search.

use std::cmp::Ordering;

use thiserror::Error;
use tracing::trace;

use super::{
    provider_pool::Provider,
    retry::{with_rate_limit_retry, RetryError, RetryPolicy},
    BlockNumber,
};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("timestamp {target} is before the first block")]
    BeforeGenesis { target: i64 },
    #[error("failed to read chain head")]
    Head(#[source] RetryError),
    #[error("failed to read timestamp of block {block_number}")]
    Timestamp {
        block_number: BlockNumber,
        #[source]
        source: RetryError,
    },
}

async fn block_timestamp(
    provider: &Provider,
    block_number: BlockNumber,
    policy: &RetryPolicy,
) -> Result<i64, LocateError> {
    if let Some(timestamp) = provider.cached_block_timestamp(block_number) {
        return Ok(timestamp);
    }

    let node = provider.node();
    let timestamp = with_rate_limit_retry(policy, "eth_getBlockByNumber", move || {
        node.get_block_timestamp(block_number)
    })
    .await
    .map_err(|source| LocateError::Timestamp {
        block_number,
        source,
    })?;

    provider.cache_block_timestamp(block_number, timestamp);
    Ok(timestamp)
}

/// Finds the block with exactly `target` as its timestamp, or failing that the latest block
/// before it. The head is read fresh on every call as new blocks keep arriving.
pub async fn locate_block(
    provider: &Provider,
    target: i64,
    policy: &RetryPolicy,
) -> Result<BlockNumber, LocateError> {
    if let Some(block_number) = provider.cached_located_block(target) {
        return Ok(block_number);
    }

    let node = provider.node();
    let head = with_rate_limit_retry(policy, "eth_blockNumber", move || node.get_block_number())
        .await
        .map_err(LocateError::Head)?;

    // Signed bounds, `high` drops to -1 when the target precedes the first block.
    let mut low: i64 = 0;
    let mut high: i64 = head as i64;

    while low <= high {
        let mid = (low + high) / 2;
        let mid_timestamp = block_timestamp(provider, mid as BlockNumber, policy).await?;
        trace!(low, high, mid, mid_timestamp, target, "bisecting");

        match mid_timestamp.cmp(&target) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid - 1,
            Ordering::Equal => {
                let block_number = mid as BlockNumber;
                if block_number < head {
                    provider.cache_located_block(target, block_number);
                }
                return Ok(block_number);
            }
        }
    }

    let found = if low <= high { low } else { high };
    if found < 0 {
        return Err(LocateError::BeforeGenesis { target });
    }

    let block_number = found as BlockNumber;
    // A result at the head may move once later blocks arrive, only results below it are final.
    if block_number < head {
        provider.cache_located_block(target, block_number);
    }

    Ok(block_number)
}
