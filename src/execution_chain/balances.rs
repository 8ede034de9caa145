use rust_decimal::Decimal;
use thiserror::Error;
use tracing::trace;

use crate::{
    accounts::Account,
    units::{BaseUnits, ConversionError},
};

use super::{
    provider_pool::Provider,
    retry::{with_rate_limit_retry, RetryError, RetryPolicy},
    BlockNumber, ProviderError,
};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("balance of {account} at block {block_number} still rate limited after {attempts} attempts")]
    FetchExhausted {
        account: Account,
        block_number: BlockNumber,
        attempts: u32,
        #[source]
        last: ProviderError,
    },
    #[error("failed to fetch balance of {account} at block {block_number}")]
    Provider {
        account: Account,
        block_number: BlockNumber,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Native balance of `account` as of `block_number`, in whole units.
pub async fn balance_at(
    provider: &Provider,
    account: &Account,
    block_number: BlockNumber,
    units: &BaseUnits,
    policy: &RetryPolicy,
) -> Result<Decimal, FetchError> {
    let node = provider.node();
    let balance = with_rate_limit_retry(policy, "eth_getBalance", move || {
        node.get_balance(account, block_number)
    })
    .await
    .map_err(|err| match err {
        RetryError::Exhausted { attempts, last } => FetchError::FetchExhausted {
            account: *account,
            block_number,
            attempts,
            last,
        },
        RetryError::Provider(source) => FetchError::Provider {
            account: *account,
            block_number,
            source,
        },
    })?;

    trace!(%account, block_number, %balance, provider = provider.name(), "fetched balance");

    Ok(units.to_whole_units(balance)?)
}
