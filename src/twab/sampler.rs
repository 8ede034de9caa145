use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::trace;

use crate::{
    accounts::Account,
    days::DayMarker,
    execution_chain::{balance_at, locate_block, FetchError, LocateError, Provider, RetryPolicy},
    units::BaseUnits,
};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to locate end of day block for {day}")]
    Locate {
        day: NaiveDate,
        #[source]
        source: LocateError,
    },
    #[error("failed to fetch end of day balance for {day}")]
    Fetch {
        day: NaiveDate,
        #[source]
        source: FetchError,
    },
}

/// Balance of `account` as of the last block of `day`, in whole units.
pub async fn sample_day(
    provider: &Provider,
    account: &Account,
    day: DayMarker,
    units: &BaseUnits,
    policy: &RetryPolicy,
) -> Result<Decimal, SampleError> {
    let block_number = locate_block(provider, day.end_of_day_timestamp(), policy)
        .await
        .map_err(|source| SampleError::Locate {
            day: day.date,
            source,
        })?;

    let balance = balance_at(provider, account, block_number, units, policy)
        .await
        .map_err(|source| SampleError::Fetch {
            day: day.date,
            source,
        })?;

    trace!(%account, day = %day.date, block_number, %balance, "sampled day");

    Ok(balance)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        execution_chain::{FakeExecutionNode, NamedProvider},
        units::WeiNewtype,
    };

    const ACCOUNT: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn samples_last_block_of_day_test() {
        let first_day = date("2024-01-01");
        let node = FakeExecutionNode::daily(first_day, 3, 24)
            .with_balance(|_, block_number| WeiNewtype(u128::from(block_number)));
        let provider = Provider::new(NamedProvider::new("fake", Arc::new(node)));
        let account: Account = ACCOUNT.parse().unwrap();

        let balance = sample_day(
            &provider,
            &account,
            DayMarker::new(date("2024-01-02")),
            &BaseUnits::new(0).unwrap(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        // The chain starts the day before first_day, 24 blocks a day. The last block of the
        // second day is block 3 * 24 - 1.
        assert_eq!(balance, Decimal::from(71));
    }

    #[tokio::test]
    async fn day_before_chain_fails_test() {
        let first_day = date("2024-01-01");
        let node = FakeExecutionNode::daily(first_day, 3, 24);
        let provider = Provider::new(NamedProvider::new("fake", Arc::new(node)));
        let account: Account = ACCOUNT.parse().unwrap();

        let result = sample_day(
            &provider,
            &account,
            DayMarker::new(date("2023-12-01")),
            &BaseUnits::default(),
            &RetryPolicy::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(SampleError::Locate {
                source: LocateError::BeforeGenesis { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failing_balance_read_test() {
        let first_day = date("2024-01-01");
        let node = FakeExecutionNode::daily(first_day, 3, 24).failing_balance_on(first_day);
        let provider = Provider::new(NamedProvider::new("fake", Arc::new(node)));
        let account: Account = ACCOUNT.parse().unwrap();

        let result = sample_day(
            &provider,
            &account,
            DayMarker::new(first_day),
            &BaseUnits::default(),
            &RetryPolicy::default(),
        )
        .await;

        assert!(matches!(result, Err(SampleError::Fetch { day, .. }) if day == first_day));
    }
}
