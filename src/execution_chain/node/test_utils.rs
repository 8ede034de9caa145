use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, NaiveDate};

use crate::days::DayMarker;

use super::*;

type BalanceFn = Box<dyn Fn(&Account, BlockNumber, i64) -> WeiNewtype + Send + Sync>;

/// An in-memory chain with a fixed block number to timestamp mapping. Counts the calls made
/// against it so tests can check what was, and was not, fetched.
pub struct FakeExecutionNode {
    timestamps: Vec<i64>,
    balance_of: BalanceFn,
    reachable: bool,
    failing_days: HashSet<NaiveDate>,
    balance_calls: AtomicUsize,
    timestamp_calls: AtomicUsize,
    head_calls: AtomicUsize,
}

impl FakeExecutionNode {
    /// Block `n` has timestamp `timestamps[n]`, timestamps must be ascending.
    pub fn with_timestamps(timestamps: Vec<i64>) -> Self {
        Self {
            timestamps,
            balance_of: Box::new(|_, _, _| WeiNewtype(0)),
            reachable: true,
            failing_days: HashSet::new(),
            balance_calls: AtomicUsize::new(0),
            timestamp_calls: AtomicUsize::new(0),
            head_calls: AtomicUsize::new(0),
        }
    }

    /// A chain producing `blocks_per_day` evenly spaced blocks, starting the day before
    /// `first_day` and running until the day after the last of `days`. No block lands exactly
    /// on a day boundary.
    pub fn daily(first_day: NaiveDate, days: u32, blocks_per_day: u32) -> Self {
        let interval = 86_400 / i64::from(blocks_per_day);
        let genesis_timestamp = DayMarker::new(first_day).start_timestamp() - 86_400 + 7;
        let block_count = i64::from((days + 2) * blocks_per_day);
        let timestamps = (0..block_count)
            .map(|number| genesis_timestamp + number * interval)
            .collect();
        Self::with_timestamps(timestamps)
    }

    pub fn with_balance(
        mut self,
        balance_of: impl Fn(&Account, BlockNumber) -> WeiNewtype + Send + Sync + 'static,
    ) -> Self {
        self.balance_of = Box::new(move |account, number, _| balance_of(account, number));
        self
    }

    /// Every account holds `balances[i]` throughout the i-th day after `first_day`, and zero
    /// outside the listed days.
    pub fn with_daily_balances(mut self, first_day: NaiveDate, balances: Vec<u128>) -> Self {
        let first_day_start = DayMarker::new(first_day).start_timestamp();
        self.balance_of = Box::new(move |_, _, timestamp| {
            let day_index = (timestamp - first_day_start).div_euclid(86_400);
            usize::try_from(day_index)
                .ok()
                .and_then(|index| balances.get(index))
                .map_or(WeiNewtype(0), |balance| WeiNewtype(*balance))
        });
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Balance reads at blocks within `day` fail with a non rate limit error.
    pub fn failing_balance_on(mut self, day: NaiveDate) -> Self {
        self.failing_days.insert(day);
        self
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    fn timestamp_of(&self, block_number: BlockNumber) -> Result<i64, ProviderError> {
        usize::try_from(block_number)
            .ok()
            .and_then(|index| self.timestamps.get(index))
            .copied()
            .ok_or_else(|| ProviderError::Rpc {
                code: -32000,
                message: format!("block {block_number} not found"),
            })
    }
}

#[async_trait]
impl ExecutionProvider for FakeExecutionNode {
    async fn is_reachable(&self) -> bool {
        self.reachable
    }

    async fn get_block_number(&self) -> Result<BlockNumber, ProviderError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.timestamps.len() as BlockNumber - 1)
    }

    async fn get_block_timestamp(&self, block_number: BlockNumber) -> Result<i64, ProviderError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        self.timestamp_of(block_number)
    }

    async fn get_balance(
        &self,
        account: &Account,
        block_number: BlockNumber,
    ) -> Result<WeiNewtype, ProviderError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let timestamp = self.timestamp_of(block_number)?;
        let day = DateTime::from_timestamp(timestamp, 0)
            .map(|date_time| date_time.date_naive())
            .expect("fake chain timestamps to be valid dates");
        if self.failing_days.contains(&day) {
            return Err(ProviderError::Rpc {
                code: -32000,
                message: format!("missing trie node for block {block_number}"),
            });
        }
        Ok((self.balance_of)(account, block_number, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn daily_chain_has_no_block_on_day_boundaries_test() {
        let first_day: NaiveDate = "2024-01-01".parse().unwrap();
        let node = FakeExecutionNode::daily(first_day, 3, 24);
        let head = node.get_block_number().await.unwrap();
        assert_eq!(head, 5 * 24 - 1);

        for number in 0..=head {
            let timestamp = node.get_block_timestamp(number).await.unwrap();
            assert_ne!(timestamp.rem_euclid(86_400), 0);
            assert_ne!(timestamp.rem_euclid(86_400), 86_399);
        }
    }
}
