//! Time weighted average balances. Samples every account's balance at the end of each day in a
//! range, averages over the range and prices the average.

mod aggregate;
mod cache;
mod report;
mod sampler;
mod scheduler;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    accounts::read_accounts,
    days::DateRange,
    execution_chain::{NamedProvider, ProviderPool, RetryPolicy},
    units::BaseUnits,
};

pub use aggregate::{twab, AggregateError};
pub use cache::{
    plan_account, AccountPlan, BalanceCache, CacheEntries, CacheEntry, CacheError, CacheStore,
    JsonFileCacheStore, MockCacheStore,
};
pub use report::{write_report, ReportError, TwabRow};
pub use sampler::{sample_day, SampleError};
pub use scheduler::schedule;

/// What every worker needs to turn an account into a TWAB, fixed for the length of a run.
#[derive(Clone, Debug)]
pub struct SamplingPlan {
    pub range: DateRange,
    pub price: Decimal,
    pub units: BaseUnits,
    /// Days of one account sampled at the same time.
    pub day_concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub accounts_path: PathBuf,
    pub results_path: PathBuf,
    pub workers_per_provider: usize,
    pub sampling: SamplingPlan,
}

/// Runs the whole pipeline: check every provider is up, read the accounts, resume from the
/// cache, sample what is missing, save the cache, and finally write the report.
pub async fn run(
    config: RunConfig,
    nodes: Vec<NamedProvider>,
    cache_store: &impl CacheStore,
) -> anyhow::Result<Vec<TwabRow>> {
    let pool = ProviderPool::connect(nodes).await?;

    let accounts = read_accounts(&config.accounts_path)?;
    let entries = cache_store.load().context("loading balance cache")?;

    let sampling = config.sampling;
    info!(
        accounts = accounts.len(),
        start = %sampling.range.start(),
        end = %sampling.range.end(),
        days = sampling.range.day_count(),
        price = %sampling.price,
        "computing twab"
    );

    let cache = Arc::new(BalanceCache::new(entries));
    let results = schedule(
        &pool,
        &accounts,
        cache.clone(),
        Arc::new(sampling),
        config.workers_per_provider,
    )
    .await;

    cache_store
        .save(&cache.snapshot())
        .context("saving balance cache")?;

    let rows: Vec<TwabRow> = accounts
        .into_iter()
        .zip(results)
        .enumerate()
        .map(|(index, (account, twab))| TwabRow {
            index: index + 1,
            account,
            twab,
        })
        .collect();

    write_report(&config.results_path, &rows)?;

    let failed = rows.iter().filter(|row| row.twab.is_none()).count();
    info!(
        accounts = rows.len(),
        failed,
        report = %config.results_path.display(),
        "done computing twab"
    );

    Ok(rows)
}
