//! Wallet Scheduler
//! ================
//! Accounts go into one shared queue. A fixed set of workers, each bound to a single provider
//! for its whole life, pull accounts until the queue runs dry. For every account a worker
//! samples the missing days with bounded concurrency against its own provider, so one
//! account's timeline is never split over nodes that may disagree about the chain.
//!
//! Each queued account carries its own reply channel. Results are collected by awaiting the
//! receivers in input order; an account that failed, or whose worker died, reads as `None`.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use futures::{future::join_all, stream, StreamExt};
use pit_wall::Progress;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    accounts::Account,
    execution_chain::{Provider, ProviderPool},
};

use super::{
    aggregate::{twab, AggregateError},
    cache::{plan_account, AccountPlan, BalanceCache, CacheEntry},
    sampler::{sample_day, SampleError},
    SamplingPlan,
};

#[derive(Debug, Error)]
enum AccountError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error("sum of daily balances overflows")]
    Overflow,
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

struct QueuedAccount {
    index: usize,
    account: Account,
    reply: oneshot::Sender<Option<Decimal>>,
}

type AccountQueue = Mutex<VecDeque<QueuedAccount>>;

/// Sum of end of day balances over the whole range, sampling only what the cache lacks. The
/// cache entry is replaced only once every missing day has been sampled.
async fn cumulative_balance(
    provider: &Provider,
    account: &Account,
    cache: &BalanceCache,
    plan: &SamplingPlan,
) -> Result<Decimal, AccountError> {
    let entry = cache.get(account);
    let (prior, days) = match plan_account(account, entry.as_ref(), &plan.range) {
        AccountPlan::Cached(cumulative) => {
            debug!(%account, %cumulative, "using cached balance sum");
            return Ok(cumulative);
        }
        AccountPlan::Sample { prior, days } => (prior, days),
    };

    debug!(%account, days = days.len(), %prior, provider = provider.name(), "sampling account");

    let mut progress = Progress::new("sample-account-days", days.len() as u64);
    let mut samples = stream::iter(days)
        .map(|day| sample_day(provider, account, day, &plan.units, &plan.retry))
        .buffer_unordered(plan.day_concurrency);

    // Bails on the first failed day, dropping the samples still in flight.
    let mut cumulative = prior;
    while let Some(balance) = samples.next().await {
        cumulative = cumulative
            .checked_add(balance?)
            .ok_or(AccountError::Overflow)?;
        progress.inc_work_done();
        debug!(%account, "{}", progress.get_progress_string());
    }

    cache.checkpoint(
        *account,
        CacheEntry {
            cumulative_balance: cumulative,
            last_checked: plan.range.end(),
            first_day: Some(plan.range.start()),
        },
    );

    Ok(cumulative)
}

async fn process_account(
    provider: &Provider,
    account: &Account,
    cache: &BalanceCache,
    plan: &SamplingPlan,
) -> Result<Decimal, AccountError> {
    let cumulative = cumulative_balance(provider, account, cache, plan).await?;
    let twab = twab(cumulative, plan.range.day_count(), plan.price)?;
    Ok(twab)
}

async fn run_worker(
    worker_index: usize,
    provider: Arc<Provider>,
    queue: Arc<AccountQueue>,
    cache: Arc<BalanceCache>,
    plan: Arc<SamplingPlan>,
) {
    debug!(worker_index, provider = provider.name(), "worker started");

    loop {
        // Take the lock in its own statement, the guard must not live across an await.
        let next = queue.lock().unwrap().pop_front();
        let Some(QueuedAccount {
            index,
            account,
            reply,
        }) = next
        else {
            break;
        };

        let result = match process_account(&provider, &account, &cache, &plan).await {
            Ok(twab) => {
                info!(index, %account, %twab, "computed twab");
                Some(twab)
            }
            Err(err) => {
                error!(index, %account, provider = provider.name(), "skipping account: {:#}", anyhow::Error::new(err));
                None
            }
        };

        // The receiver only goes away if the run itself was dropped.
        let _ = reply.send(result);
    }

    debug!(worker_index, "worker done, queue empty");
}

/// Computes the TWAB of every account, returned in the order of `accounts`.
pub async fn schedule(
    pool: &ProviderPool,
    accounts: &[Account],
    cache: Arc<BalanceCache>,
    plan: Arc<SamplingPlan>,
    workers_per_provider: usize,
) -> Vec<Option<Decimal>> {
    let mut receivers = Vec::with_capacity(accounts.len());
    let mut queue = VecDeque::with_capacity(accounts.len());
    for (index, account) in accounts.iter().enumerate() {
        let (reply, receiver) = oneshot::channel();
        queue.push_back(QueuedAccount {
            index: index + 1,
            account: *account,
            reply,
        });
        receivers.push(receiver);
    }
    let queue = Arc::new(Mutex::new(queue));

    // No point in starting workers that would find the queue empty.
    let worker_count = (pool.len() * workers_per_provider).min(accounts.len());
    info!(
        accounts = accounts.len(),
        providers = pool.len(),
        workers = worker_count,
        "scheduling accounts"
    );

    let workers = (0..worker_count).map(|worker_index| {
        tokio::spawn(run_worker(
            worker_index,
            pool.assign(worker_index),
            queue.clone(),
            cache.clone(),
            plan.clone(),
        ))
    });

    for result in join_all(workers).await {
        if let Err(err) = result {
            warn!(%err, "worker stopped unexpectedly");
        }
    }

    // Accounts left behind by dead workers drop their reply senders here.
    queue.lock().unwrap().clear();

    let mut results = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        results.push(receiver.await.ok().flatten());
    }
    results
}
