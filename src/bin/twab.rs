use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info};

use twab_analysis::{
    days::DateRange,
    env::get_env_config,
    execution_chain::{NamedProvider, RetryPolicy},
    log, run_twab,
    twab::{JsonFileCacheStore, RunConfig, SamplingPlan},
    units::BaseUnits,
};

/// Computes the time weighted average balance of a list of accounts over a range of days,
/// priced at a single price.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// First day of the range, YYYY-MM-DD.
    #[clap(long)]
    start_date: NaiveDate,
    /// Last day of the range, inclusive, YYYY-MM-DD.
    #[clap(long)]
    end_date: NaiveDate,
    /// Price of one whole unit of the asset.
    #[clap(long)]
    price: Decimal,
    /// Newline separated list of addresses.
    #[clap(long, default_value = "wallets.txt")]
    wallets_file: PathBuf,
    #[clap(long, default_value = "balance_cache.json")]
    cache_file: PathBuf,
    #[clap(long, default_value = "twab_results.csv")]
    output_file: PathBuf,
}

async fn run(cli: Cli) -> Result<()> {
    let env_config = get_env_config().context("reading configuration from env")?;

    let range = DateRange::new(cli.start_date, cli.end_date)?;
    let units = BaseUnits::new(env_config.balance_decimals)?;

    let nodes = env_config
        .rpc_urls
        .iter()
        .map(|url| NamedProvider::http(url))
        .collect();

    let config = RunConfig {
        accounts_path: cli.wallets_file,
        results_path: cli.output_file,
        workers_per_provider: env_config.workers_per_provider,
        sampling: SamplingPlan {
            range,
            price: cli.price,
            units,
            day_concurrency: env_config.day_concurrency,
            retry: RetryPolicy {
                unit: env_config.backoff_unit,
                ..RetryPolicy::default()
            },
        },
    };

    let cache_store = JsonFileCacheStore::new(cli.cache_file);
    let rows = run_twab(config, nodes, &cache_store).await?;

    let available = rows.iter().filter(|row| row.twab.is_some()).count();
    info!(available, total = rows.len(), "twab run complete");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging itself is configured from env, read these two before anything else so the rest
    // of the configuration is logged.
    let log_json = twab_analysis::env::get_env_bool("LOG_JSON")?.unwrap_or(false);
    let log_perf = twab_analysis::env::get_env_bool("LOG_PERF")?.unwrap_or(false);
    log::init(log_json, log_perf);

    run(cli).await.map_err(|err| {
        error!("twab run failed: {err:#}");
        err
    })
}
