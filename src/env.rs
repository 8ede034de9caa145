//! Fns to read variables from the environment more conveniently and turn them into the typed
//! configuration a TWAB run needs.

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::debug;

const SECRET_LOG_BLACKLIST: [&str; 1] = ["RPC_URLS"];

const DEFAULT_WORKERS_PER_PROVIDER: usize = 5;
const DEFAULT_DAY_CONCURRENCY: usize = 3;
const DEFAULT_BALANCE_DECIMALS: u32 = 18;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("env var {0} is not valid unicode")]
    NotUnicode(&'static str),
}

fn obfuscate_if_secret(blacklist: &[&str], key: &str, value: &str) -> String {
    if blacklist.contains(&key) {
        let mut last_four = value.to_string();
        last_four.drain(0..value.len().saturating_sub(4));
        format!("****{last_four}")
    } else {
        value.to_string()
    }
}

/// Shortens a provider URL to something safe to log. Most hosted endpoints carry an API key in
/// their path or query.
pub fn obfuscate_url(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split(['/', '?']).next().unwrap_or(without_scheme);
    if host.len() == without_scheme.len() {
        host.to_string()
    } else {
        format!("{host}/****")
    }
}

/// Get an environment variable, encoding found or missing as Option.
pub fn get_env_var(key: &'static str) -> Result<Option<String>, ConfigError> {
    let var = match env::var(key) {
        Err(env::VarError::NotPresent) => None,
        Err(env::VarError::NotUnicode(_)) => return Err(ConfigError::NotUnicode(key)),
        Ok(var) => Some(var),
    };

    if let Some(ref existing_var) = var {
        let output = obfuscate_if_secret(&SECRET_LOG_BLACKLIST, key, existing_var);
        debug!("env var {key}: {output}");
    } else {
        debug!("env var {key} requested but not found")
    };

    Ok(var)
}

pub fn get_env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    get_env_var(key)?
        .map(|var| match var.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: var }),
        })
        .transpose()
}

fn get_env_parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    get_env_var(key)?
        .map(|var| {
            var.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { key, value: var })
        })
        .transpose()
}

fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug)]
pub struct EnvConfig {
    pub rpc_urls: Vec<String>,
    pub workers_per_provider: usize,
    pub day_concurrency: usize,
    pub balance_decimals: u32,
    pub backoff_unit: Duration,
}

pub fn get_env_config() -> Result<EnvConfig, ConfigError> {
    let rpc_urls = get_env_var("RPC_URLS")?
        .map(|raw| parse_rpc_urls(&raw))
        .filter(|urls| !urls.is_empty())
        .ok_or(ConfigError::Missing("RPC_URLS"))?;

    let workers_per_provider =
        get_env_parsed("WORKERS_PER_PROVIDER")?.unwrap_or(DEFAULT_WORKERS_PER_PROVIDER);
    if workers_per_provider == 0 {
        return Err(ConfigError::Invalid {
            key: "WORKERS_PER_PROVIDER",
            value: "0".to_string(),
        });
    }

    let day_concurrency = get_env_parsed("DAY_CONCURRENCY")?.unwrap_or(DEFAULT_DAY_CONCURRENCY);
    if day_concurrency == 0 {
        return Err(ConfigError::Invalid {
            key: "DAY_CONCURRENCY",
            value: "0".to_string(),
        });
    }

    Ok(EnvConfig {
        rpc_urls,
        workers_per_provider,
        day_concurrency,
        balance_decimals: get_env_parsed("BALANCE_DECIMALS")?.unwrap_or(DEFAULT_BALANCE_DECIMALS),
        backoff_unit: Duration::from_millis(
            get_env_parsed("RATE_LIMIT_BACKOFF_UNIT_MS")?.unwrap_or(DEFAULT_BACKOFF_UNIT_MS),
        ),
    })
}
