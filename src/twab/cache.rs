//! Incremental Cache
//! =================
//! Per account, the exact sum of end of day balances from the first day of a range through the
//! last day that was fully sampled. A rerun picks up from the day after that instead of
//! sampling the whole range again.
//!
//! On disk this is one JSON object keyed by checksum address. Amounts are decimal strings so
//! sums survive any number of runs without drifting.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::NaiveDate;
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    accounts::Account,
    days::{DateRange, DayMarker},
    json_codecs::date_from_date_or_datetime_str,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(alias = "total_balance", with = "rust_decimal::serde::str")]
    pub cumulative_balance: Decimal,
    /// Last day included in `cumulative_balance`.
    #[serde(deserialize_with = "date_from_date_or_datetime_str")]
    pub last_checked: NaiveDate,
    /// First day included in `cumulative_balance`. Missing in caches written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_day: Option<NaiveDate>,
}

pub type CacheEntries = HashMap<Account, CacheEntry>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse cache file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write cache file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize cache")]
    Serialize(#[source] serde_json::Error),
}

#[automock]
pub trait CacheStore {
    fn load(&self) -> Result<CacheEntries, CacheError>;
    fn save(&self, entries: &CacheEntries) -> Result<(), CacheError>;
}

pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: io::Error) -> CacheError {
        CacheError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl CacheStore for JsonFileCacheStore {
    fn load(&self) -> Result<CacheEntries, CacheError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no cache file found, starting with an empty cache");
                return Ok(HashMap::new());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let raw: BTreeMap<String, CacheEntry> =
            serde_json::from_str(&text).map_err(|source| CacheError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            match key.parse::<Account>() {
                Ok(account) => {
                    if entries.insert(account, entry).is_some() {
                        warn!(%key, "duplicate cache entry for account, keeping the last one");
                    }
                }
                Err(err) => warn!(%key, %err, "skipping cache entry with invalid address"),
            }
        }

        info!(path = %self.path.display(), count = entries.len(), "loaded balance cache");

        Ok(entries)
    }

    fn save(&self, entries: &CacheEntries) -> Result<(), CacheError> {
        let sorted: BTreeMap<String, &CacheEntry> = entries
            .iter()
            .map(|(account, entry)| (account.to_string(), entry))
            .collect();
        let json = serde_json::to_string_pretty(&sorted).map_err(CacheError::Serialize)?;

        // Write next to the target so the rename stays on one filesystem.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|err| self.write_error(err))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| self.write_error(err))?;
        file.persist(&self.path)
            .map_err(|err| self.write_error(err.error))?;

        info!(path = %self.path.display(), count = entries.len(), "saved balance cache");

        Ok(())
    }
}

/// The cache shared by all workers for the duration of a run. Workers never handle the same
/// account concurrently, so per account read then update needs no further coordination.
#[derive(Debug, Default)]
pub struct BalanceCache {
    entries: Mutex<CacheEntries>,
}

impl BalanceCache {
    pub fn new(entries: CacheEntries) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, account: &Account) -> Option<CacheEntry> {
        self.entries.lock().unwrap().get(account).cloned()
    }

    /// Replaces the entry for `account`, only called once every missing day was sampled.
    pub fn checkpoint(&self, account: Account, entry: CacheEntry) {
        self.entries.lock().unwrap().insert(account, entry);
    }

    pub fn snapshot(&self) -> CacheEntries {
        self.entries.lock().unwrap().clone()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AccountPlan {
    /// The cached sum already covers the whole range.
    Cached(Decimal),
    /// Sample `days` and add them to `prior`.
    Sample {
        prior: Decimal,
        days: Vec<DayMarker>,
    },
}

fn sample_all(range: &DateRange) -> AccountPlan {
    AccountPlan::Sample {
        prior: Decimal::ZERO,
        days: range.days(),
    }
}

pub fn plan_account(account: &Account, entry: Option<&CacheEntry>, range: &DateRange) -> AccountPlan {
    let Some(entry) = entry else {
        return sample_all(range);
    };

    match entry.first_day {
        Some(first_day) if first_day != range.start() => {
            debug!(%account, %first_day, start = %range.start(), "cached sum starts on a different day, discarding");
            return sample_all(range);
        }
        _ => (),
    }

    if entry.last_checked < range.start() {
        debug!(%account, last_checked = %entry.last_checked, "cached sum ends before range start, discarding");
        return sample_all(range);
    }

    if entry.last_checked >= range.end() {
        return AccountPlan::Cached(entry.cumulative_balance);
    }

    // Legacy entries record when the run happened, not the last day summed.
    if entry.first_day.is_none() {
        debug!(%account, last_checked = %entry.last_checked, "legacy cached sum does not cover range, resampling");
        return sample_all(range);
    }

    AccountPlan::Sample {
        prior: entry.cumulative_balance,
        days: range.days_after(entry.last_checked),
    }
}
