use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::accounts::Account;

const NOT_AVAILABLE: &str = "N/A";

/// One row per input account, in input order. `twab` is `None` when the account failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwabRow {
    /// 1-based position in the account list.
    pub index: usize,
    pub account: Account,
    pub twab: Option<Decimal>,
}

#[derive(Serialize)]
struct CsvRow {
    #[serde(rename = "Index")]
    index: usize,
    #[serde(rename = "Wallet")]
    wallet: String,
    #[serde(rename = "TWAB")]
    twab: String,
}

impl From<&TwabRow> for CsvRow {
    fn from(row: &TwabRow) -> Self {
        Self {
            index: row.index,
            wallet: row.account.to_string(),
            twab: row
                .twab
                .map_or_else(|| NOT_AVAILABLE.to_string(), |twab| twab.normalize().to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to write report {path}")]
pub struct ReportError {
    path: PathBuf,
    #[source]
    source: csv::Error,
}

pub fn write_report(path: &Path, rows: &[TwabRow]) -> Result<(), ReportError> {
    let to_report_error = |source| ReportError {
        path: path.to_path_buf(),
        source,
    };

    let mut csv_writer = csv::Writer::from_path(path).map_err(to_report_error)?;

    for row in rows {
        csv_writer
            .serialize(CsvRow::from(row))
            .map_err(to_report_error)?;
    }

    // The writer buffers rows, flush so nothing is lost when it drops.
    csv_writer
        .flush()
        .map_err(|err| to_report_error(err.into()))?;

    info!(path = %path.display(), rows = rows.len(), "wrote twab report");

    Ok(())
}
