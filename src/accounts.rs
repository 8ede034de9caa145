//! Accounts whose balances we sample, read from a newline separated list of addresses.

use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::Path,
    str::FromStr,
};

use alloy_primitives::Address;
use thiserror::Error;
use tracing::{debug, warn};

/// An address in its EIP-55 checksum form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account(Address);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address {0:?}")]
pub struct InvalidAddress(pub String);

impl FromStr for Account {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex.len() != 40 {
            return Err(InvalidAddress(s.to_string()));
        }

        Address::from_str(hex)
            .map(Account)
            .map_err(|_| InvalidAddress(s.to_string()))
    }
}

impl Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_checksum(None))
    }
}

#[derive(Debug, Error)]
pub enum MalformedInputError {
    #[error("failed to read account list {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {source}")]
    InvalidAddress {
        line: usize,
        #[source]
        source: InvalidAddress,
    },
}

/// Parses one address per line. Blank lines are skipped, a later duplicate of an address is
/// dropped so every account is scheduled exactly once.
pub fn parse_accounts(text: &str) -> Result<Vec<Account>, MalformedInputError> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let account = line
            .parse::<Account>()
            .map_err(|source| MalformedInputError::InvalidAddress {
                line: index + 1,
                source,
            })?;

        if seen.insert(account) {
            accounts.push(account);
        } else {
            warn!(%account, line = index + 1, "duplicate account in account list, skipping");
        }
    }

    Ok(accounts)
}

pub fn read_accounts(path: &Path) -> Result<Vec<Account>, MalformedInputError> {
    let text = fs::read_to_string(path).map_err(|source| MalformedInputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let accounts = parse_accounts(&text)?;
    debug!(count = accounts.len(), path = %path.display(), "read accounts");
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VITALIK_LOWER: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
    const VITALIK_CHECKSUM: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[test]
    fn checksums_lowercase_address_test() {
        let account: Account = VITALIK_LOWER.parse().unwrap();
        assert_eq!(account.to_string(), VITALIK_CHECKSUM);
    }

    #[test]
    fn accepts_missing_prefix_test() {
        let account: Account = VITALIK_LOWER[2..].parse().unwrap();
        assert_eq!(account.to_string(), VITALIK_CHECKSUM);
    }

    #[test]
    fn rejects_short_address_test() {
        assert_eq!(
            "0xd8da6bf2".parse::<Account>(),
            Err(InvalidAddress("0xd8da6bf2".to_string()))
        );
    }

    #[test]
    fn rejects_non_hex_test() {
        let not_hex = "0xzzda6bf26964af9d7eed9e03e53415d37aa96045";
        assert!(not_hex.parse::<Account>().is_err());
    }

    #[test]
    fn parse_accounts_skips_blank_lines_and_duplicates_test() {
        let text = format!(
            "{VITALIK_LOWER}\n\n  0x0000000000000000000000000000000000000001  \n{VITALIK_CHECKSUM}\n"
        );
        let accounts = parse_accounts(&text).unwrap();
        let accounts = accounts.iter().map(Account::to_string).collect::<Vec<_>>();
        assert_eq!(
            accounts,
            vec![
                VITALIK_CHECKSUM.to_string(),
                "0x0000000000000000000000000000000000000001".to_string()
            ]
        );
    }

    #[test]
    fn parse_accounts_reports_line_of_malformed_address_test() {
        let text = format!("{VITALIK_LOWER}\nnot-an-address\n");
        match parse_accounts(&text) {
            Err(MalformedInputError::InvalidAddress { line, source }) => {
                assert_eq!(line, 2);
                assert_eq!(source, InvalidAddress("not-an-address".to_string()));
            }
            other => panic!("expected invalid address error, got {other:?}"),
        }
    }

    #[test]
    fn read_accounts_missing_file_test() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_accounts(&dir.path().join("wallets.txt"));
        assert!(matches!(result, Err(MalformedInputError::Io { .. })));
    }
}
