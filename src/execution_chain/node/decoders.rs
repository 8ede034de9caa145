use std::num::ParseIntError;

use serde::{de, Deserialize, Deserializer};

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn u64_from_hex_str(s: &str) -> Result<u64, ParseIntError> {
    u64::from_str_radix(strip_hex_prefix(s), 16)
}

pub fn u128_from_hex_str(s: &str) -> Result<u128, ParseIntError> {
    u128::from_str_radix(strip_hex_prefix(s), 16)
}

pub fn from_unix_timestamp_hex_str<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let timestamp = u64_from_hex_str(&s).map_err(|error| {
        de::Error::invalid_value(
            de::Unexpected::Str(&format!("unexpected value: {}, error: {}", s, error)),
            &"a hex quantity e.g. \"0x6530a1ff\"",
        )
    })?;
    i64::try_from(timestamp).map_err(|_| {
        de::Error::invalid_value(
            de::Unexpected::Unsigned(timestamp),
            &"a unix timestamp which fits within i64",
        )
    })
}
