use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer};

fn parse_date_or_datetime(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    s.parse::<NaiveDate>()
        .ok()
        .or_else(|| {
            s.parse::<NaiveDateTime>()
                .ok()
                .map(|date_time| date_time.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|date_time| date_time.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|date_time| date_time.date())
        })
}

/// Accepts a plain `YYYY-MM-DD` date, or an ISO datetime of which only the date is kept.
pub fn date_from_date_or_datetime_str<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_date_or_datetime(&s).ok_or_else(|| {
        de::Error::invalid_value(
            de::Unexpected::Str(&s),
            &"a date like \"2024-06-14\" or a datetime like \"2024-06-14T00:00:00\"",
        )
    })
}
