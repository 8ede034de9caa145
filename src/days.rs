//! Calendar days in UTC and the inclusive date ranges a TWAB is computed over.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 86_400;

/// A calendar day, indexed by its last second in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayMarker {
    pub date: NaiveDate,
}

impl DayMarker {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn start_timestamp(&self) -> i64 {
        self.date.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// Unix timestamp of 23:59:59 UTC on this day, start of the next day minus one second.
    pub fn end_of_day_timestamp(&self) -> i64 {
        self.start_timestamp() + SECONDS_PER_DAY - 1
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("range start {start} is after range end {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn day_count(&self) -> u32 {
        // A valid range has start <= end, the difference is never negative.
        (self.end - self.start).num_days() as u32 + 1
    }

    pub fn days(&self) -> Vec<DayMarker> {
        self.days_from(self.start)
    }

    /// Days strictly after `last_checked` up to the end of the range. When `last_checked` is
    /// before the range every day is returned.
    pub fn days_after(&self, last_checked: NaiveDate) -> Vec<DayMarker> {
        match last_checked.succ_opt() {
            Some(next) if next > self.start => self.days_from(next),
            Some(_) => self.days(),
            None => vec![],
        }
    }

    fn days_from(&self, first: NaiveDate) -> Vec<DayMarker> {
        first
            .iter_days()
            .take_while(|date| *date <= self.end)
            .map(DayMarker::new)
            .collect()
    }
}
