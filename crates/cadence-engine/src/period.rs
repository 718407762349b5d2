//! ISO-8601 periods (`PnYnMnWnDTnHnMnS`) and local date-time arithmetic.
//!
//! Schedules express delays, intervals and expirations as periods. Calendar
//! fields (years, months, weeks, days) are applied to the local wall clock so
//! that `P1D` always means "same time tomorrow" regardless of DST.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Duration, Months, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PeriodError;

/// An ISO-8601 period. Fields are kept separately (`P1D` is not `PT24H`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Period {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Period {
    pub const ZERO: Period = Period {
        years: 0,
        months: 0,
        weeks: 0,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    pub fn days(days: u32) -> Self {
        Period {
            days,
            ..Period::ZERO
        }
    }

    pub fn hours(hours: u32) -> Self {
        Period {
            hours,
            ..Period::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Period::ZERO
    }

    /// Add this period to a local date-time.
    ///
    /// Months and years are added first (clamping to the end of shorter
    /// months), then weeks and days, then the time part. Returns `None` only
    /// when the result would overflow chrono's supported range.
    pub fn add_to(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let with_months = local.checked_add_months(Months::new(total_months))?;
        let total_days = u64::from(self.weeks) * 7 + u64::from(self.days);
        let with_days = with_months.checked_add_days(Days::new(total_days))?;
        with_days.checked_add_signed(self.time_part())
    }

    /// True when adding this period advances any date-time by less than a day.
    ///
    /// Used by schedule validation: intervals must be at least a day, and a
    /// sub-day delay combined with times of day is ambiguous.
    pub fn is_shorter_than_day(&self) -> bool {
        self.years == 0
            && self.months == 0
            && self.weeks == 0
            && self.days == 0
            && self.time_part() < Duration::days(1)
    }

    fn time_part(&self) -> Duration {
        Duration::hours(i64::from(self.hours))
            + Duration::minutes(i64::from(self.minutes))
            + Duration::seconds(i64::from(self.seconds))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (value, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value > 0 {
                write!(f, "{}{}", value, unit)?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            f.write_str("T")?;
            for (value, unit) in [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')] {
                if value > 0 {
                    write!(f, "{}{}", value, unit)?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PeriodError::Empty);
        }
        let invalid = |reason: &str| PeriodError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let upper = trimmed.to_ascii_uppercase();
        let body = upper
            .strip_prefix('P')
            .ok_or_else(|| invalid("must start with 'P'"))?;
        if body.is_empty() {
            return Err(invalid("no fields after 'P'"));
        }

        let mut period = Period::ZERO;
        let mut in_time = false;
        let mut saw_field = false;
        let mut digits = String::new();
        // Designators must appear in this order within each section.
        let mut last_rank = 0u8;

        for ch in body.chars() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                continue;
            }
            if ch == 'T' {
                if in_time || !digits.is_empty() {
                    return Err(invalid("misplaced 'T'"));
                }
                in_time = true;
                last_rank = 0;
                continue;
            }
            if digits.is_empty() {
                return Err(invalid("designator without a value"));
            }
            let value: u32 = digits
                .parse()
                .map_err(|_| invalid("value out of range"))?;
            digits.clear();

            let (rank, slot) = match (in_time, ch) {
                (false, 'Y') => (1, &mut period.years),
                (false, 'M') => (2, &mut period.months),
                (false, 'W') => (3, &mut period.weeks),
                (false, 'D') => (4, &mut period.days),
                (true, 'H') => (1, &mut period.hours),
                (true, 'M') => (2, &mut period.minutes),
                (true, 'S') => (3, &mut period.seconds),
                _ => return Err(invalid(&format!("unexpected designator '{}'", ch))),
            };
            if rank <= last_rank {
                return Err(invalid("designators out of order"));
            }
            last_rank = rank;
            *slot = value;
            saw_field = true;
        }

        if !digits.is_empty() {
            return Err(invalid("trailing value without designator"));
        }
        if !saw_field {
            return Err(invalid("no fields"));
        }
        if in_time && last_rank == 0 {
            return Err(invalid("no time fields after 'T'"));
        }
        Ok(period)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
