//! Expiration dates
//!
//! Broker date parsing and the tenor predicates used by the universe filter:
//! - `YYYYMMDD` expirations from option chain definitions
//! - `YYYYMM` contract months on futures descriptors
//! - Weekly slot of a date within its month

use chrono::{Datelike, Months, NaiveDate};

use super::error::{SurfaceError, SurfaceResult};

/// Parse a broker expiration string (`YYYYMMDD`, optionally followed by a time)
pub fn parse_expiration(s: &str) -> SurfaceResult<NaiveDate> {
    let digits = s.trim().get(..8).unwrap_or("");
    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .map_err(|e| SurfaceError::invalid_input(format!("Bad expiration '{}': {}", s, e)))
}

/// Parse a last-trade-date-or-contract-month field
///
/// A bare contract month (`YYYYMM`) resolves to the last calendar day of
/// that month.
pub fn parse_contract_month(s: &str) -> SurfaceResult<NaiveDate> {
    let s = s.trim();
    if s.len() == 6 && s.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = s[0..4]
            .parse()
            .map_err(|_| SurfaceError::invalid_input(format!("Bad contract month '{}'", s)))?;
        let month: u32 = s[4..6]
            .parse()
            .map_err(|_| SurfaceError::invalid_input(format!("Bad contract month '{}'", s)))?;

        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| SurfaceError::invalid_input(format!("Bad contract month '{}'", s)))?;
        return first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| SurfaceError::invalid_input(format!("Bad contract month '{}'", s)));
    }

    parse_expiration(s)
}

/// Format a date the way the broker expects it
pub fn format_expiration(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Weekly slot of a date within its month: `day / 7 + 1`
///
/// Days 1-6 are slot 1, 7-13 slot 2, 14-20 slot 3, 21-27 slot 4, 28-31 slot 5.
pub fn weekly_slot(date: NaiveDate) -> u32 {
    date.day() / 7 + 1
}

/// Month number of the calendar month following `today`
pub fn next_month(today: NaiveDate) -> u32 {
    today
        .checked_add_months(Months::new(1))
        .map(|d| d.month())
        .unwrap_or(today.month() % 12 + 1)
}

/// Borderline monthly tenor: a date in next month's 4th weekly slot
///
/// Only the month number is compared, not the year. Dates matching this
/// predicate are dropped by the universe filter only when
/// `skip_borderline_monthly` is turned on. The rule excludes the near-term
/// monthly slot without adding anything in its place; it is kept as-is
/// pending clarification from the desk.
pub fn is_borderline_monthly(date: NaiveDate, today: NaiveDate) -> bool {
    date.month() == next_month(today) && weekly_slot(date) == 4
}

/// Serde adapter for `YYYYMMDD` dates on the wire
pub mod broker_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_expiration(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_expiration(&s).map_err(serde::de::Error::custom)
    }
}
