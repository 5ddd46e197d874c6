//! Duration and date parsing for configuration and command-line inputs

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

use crate::error::{ExportError, ExportResult};

/// Format of the start/end dates given on the command line
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a date like `2019-07-31T17:03:00.000Z` as UTC
pub fn parse_date(s: &str) -> ExportResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ExportError::parse(format!("invalid date '{}': {}", s, e)))
}

/// Parse a duration such as `300ms`, `10m`, `1h30m` or `1.5s`.
///
/// Every number needs a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), except
/// for a bare `0`.
pub fn parse_duration(s: &str) -> ExportResult<Duration> {
    let invalid = |reason: &str| ExportError::parse(format!("invalid duration '{}': {}", s, reason));

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid("empty string"));
    }

    let is_number_char = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = s;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number_char(c)).unwrap_or(rest.len());
        let number = &rest[..number_end];
        if number.is_empty() || number == "." {
            return Err(invalid("expected a number"));
        }

        let unit_end = rest[number_end..]
            .find(is_number_char)
            .map(|i| number_end + i)
            .unwrap_or(rest.len());
        let unit_nanos: u128 = match &rest[number_end..unit_end] {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            "" => return Err(invalid("missing unit")),
            other => return Err(invalid(&format!("unknown unit '{}'", other))),
        };

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid("bad number"))?
        };
        let mut nanos = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| invalid("overflow"))?;

        // Digits beyond nanosecond precision of an hour cannot change the result
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let frac: u128 = frac_digits.parse().map_err(|_| invalid("bad fraction"))?;
            nanos += frac * unit_nanos / 10u128.pow(frac_digits.len() as u32);
        }

        total_nanos = total_nanos
            .checked_add(nanos)
            .ok_or_else(|| invalid("overflow"))?;
        rest = &rest[unit_end..];
    }

    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).map_err(|_| invalid("overflow"))?;
    Ok(Duration::new(secs, (total_nanos % NANOS_PER_SEC) as u32))
}
