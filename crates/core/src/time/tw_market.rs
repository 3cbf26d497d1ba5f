use crate::domain::TradeDate;
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

pub const TAIPEI_OFFSET_SECS: i32 = 8 * 3600;

// TAIFEX publishes large-trader positions after the 15:00 futures close; before this
// time (Taipei) a run refers to the previous trading day.
const PUBLISH_CUTOFF_HOUR: u32 = 16;
const PUBLISH_CUTOFF_MINUTE: u32 = 0;

pub fn taipei() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(TAIPEI_OFFSET_SECS).context("invalid Taipei offset")
}

pub fn now_taipei(now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<FixedOffset>> {
    Ok(now_utc.with_timezone(&taipei()?))
}

/// Resolves the trading date a run should fetch.
///
/// An explicit `YYYYMMDD` / `YYYY-MM-DD` argument wins. Otherwise the Taipei calendar
/// date is used, shifted to the previous day before the publish cutoff and rolled back
/// over weekends and holidays.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<TradeDate> {
    if let Some(s) = as_of_date_arg {
        return parse_date_arg(s);
    }

    let now = now_taipei(now_utc)?;

    let cutoff_reached = (now.hour(), now.minute()) >= (PUBLISH_CUTOFF_HOUR, PUBLISH_CUTOFF_MINUTE);
    let mut date = now.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    let holidays = configured_holidays();
    while is_weekend(date) || is_fixed_holiday(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(TradeDate::new(date))
}

fn parse_date_arg(s: &str) -> anyhow::Result<TradeDate> {
    let t = s.trim();
    if t.contains('-') {
        let d = NaiveDate::parse_from_str(t, "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date {s:?}"))?;
        return Ok(TradeDate::new(d));
    }
    TradeDate::parse(t)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

// Fixed-date closures only (New Year, Peace Memorial Day, National Day).
fn is_fixed_holiday(date: NaiveDate) -> bool {
    matches!((date.month(), date.day()), (1, 1) | (2, 28) | (10, 10))
}

/// Lunar-calendar closures from `TW_MARKET_HOLIDAYS="YYYYMMDD,YYYY-MM-DD"`.
fn configured_holidays() -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    if let Ok(s) = std::env::var("TW_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match parse_date_arg(part) {
                Ok(d) => {
                    out.insert(d.naive());
                }
                Err(err) => tracing::warn!(value = part, error = %err, "ignoring TW_MARKET_HOLIDAYS entry"),
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> TradeDate {
        TradeDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn explicit_argument_wins() {
        let now = Utc.with_ymd_and_hms(2024, 2, 13, 9, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(Some("20240205"), now).unwrap(), date(2024, 2, 5));
        assert_eq!(resolve_as_of_date(Some("2024-02-05"), now).unwrap(), date(2024, 2, 5));
        assert!(resolve_as_of_date(Some("02/05/2024"), now).is_err());
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2024-02-13 08:30 UTC = 16:30 Taipei (Tuesday).
        let now = Utc.with_ymd_and_hms(2024, 2, 13, 8, 30, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2024, 2, 13));
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2024-02-13 07:59 UTC = 15:59 Taipei.
        let now = Utc.with_ymd_and_hms(2024, 2, 13, 7, 59, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2024, 2, 12));
    }

    #[test]
    fn rolls_back_over_weekend() {
        // 2024-02-19 02:00 UTC = Monday 10:00 Taipei; previous day is Sunday.
        let now = Utc.with_ymd_and_hms(2024, 2, 19, 2, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2024, 2, 16));
    }

    #[test]
    fn utc_evening_is_already_next_day_in_taipei() {
        // 2024-02-14 17:00 UTC = Thursday 01:00 Taipei, before cutoff -> Wednesday.
        let now = Utc.with_ymd_and_hms(2024, 2, 14, 17, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2024, 2, 14));
    }

    #[test]
    fn skips_fixed_holidays() {
        // 2024-10-10 (Thursday) is National Day; 2024-10-11 09:00 Taipei resolves past it.
        let now = Utc.with_ymd_and_hms(2024, 10, 11, 1, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2024, 10, 9));
    }

    #[test]
    fn fixed_holidays_apply_in_any_year() {
        // 2031-10-13 09:00 Taipei (Monday): Sunday, Saturday and National Day (Friday) are skipped.
        let now = Utc.with_ymd_and_hms(2031, 10, 13, 1, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), date(2031, 10, 9));
        assert!(is_fixed_holiday(NaiveDate::from_ymd_opt(2045, 1, 1).unwrap()));
        assert!(!is_fixed_holiday(NaiveDate::from_ymd_opt(2045, 1, 2).unwrap()));
    }
}
