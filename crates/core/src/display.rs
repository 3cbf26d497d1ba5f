//! Text shown on the page, derived from configuration rather than written by hand.

use crate::domain::DocumentMeta;
use crate::history::RetentionWindow;
use crate::time::tw_market::TAIPEI_OFFSET_SECS;
use anyhow::{bail, ensure, Context};
use std::collections::BTreeSet;

const WEEKDAYS: [&str; 7] = ["週日", "週一", "週二", "週三", "週四", "週五", "週六"];
// Monday-first order used when rendering ranges.
const WEEK_ORDER: [u8; 7] = [1, 2, 3, 4, 5, 6, 0];

pub fn retention_label(window: RetentionWindow) -> String {
    format!("近 {} 個交易日", window.get())
}

pub fn document_meta(window: RetentionWindow, schedule: &str) -> DocumentMeta {
    DocumentMeta {
        retention_window: window.get(),
        retention_label: retention_label(window),
        schedule: schedule.trim().to_string(),
        schedule_label: schedule_label(schedule),
        timezone: "+08:00".to_string(),
    }
}

/// Describes a UTC cron cadence in Taipei time, e.g. `30 8 * * 1-5` -> `週一至週五 16:30 (UTC+8)`.
///
/// Expressions outside the supported subset (fixed minute and hour, `*` day-of-month and
/// month) are shown verbatim.
pub fn schedule_label(cron: &str) -> String {
    match describe_cron(cron) {
        Ok(label) => label,
        Err(err) => {
            tracing::debug!(cron, error = %err, "cron expression not describable; showing it verbatim");
            cron.trim().to_string()
        }
    }
}

fn describe_cron(cron: &str) -> anyhow::Result<String> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    ensure!(fields.len() == 5, "expected 5 cron fields, got {}", fields.len());

    let minute: u32 = fields[0].parse().context("minute must be a number")?;
    let hour: u32 = fields[1].parse().context("hour must be a number")?;
    ensure!(minute < 60 && hour < 24, "time out of range");
    ensure!(fields[2] == "*" && fields[3] == "*", "day-of-month and month must be '*'");

    let offset_hours = (TAIPEI_OFFSET_SECS / 3600) as u32;
    let local_hour = hour + offset_hours;
    let day_shift = (local_hour / 24) as u8;
    let local_hour = local_hour % 24;

    let days: BTreeSet<u8> = parse_weekdays(fields[4])?
        .into_iter()
        .map(|d| (d + day_shift) % 7)
        .collect();

    Ok(format!(
        "{} {local_hour:02}:{minute:02} (UTC+8)",
        render_weekdays(&days)
    ))
}

fn parse_weekdays(field: &str) -> anyhow::Result<BTreeSet<u8>> {
    let mut out = BTreeSet::new();
    if field == "*" {
        out.extend(0..7);
        return Ok(out);
    }

    for part in field.split(',') {
        match part.split_once('-') {
            Some((a, b)) => {
                let (a, b) = (weekday(a)?, weekday(b)?);
                ensure!(a <= b, "descending weekday range {part}");
                out.extend((a..=b).map(|d| d % 7));
            }
            None => {
                out.insert(weekday(part)? % 7);
            }
        }
    }
    Ok(out)
}

fn weekday(s: &str) -> anyhow::Result<u8> {
    let n: u8 = s.trim().parse().with_context(|| format!("invalid weekday {s:?}"))?;
    if n > 7 {
        bail!("weekday out of range: {n}");
    }
    Ok(n)
}

fn render_weekdays(days: &BTreeSet<u8>) -> String {
    if days.len() == 7 {
        return "每日".to_string();
    }

    let ordered: Vec<u8> = WEEK_ORDER.iter().copied().filter(|d| days.contains(d)).collect();
    let positions: Vec<usize> = ordered
        .iter()
        .filter_map(|d| WEEK_ORDER.iter().position(|w| w == d))
        .collect();
    let contiguous = positions.windows(2).all(|w| w[1] == w[0] + 1);

    if ordered.len() >= 3 && contiguous {
        let first = WEEKDAYS[ordered[0] as usize];
        let last = WEEKDAYS[ordered[ordered.len() - 1] as usize];
        return format!("{first}至{last}");
    }

    ordered
        .iter()
        .map(|d| WEEKDAYS[*d as usize])
        .collect::<Vec<_>>()
        .join("、")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_label_follows_window() {
        assert_eq!(retention_label(RetentionWindow::new(30).unwrap()), "近 30 個交易日");
        assert_eq!(retention_label(RetentionWindow::new(7).unwrap()), "近 7 個交易日");
    }

    #[test]
    fn describes_weekday_cadence_in_taipei_time() {
        assert_eq!(schedule_label("30 8 * * 1-5"), "週一至週五 16:30 (UTC+8)");
        assert_eq!(schedule_label("0 10 * * *"), "每日 18:00 (UTC+8)");
        assert_eq!(schedule_label("5 9 * * 1,3,5"), "週一、週三、週五 17:05 (UTC+8)");
    }

    #[test]
    fn shifts_weekdays_when_crossing_midnight() {
        // 17:00 UTC Mon-Fri is 01:00 Taipei Tue-Sat.
        assert_eq!(schedule_label("0 17 * * 1-5"), "週二至週六 01:00 (UTC+8)");
    }

    #[test]
    fn unsupported_expressions_are_shown_verbatim() {
        assert_eq!(schedule_label("*/15 * * * *"), "*/15 * * * *");
        assert_eq!(schedule_label("0 8 1 * *"), "0 8 1 * *");
        assert_eq!(schedule_label("garbage"), "garbage");
    }

    #[test]
    fn meta_carries_both_labels() {
        let meta = document_meta(RetentionWindow::new(30).unwrap(), " 30 8 * * 1-5 ");
        assert_eq!(meta.retention_window, 30);
        assert_eq!(meta.schedule, "30 8 * * 1-5");
        assert_eq!(meta.schedule_label, "週一至週五 16:30 (UTC+8)");
        assert_eq!(meta.timezone, "+08:00");
    }
}
