use anyhow::{ensure, Context};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Per-instrument metrics keyed by instrument id (e.g. "2330").
///
/// The payload is opaque to the history store and is written back exactly as read.
pub type Items = BTreeMap<String, Value>;

/// Trading date, serialized on the wire as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(NaiveDate);

impl TradeDate {
    pub const WIRE_FORMAT: &'static str = "%Y%m%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> anyhow::Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .with_context(|| format!("invalid calendar date {year:04}-{month:02}-{day:02}"))
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let t = s.trim();
        ensure!(
            t.len() == 8 && t.bytes().all(|b| b.is_ascii_digit()),
            "trade date must be YYYYMMDD (got {s:?})"
        );
        let date = NaiveDate::parse_from_str(t, Self::WIRE_FORMAT)
            .with_context(|| format!("trade date is not a calendar date: {s:?}"))?;
        Ok(Self(date))
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::WIRE_FORMAT))
    }
}

impl FromStr for TradeDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for TradeDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Serialize for TradeDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TradeDate::parse(&s).map_err(|e| serde::de::Error::custom(format!("{e:#}")))
    }
}

/// One day's observations for all tracked instruments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: TradeDate,
    pub items: Items,
}

/// Display metadata written next to the history so the page never hardcodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub retention_window: usize,
    pub retention_label: String,
    pub schedule: String,
    pub schedule_label: String,
    pub timezone: String,
}

/// The persisted artifact read by the static page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub date: TradeDate,
    pub items: Items,
    pub update_time: DateTime<FixedOffset>,
    pub history: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DocumentMeta>,
}

impl Document {
    /// Builds a document whose top level mirrors `history[0]`.
    pub fn from_history(
        history: Vec<Snapshot>,
        update_time: DateTime<FixedOffset>,
    ) -> anyhow::Result<Self> {
        let head = history
            .first()
            .context("document history must contain at least one snapshot")?;

        Ok(Self {
            date: head.date,
            items: head.items.clone(),
            update_time,
            history,
            meta: None,
        })
    }

    pub fn with_meta(mut self, meta: DocumentMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let head = self
            .history
            .first()
            .context("document history is empty")?;
        ensure!(
            head.date == self.date,
            "document date {} does not match history[0] date {}",
            self.date,
            head.date
        );
        ensure!(
            head.items == self.items,
            "document items do not match history[0] items"
        );

        for pair in self.history.windows(2) {
            ensure!(
                pair[0].date > pair[1].date,
                "history must be strictly newest-first without duplicates ({} before {})",
                pair[0].date,
                pair[1].date
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trade_date_uses_compact_wire_format() {
        let d = TradeDate::from_ymd(2024, 2, 13).unwrap();
        assert_eq!(d.to_string(), "20240213");
        assert_eq!(serde_json::to_value(d).unwrap(), json!("20240213"));
        assert_eq!(serde_json::from_value::<TradeDate>(json!("20240213")).unwrap(), d);
    }

    #[test]
    fn trade_date_rejects_malformed_input() {
        assert!(TradeDate::parse("2024-02-13").is_err());
        assert!(TradeDate::parse("2024021").is_err());
        assert!(TradeDate::parse("20240230").is_err());
        assert!(serde_json::from_value::<TradeDate>(json!(20240213)).is_err());
    }

    #[test]
    fn document_mirrors_first_history_entry() {
        let newest = Snapshot {
            date: TradeDate::from_ymd(2024, 1, 2).unwrap(),
            items: BTreeMap::from([("2330".to_string(), json!({"oi": 1}))]),
        };
        let older = Snapshot {
            date: TradeDate::from_ymd(2024, 1, 1).unwrap(),
            items: Items::new(),
        };
        let ts = DateTime::parse_from_rfc3339("2024-01-02T16:30:00+08:00").unwrap();

        let doc = Document::from_history(vec![newest.clone(), older], ts).unwrap();
        assert_eq!(doc.date, newest.date);
        assert_eq!(doc.items, newest.items);
        doc.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unordered_history() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T16:30:00+08:00").unwrap();
        let a = Snapshot {
            date: TradeDate::from_ymd(2024, 1, 1).unwrap(),
            items: Items::new(),
        };
        let b = Snapshot {
            date: TradeDate::from_ymd(2024, 1, 2).unwrap(),
            items: Items::new(),
        };
        let doc = Document::from_history(vec![a, b], ts).unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn empty_history_cannot_form_a_document() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T16:30:00+08:00").unwrap();
        assert!(Document::from_history(Vec::new(), ts).is_err());
    }
}
