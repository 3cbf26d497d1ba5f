use crate::domain::snapshot::{Items, Snapshot, TradeDate};
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Snapshot as delivered by a producer, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSnapshot {
    pub date: String,
    pub items: BTreeMap<String, Value>,
}

impl ProducerSnapshot {
    pub fn validate_and_into_snapshot(
        self,
        expected_date: TradeDate,
        tracked: &[String],
    ) -> anyhow::Result<Snapshot> {
        let date = TradeDate::parse(&self.date)?;
        ensure!(
            date == expected_date,
            "producer date mismatch: expected {expected_date}, got {date}"
        );

        ensure!(!self.items.is_empty(), "producer snapshot has no items");

        let mut items = Items::new();
        for (id, metrics) in self.items {
            let trimmed = id.trim();
            ensure!(!trimmed.is_empty(), "instrument id must be non-empty");
            ensure!(
                metrics.is_object(),
                "metrics for instrument {trimmed} must be a JSON object"
            );
            ensure!(
                items.insert(trimmed.to_string(), metrics).is_none(),
                "duplicate instrument id: {trimmed}"
            );
        }

        for id in tracked {
            if !items.contains_key(id) {
                tracing::warn!(%date, instrument = %id, "tracked instrument missing from snapshot");
            }
        }

        Ok(Snapshot { date, items })
    }
}
