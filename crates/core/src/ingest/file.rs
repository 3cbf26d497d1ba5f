use crate::domain::contract::ProducerSnapshot;
use crate::domain::{Snapshot, TradeDate};
use crate::ingest::provider::SnapshotProvider;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Reads a snapshot another process has already produced (e.g. a scraper job).
#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    path: PathBuf,
}

impl FileSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    fn provider_name(&self) -> &'static str {
        "file"
    }

    async fn fetch_snapshot(
        &self,
        as_of_date: TradeDate,
        instruments: &[String],
    ) -> Result<Snapshot> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot file {}", self.path.display()))?;
        let raw = serde_json::from_str::<ProducerSnapshot>(&text)
            .with_context(|| format!("{} is not a snapshot", self.path.display()))?;
        raw.validate_and_into_snapshot(as_of_date, instruments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reads_and_validates_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let body = json!({
            "date": "20240213",
            "items": {"2330": {"top10": {"buy": 20000, "sell": 15000, "net": 5000}}}
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let provider = FileSnapshotProvider::new(&path);
        let date = TradeDate::parse("20240213").unwrap();
        let snapshot = provider.fetch_snapshot(date, &["2330".to_string()]).await.unwrap();
        assert_eq!(snapshot.items["2330"]["top10"]["net"], json!(5000));

        let other = TradeDate::parse("20240214").unwrap();
        assert!(provider.fetch_snapshot(other, &[]).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path().join("absent.json"));
        let date = TradeDate::parse("20240213").unwrap();
        assert!(provider.fetch_snapshot(date, &[]).await.is_err());
    }
}
