use crate::config::Settings;
use crate::domain::{Document, TradeDate};
use crate::error::PipelineError;
use crate::history;
use crate::ingest::SnapshotProvider;
use crate::storage::{DocumentStore, LoadedState};
use chrono::{DateTime, FixedOffset};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub as_of_date: TradeDate,
    pub provider: &'static str,
    pub fresh_start: bool,
    pub repaired: usize,
    pub replaced: bool,
    pub dropped: Vec<TradeDate>,
    pub written: bool,
    pub document: Document,
}

/// One scheduled run: fetch, read prior state, merge, write.
///
/// Nothing is written unless a snapshot was obtained. A damaged document on disk is
/// recovered as empty history rather than failing the run.
pub async fn run(
    settings: &Settings,
    provider: &dyn SnapshotProvider,
    store: &DocumentStore,
    as_of_date: TradeDate,
    run_time: DateTime<FixedOffset>,
    dry_run: bool,
) -> Result<RunReport, PipelineError> {
    let snapshot = provider
        .fetch_snapshot(as_of_date, &settings.tracked_instruments)
        .await
        .map_err(PipelineError::UpstreamUnavailable)?;

    tracing::info!(
        %as_of_date,
        provider = provider.provider_name(),
        items = snapshot.items.len(),
        "snapshot fetched"
    );

    let loaded = store.load();
    let (fresh_start, repaired) = match &loaded {
        LoadedState::Fresh => (true, 0),
        LoadedState::Existing { state, repaired } => {
            if state.is_empty() && *repaired > 0 {
                tracing::warn!(
                    path = %store.path().display(),
                    "persisted document unusable; starting a new history"
                );
            }
            (false, *repaired)
        }
    };

    let outcome = history::merge(
        loaded.prior(),
        &snapshot,
        settings.retention_window,
        run_time,
    );
    let document = outcome.document.with_meta(settings.document_meta());

    if !outcome.dropped.is_empty() {
        let dropped: Vec<String> = outcome.dropped.iter().map(|d| d.to_string()).collect();
        tracing::info!(dropped = ?dropped, "dates aged out of the retention window");
    }

    let written = if dry_run {
        tracing::info!(path = %store.path().display(), dry_run = true, "skipping document write");
        false
    } else {
        store
            .save(&document)
            .map_err(|cause| PipelineError::SerializationFailure {
                path: store.path().to_path_buf(),
                cause,
            })?;
        true
    };

    tracing::info!(
        %as_of_date,
        history_len = document.history.len(),
        retention_window = settings.retention_window.get(),
        replaced = outcome.replaced,
        update_time = %document.update_time.to_rfc3339(),
        written,
        "history updated"
    );

    Ok(RunReport {
        as_of_date,
        provider: provider.provider_name(),
        fresh_start,
        repaired,
        replaced: outcome.replaced,
        dropped: outcome.dropped,
        written,
        document,
    })
}
