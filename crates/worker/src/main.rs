use clap::Parser;
use largetrader_core::config::{parse_retention, Settings};
use largetrader_core::ingest::{FileSnapshotProvider, HttpJsonSnapshotProvider, SnapshotProvider};
use largetrader_core::storage::DocumentStore;
use largetrader_core::time::tw_market;
use std::path::PathBuf;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "largetrader_worker")]
struct Args {
    /// Trading date to fetch (YYYYMMDD or YYYY-MM-DD). Defaults to the latest published
    /// TAIFEX trading day in Taipei time.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Fetch and merge, but do not write the document.
    #[arg(long)]
    dry_run: bool,

    /// Document path (overrides OUTPUT_PATH).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Retention window in trading days (overrides HISTORY_RETENTION_DAYS).
    #[arg(long)]
    retention_days: Option<String>,

    /// Read the snapshot from a file instead of the HTTP provider (overrides SNAPSHOT_FILE).
    #[arg(long)]
    snapshot_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let settings = apply_overrides(Settings::from_env()?, &args)?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let now = chrono::Utc::now();
    let as_of_date = tw_market::resolve_as_of_date(args.as_of_date.as_deref(), now)?;
    let run_time = tw_market::now_taipei(now)?;

    let provider = build_provider(&settings)?;
    let store = DocumentStore::new(&settings.output_path);

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, %as_of_date);

    let result = largetrader_core::pipeline::run(
        &settings,
        provider.as_ref(),
        &store,
        as_of_date,
        run_time,
        args.dry_run,
    )
    .instrument(span)
    .await;

    match result {
        Ok(report) => {
            tracing::info!(
                %run_id,
                %as_of_date,
                provider = report.provider,
                history_len = report.document.history.len(),
                fresh_start = report.fresh_start,
                repaired = report.repaired,
                written = report.written,
                "run finished"
            );
            if args.dry_run {
                let bytes = largetrader_core::storage::codec::serialize(&report.document)?;
                println!("{}", String::from_utf8_lossy(&bytes).trim_end());
            }
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%run_id, %as_of_date, error = %err, "run failed; previous document left in place");
            Err(err)
        }
    }
}

fn apply_overrides(mut settings: Settings, args: &Args) -> anyhow::Result<Settings> {
    if let Some(path) = &args.output {
        settings.output_path = path.clone();
    }
    if let Some(days) = &args.retention_days {
        settings.retention_window = parse_retention(days)?;
    }
    if let Some(path) = &args.snapshot_file {
        settings.snapshot_file = Some(path.clone());
    }
    Ok(settings)
}

fn build_provider(settings: &Settings) -> anyhow::Result<Box<dyn SnapshotProvider>> {
    if let Some(path) = &settings.snapshot_file {
        return Ok(Box::new(FileSnapshotProvider::new(path)));
    }
    Ok(Box::new(HttpJsonSnapshotProvider::from_settings(settings)?))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
