pub mod display;
pub mod domain;
pub mod error;
pub mod history;
pub mod ingest;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::DocumentMeta;
    use crate::error::PipelineError;
    use crate::history::RetentionWindow;
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_OUTPUT_PATH: &str = "docs/futures_data.json";
    pub const DEFAULT_SCHEDULE_CRON: &str = "30 8 * * 1-5";
    pub const DEFAULT_TRACKED_INSTRUMENTS: &str = "2330,2317,3231,2382";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub output_path: PathBuf,
        pub retention_window: RetentionWindow,
        pub schedule_cron: String,
        pub tracked_instruments: Vec<String>,
        pub provider_base_url: Option<String>,
        pub provider_api_key: Option<String>,
        pub snapshot_file: Option<PathBuf>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_vars(|key| std::env::var(key).ok())
        }

        pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

            let retention_window = match var("HISTORY_RETENTION_DAYS") {
                Some(s) => parse_retention(&s)?,
                None => RetentionWindow::default(),
            };

            let tracked_instruments = parse_instruments(
                &var("TRACKED_INSTRUMENTS")
                    .unwrap_or_else(|| DEFAULT_TRACKED_INSTRUMENTS.to_string()),
            );
            if tracked_instruments.is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "TRACKED_INSTRUMENTS must list at least one instrument".to_string(),
                )
                .into());
            }

            Ok(Self {
                output_path: var("OUTPUT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
                retention_window,
                schedule_cron: var("SCHEDULE_CRON")
                    .unwrap_or_else(|| DEFAULT_SCHEDULE_CRON.to_string()),
                tracked_instruments,
                provider_base_url: var("SNAPSHOT_PROVIDER_BASE_URL"),
                provider_api_key: var("SNAPSHOT_PROVIDER_API_KEY"),
                snapshot_file: var("SNAPSHOT_FILE").map(PathBuf::from),
                sentry_dsn: var("SENTRY_DSN"),
            })
        }

        pub fn require_provider_base_url(&self) -> anyhow::Result<&str> {
            self.provider_base_url
                .as_deref()
                .context("SNAPSHOT_PROVIDER_BASE_URL is required (or set SNAPSHOT_FILE)")
        }

        /// Retention and schedule labels; the only place the page's wording comes from.
        pub fn document_meta(&self) -> DocumentMeta {
            crate::display::document_meta(self.retention_window, &self.schedule_cron)
        }
    }

    pub fn parse_retention(s: &str) -> anyhow::Result<RetentionWindow> {
        let n = s.trim().parse::<usize>().map_err(|_| {
            PipelineError::InvalidConfig(format!("retention window must be an integer (got {s:?})"))
        })?;
        RetentionWindow::new(n).map_err(|err| PipelineError::InvalidConfig(err.to_string()).into())
    }

    fn parse_instruments(s: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for part in s.split(',') {
            let id = part.trim();
            if !id.is_empty() && !out.iter().any(|x| x == id) {
                out.push(id.to_string());
            }
        }
        out
    }

}
