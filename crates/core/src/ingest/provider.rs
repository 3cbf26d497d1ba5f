use crate::config::Settings;
use crate::domain::contract::ProducerSnapshot;
use crate::domain::{Snapshot, TradeDate};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PATH: &str = "/v1/large_trader_snapshot";
const DEFAULT_RETRIES: u32 = 3;

/// Source of the day's large-trader snapshot.
#[async_trait::async_trait]
pub trait SnapshotProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_snapshot(&self, as_of_date: TradeDate, instruments: &[String])
        -> Result<Snapshot>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonSnapshotProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonSnapshotProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_provider_base_url()?.to_string();
        let api_key = settings.provider_api_key.clone();

        let timeout_secs = positive_setting(
            "SNAPSHOT_PROVIDER_TIMEOUT_SECS",
            std::env::var("SNAPSHOT_PROVIDER_TIMEOUT_SECS").ok(),
            DEFAULT_TIMEOUT_SECS,
        )?;
        let retries = positive_setting(
            "SNAPSHOT_PROVIDER_RETRIES",
            std::env::var("SNAPSHOT_PROVIDER_RETRIES").ok(),
            DEFAULT_RETRIES,
        )?;

        let path = std::env::var("SNAPSHOT_PROVIDER_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build snapshot provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        as_of_date: TradeDate,
        instruments: &[String],
    ) -> Result<ProducerSnapshot, FetchError> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers().map_err(FetchError::Fatal)?)
            .query(&[
                ("date", as_of_date.to_string()),
                ("instruments", instruments.join(",")),
            ])
            .send()
            .await
            .context("snapshot provider request failed")
            .map_err(FetchError::Retryable)?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read snapshot provider response")
            .map_err(FetchError::Retryable)?;

        if !status.is_success() {
            let err = anyhow::anyhow!("snapshot provider HTTP {status}: {text}");
            return Err(if is_retryable_status(status) {
                FetchError::Retryable(err)
            } else {
                FetchError::Fatal(err)
            });
        }

        serde_json::from_str::<ProducerSnapshot>(&text)
            .with_context(|| format!("snapshot provider response is not a snapshot: {text}"))
            .map_err(FetchError::Fatal)
    }
}

/// Parses a positive number from the environment. Unparseable values fall back to
/// `default` with a warning; zero is a configuration error.
fn positive_setting<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(default);
    };
    let value = match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, "not a number; using the default");
            return Ok(default);
        }
    };
    if value == T::default() {
        return Err(PipelineError::InvalidConfig(format!("{key} must be greater than 0")).into());
    }
    Ok(value)
}

enum FetchError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait::async_trait]
impl SnapshotProvider for HttpJsonSnapshotProvider {
    fn provider_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch_snapshot(
        &self,
        as_of_date: TradeDate,
        instruments: &[String],
    ) -> Result<Snapshot> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(as_of_date, instruments).await {
                Ok(raw) => return raw.validate_and_into_snapshot(as_of_date, instruments),
                Err(FetchError::Fatal(err)) => return Err(err),
                Err(FetchError::Retryable(err)) => {
                    if attempt >= self.retries {
                        return Err(err.context(format!("gave up after {attempt} attempts")));
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "snapshot fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
