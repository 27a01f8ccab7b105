//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use refundscan_core::FixedDelayPacer;
use refundscan_sync::{ClientConfig, RetryPolicy};

/// Extract pending and failed refunds over a date range into a CSV report.
#[derive(Parser, Debug)]
#[command(name = "refundscan", version, about)]
pub struct Args {
    #[arg(long, env = "CT_PROJECT_KEY")]
    pub project_key: String,

    #[arg(long, env = "CT_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "CT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(long, env = "CT_AUTH_URL")]
    pub auth_url: String,

    #[arg(long, env = "CT_API_URL")]
    pub api_url: String,

    /// Space-separated OAuth scopes.
    #[arg(long, env = "CT_SCOPES")]
    pub scopes: Option<String>,

    /// Range start (inclusive): RFC 3339 timestamp or YYYY-MM-DD (midnight UTC).
    #[arg(long, default_value = "2025-05-22", value_parser = parse_boundary)]
    pub start: DateTime<Utc>,

    /// Range end (exclusive): RFC 3339 timestamp or YYYY-MM-DD (midnight UTC).
    #[arg(long, default_value = "2025-05-23", value_parser = parse_boundary)]
    pub end: DateTime<Utc>,

    /// Report path, overwritten after every day.
    #[arg(long, short, default_value = "refunds.csv")]
    pub output: PathBuf,

    /// Pause between pages and before each order lookup.
    #[arg(long, default_value_t = 3)]
    pub page_delay_secs: u64,

    /// Pause between days.
    #[arg(long, default_value_t = 60)]
    pub day_delay_secs: u64,

    /// Attempts per remote call; 1 aborts on the first failure.
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,

    /// Backoff before the first retry, doubled on each further retry.
    #[arg(long, default_value_t = 500)]
    pub retry_backoff_ms: u64,
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            project_key: self.project_key.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_url: self.auth_url.clone(),
            api_url: self.api_url.clone(),
            scopes: self.scopes.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn pacer(&self) -> FixedDelayPacer {
        FixedDelayPacer::new(
            Duration::from_secs(self.page_delay_secs),
            Duration::from_secs(self.day_delay_secs),
        )
    }
}

/// Parse a range boundary: a full RFC 3339 timestamp, or a bare date taken
/// as midnight UTC.
pub fn parse_boundary(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 timestamp or YYYY-MM-DD, got {s:?}"))
}
