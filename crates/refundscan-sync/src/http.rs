//! HTTP client for the commerce platform's payments and orders endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use refundscan_core::{OrderRef, Payment, PaymentQuery, QueryService};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::RetryPolicy;

/// Tokens are renewed this long before the platform says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("token request rejected with {status}: {body}")]
    Auth { status: u16, body: String },
    #[error("JSON parse error")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Transport failures, rate limiting and 5xx responses, from the API or
    /// the token endpoint, may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Server { status, .. } | Self::Auth { status, .. } => {
                RetryPolicy::is_retryable_status(*status)
            }
            Self::Json(_) => false,
        }
    }

    /// The API rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Server { status: 401, .. })
    }
}

/// Project credentials and endpoints.
#[derive(Clone)]
pub struct ClientConfig {
    pub project_key: String,
    pub client_id: String,
    pub client_secret: String,
    /// e.g. `https://auth.europe-west1.gcp.commercetools.com`
    pub auth_url: String,
    /// e.g. `https://api.europe-west1.gcp.commercetools.com`
    pub api_url: String,
    /// Space-separated OAuth scopes; the client's default scopes when `None`.
    pub scopes: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_key", &self.project_key)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

/// Paged query envelope. Only `results` is read.
#[derive(Deserialize)]
struct PagedQueryResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Client-credentials API client for one project.
pub struct CommerceClient {
    client: reqwest::Client,
    config: ClientConfig,
    retry: RetryPolicy,
    token: Mutex<Option<CachedToken>>,
}

impl CommerceClient {
    /// Create a client. No request is made until the first query.
    pub fn new(mut config: ClientConfig, retry: RetryPolicy) -> Self {
        config.auth_url = config.auth_url.trim_end_matches('/').to_string();
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        info!(
            project = %config.project_key,
            api = %config.api_url,
            max_attempts = retry.max_attempts,
            "initializing commerce client"
        );
        Self {
            client: reqwest::Client::new(),
            config,
            retry,
            token: Mutex::new(None),
        }
    }

    /// Replace the underlying HTTP client, e.g. to set timeouts or proxies.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_url, self.config.project_key, resource
        )
    }

    /// A bearer token, fetched again when the cached one is near expiry.
    async fn bearer(&self) -> Result<String, SyncError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.access_token.clone());
        }

        let url = format!("{}/oauth/token", self.config.auth_url);
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scopes) = &self.config.scopes {
            form.push(("scope", scopes.as_str()));
        }

        debug!(url = %url, "requesting access token");
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        info!(expires_in = token.expires_in, "obtained access token");

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let token = self.bearer().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                *self.token.lock().await = None;
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET `url` under the retry policy.
    ///
    /// A 401 drops the cached token; the call is then repeated once with a
    /// fresh token, counted against the same attempt budget.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let mut attempt = 1;
        let mut token_renewed = false;
        loop {
            match self.get_once(url, query).await {
                Ok(value) => return Ok(value),
                Err(e) if !self.retry.allows_retry(attempt) => return Err(e),
                Err(e) if e.is_unauthorized() && !token_renewed => {
                    warn!(url = %url, attempt, "access token rejected, renewing");
                    token_renewed = true;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = ?e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl QueryService for CommerceClient {
    type Error = SyncError;

    async fn query_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, SyncError> {
        let url = self.endpoint("payments");
        let params = payments_params(query);
        let page: PagedQueryResponse<Payment> = self.get_json(&url, &params).await?;
        Ok(page.results)
    }

    async fn query_orders_by_payment(&self, payment_id: &str) -> Result<Vec<OrderRef>, SyncError> {
        let url = self.endpoint("orders");
        let params = [("where", orders_predicate(payment_id))];
        let page: PagedQueryResponse<OrderRef> = self.get_json(&url, &params).await?;
        Ok(page.results)
    }
}

/// Timestamp literal for query predicates, e.g. `2025-05-22T00:00:00.000Z`.
fn predicate_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Escape a value for a double-quoted predicate literal.
fn predicate_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn payments_params(query: &PaymentQuery) -> Vec<(&'static str, String)> {
    let direction = if query.ascending { "asc" } else { "desc" };
    vec![
        ("limit", query.limit.to_string()),
        ("sort", format!("lastModifiedAt {direction}")),
        ("withTotal", "false".to_string()),
        (
            "where",
            format!(
                r#"lastModifiedAt >= "{}" and lastModifiedAt <= "{}""#,
                predicate_timestamp(query.since),
                predicate_timestamp(query.until)
            ),
        ),
    ]
}

fn orders_predicate(payment_id: &str) -> String {
    format!(
        r#"paymentInfo(payments(id="{}"))"#,
        predicate_escape(payment_id)
    )
}
