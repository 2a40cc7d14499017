//! HTTP client for the Strava v3 API.
//!
//! This module provides:
//! - Response classification into [`ApiResponse`] at the parsing boundary
//! - Bounded retry with exponential backoff for transport failures and 5xx
//! - The [`ActivitySource`] seam used by the fetcher and merge engine
//!
//! Requests are issued one at a time. The provider's rate limit is shared
//! across every call, so there is nothing to gain from concurrency.

use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::types::{ActivityDetail, ActivitySummary};

pub const API_BASE_URL: &str = "https://www.strava.com/api/v3";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const RATE_LIMIT_MESSAGE: &str = "Rate Limit Exceeded";

/// Outcome of a request that reached the provider.
///
/// Rate limiting is signaled in-band, so it is a normal response variant
/// rather than an error. Anything else that goes wrong is a [`SyncError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Ok(T),
    RateLimited,
}

impl<T> ApiResponse<T> {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiResponse::RateLimited)
    }

    /// Transform the payload, passing a rate limit through. Fails if `f` fails.
    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<ApiResponse<U>> {
        match self {
            ApiResponse::Ok(value) => f(value).map(ApiResponse::Ok),
            ApiResponse::RateLimited => Ok(ApiResponse::RateLimited),
        }
    }
}

/// Where activity summaries and details come from.
///
/// Implemented by [`StravaClient`]; tests script their own.
#[allow(async_fn_in_trait)]
pub trait ActivitySource {
    /// One page of the athlete's activity list, newest-after `after` (Unix seconds).
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
        after: i64,
    ) -> Result<ApiResponse<Vec<ActivitySummary>>>;

    /// Full detail for one activity.
    async fn activity_detail(&self, id: u64) -> Result<ApiResponse<ActivityDetail>>;
}

// ============================================================================
// Response Classification
// ============================================================================

/// Decide what a raw HTTP response means.
///
/// - HTTP 429, or a `message` mentioning "Rate Limit Exceeded" → `RateLimited`
/// - an error payload (`message` with `errors`, or a non-2xx status) → `SyncError::Api`
/// - an unparseable 2xx body → `SyncError::MalformedResponse`
pub fn classify_response(status: u16, body: &[u8], context: &str) -> Result<ApiResponse<Value>> {
    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        return Ok(ApiResponse::RateLimited);
    }
    let success = (200..300).contains(&status);

    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) if success => {
            return Err(SyncError::malformed(context, format!("invalid JSON: {}", e)));
        }
        Err(_) => {
            return Err(SyncError::Api {
                message: body_snippet(body),
                status_code: Some(status),
            });
        }
    };

    if let Some(message) = value.get("message").and_then(Value::as_str) {
        if message.contains(RATE_LIMIT_MESSAGE) {
            return Ok(ApiResponse::RateLimited);
        }
        if !success || value.get("errors").is_some() {
            return Err(SyncError::Api {
                message: message.to_string(),
                status_code: Some(status),
            });
        }
    }

    if !success {
        return Err(SyncError::Api {
            message: body_snippet(body),
            status_code: Some(status),
        });
    }

    Ok(ApiResponse::Ok(value))
}

/// Parse an activity-list payload. Every entry must be a well-formed summary.
pub fn parse_summary_page(value: Value) -> Result<Vec<ActivitySummary>> {
    match value {
        Value::Array(items) => items.into_iter().map(ActivitySummary::from_json).collect(),
        _ => Err(SyncError::malformed(
            "activity list",
            "expected a JSON array of activities",
        )),
    }
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

fn retry_backoff(retries: u32) -> Duration {
    // 400ms, 800ms, 1.6s
    Duration::from_millis(200 * (1 << retries))
}

/// Wait before attempt `retries + 1`, or `None` once the budget is spent.
fn next_retry(retries: u32) -> Option<Duration> {
    (retries <= MAX_RETRIES).then(|| retry_backoff(retries))
}

/// Build the shared HTTP client.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| SyncError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            status_code: None,
        })
}

/// Send a request, retrying transport failures and 5xx, and classify the result.
pub(crate) async fn send_classified(
    request: reqwest::RequestBuilder,
    context: &str,
) -> Result<ApiResponse<Value>> {
    let mut retries = 0;
    let req_start = Instant::now();

    loop {
        let attempt = request.try_clone().ok_or_else(|| SyncError::Network {
            message: format!("{}: request body cannot be retried", context),
            status_code: None,
        })?;

        let failure = match attempt.send().await {
            Ok(resp) => {
                let status = resp.status();
                if is_transient(status) {
                    format!("HTTP {}", status)
                } else {
                    let bytes = resp.bytes().await.map_err(|e| SyncError::Network {
                        message: format!("{}: body download error: {}", context, e),
                        status_code: Some(status.as_u16()),
                    })?;
                    debug!(
                        "[Http] {} -> {} ({} bytes, {:?})",
                        context,
                        status,
                        bytes.len(),
                        req_start.elapsed()
                    );
                    return classify_response(status.as_u16(), &bytes, context);
                }
            }
            Err(e) => e.to_string(),
        };

        retries += 1;
        let Some(wait) = next_retry(retries) else {
            return Err(SyncError::Network {
                message: format!("{}: {} (after {} retries)", context, failure, MAX_RETRIES),
                status_code: None,
            });
        };
        warn!(
            "[Http] {} failed: {}, retry {} after {:?}",
            context, failure, retries, wait
        );
        tokio::time::sleep(wait).await;
    }
}

// ============================================================================
// Strava Client
// ============================================================================

/// Authenticated client for the activity endpoints.
pub struct StravaClient {
    client: Client,
    auth_header: String,
    base_url: String,
}

impl StravaClient {
    /// Create a client that sends `Authorization: Bearer <access_token>`.
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_auth_header(format!("Bearer {}", access_token))
    }

    /// Create a client with a pre-formatted auth header.
    pub fn with_auth_header(auth_header: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            auth_header,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API root (proxies, staging).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_request(&self, page: u32, per_page: u32, after: i64) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/athlete/activities", self.base_url))
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .query(&[
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
                ("after", after.to_string()),
            ])
    }

    fn detail_request(&self, id: u64) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/activities/{}", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .query(&[("includeAllEfforts", "true")])
    }
}

impl ActivitySource for StravaClient {
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
        after: i64,
    ) -> Result<ApiResponse<Vec<ActivitySummary>>> {
        let context = format!("activity list page {}", page);
        send_classified(self.list_request(page, per_page, after), &context)
            .await?
            .try_map(parse_summary_page)
    }

    async fn activity_detail(&self, id: u64) -> Result<ApiResponse<ActivityDetail>> {
        let context = format!("activity detail {}", id);
        send_classified(self.detail_request(id), &context)
            .await?
            .try_map(ActivityDetail::from_json)
    }
}
