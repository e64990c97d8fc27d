//! YouTube Data API v3 search client with quota-aware key rotation

use crate::cursor::format_timestamp;
use crate::quota::{redact_key, QuotaLedger};
use crate::{IngestionError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Results requested per search call
pub const MAX_RESULTS: u32 = 5;

/// Why the platform rejected a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorReason {
    QuotaExceeded,
    DailyLimitExceeded,
    UserRateLimitExceeded,
    /// Any other reported reason
    Other(String),
    /// Error body did not carry a reason
    Unparseable,
}

impl ApiErrorReason {
    /// Read the first `error.errors[].reason` out of an error body
    pub fn parse(body: &str) -> Self {
        let parsed: std::result::Result<ErrorEnvelope, _> = serde_json::from_str(body);
        let reason = parsed
            .ok()
            .and_then(|envelope| envelope.error.errors.into_iter().next())
            .and_then(|detail| detail.reason);

        match reason.as_deref() {
            Some("quotaExceeded") => Self::QuotaExceeded,
            Some("dailyLimitExceeded") => Self::DailyLimitExceeded,
            Some("userRateLimitExceeded") => Self::UserRateLimitExceeded,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Unparseable,
        }
    }

    /// Whether the key should be blocked and the next one tried
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::DailyLimitExceeded | Self::UserRateLimitExceeded
        )
    }
}

impl std::fmt::Display for ApiErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "quotaExceeded"),
            Self::DailyLimitExceeded => write!(f, "dailyLimitExceeded"),
            Self::UserRateLimitExceeded => write!(f, "userRateLimitExceeded"),
            Self::Other(reason) => write!(f, "{}", reason),
            Self::Unparseable => write!(f, "unparseable"),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// How a fetch ended; every variant is terminal for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStop {
    /// A key returned 200
    Succeeded { key: String },
    /// A non-quota error halted rotation
    ApiError { status: u16, reason: ApiErrorReason },
    /// Every candidate key was blocked or quota-exhausted
    KeysExhausted,
}

/// Items returned by a fetch plus why it stopped
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub items: Vec<serde_json::Value>,
    pub stop: FetchStop,
}

impl FetchOutcome {
    fn empty(stop: FetchStop) -> Self {
        Self {
            items: Vec::new(),
            stop,
        }
    }
}

/// Search client
pub struct YouTubeClient {
    client: Client,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Search for videos published after `published_after`, rotating through
    /// `keys` until one succeeds, one fails for a non-quota reason, or all are
    /// exhausted.
    ///
    /// HTTP error statuses never surface as `Err`. Transport failures and an
    /// undecodable 200 body do.
    #[instrument(skip(self, keys, ledger), fields(key_count = keys.len()))]
    pub async fn fetch(
        &self,
        search_term: &str,
        published_after: DateTime<Utc>,
        keys: &[String],
        ledger: &QuotaLedger,
    ) -> Result<FetchOutcome> {
        let published_after = format_timestamp(published_after);
        let max_results = MAX_RESULTS.to_string();
        let url = format!("{}/search", self.base_url);

        for key in keys {
            if ledger.is_blocked(key).await? {
                continue;
            }

            debug!(api_key = %redact_key(key), "Requesting search page");

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("part", "snippet"),
                    ("q", search_term),
                    ("type", "video"),
                    ("order", "date"),
                    ("maxResults", max_results.as_str()),
                    ("key", key.as_str()),
                    ("publishedAfter", published_after.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::OK {
                let body: serde_json::Value = response.json().await?;
                let items = extract_items(body)?;
                info!(
                    api_key = %redact_key(key),
                    item_count = items.len(),
                    "Fetched search results"
                );
                return Ok(FetchOutcome {
                    items,
                    stop: FetchStop::Succeeded { key: key.clone() },
                });
            }

            let body = response.text().await?;
            let reason = ApiErrorReason::parse(&body);

            if reason.is_quota() {
                ledger.block(key).await?;
                continue;
            }

            error!(
                api_key = %redact_key(key),
                status = status.as_u16(),
                reason = %reason,
                "Search API error, halting key rotation"
            );
            return Ok(FetchOutcome::empty(FetchStop::ApiError {
                status: status.as_u16(),
                reason,
            }));
        }

        warn!("No usable API key for this run");
        Ok(FetchOutcome::empty(FetchStop::KeysExhausted))
    }
}

/// Pull `items` out of a 200 body; a missing list is empty
fn extract_items(body: serde_json::Value) -> Result<Vec<serde_json::Value>> {
    let serde_json::Value::Object(mut map) = body else {
        return Err(IngestionError::MalformedResponse(
            "search response is not a JSON object".to_string(),
        ));
    };

    match map.remove("items") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(items),
        Some(_) => Err(IngestionError::MalformedResponse(
            "search response `items` is not a list".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quota_reasons() {
        let body = |reason: &str| {
            json!({"error": {"code": 403, "errors": [{"reason": reason}]}}).to_string()
        };

        assert_eq!(
            ApiErrorReason::parse(&body("quotaExceeded")),
            ApiErrorReason::QuotaExceeded
        );
        assert_eq!(
            ApiErrorReason::parse(&body("dailyLimitExceeded")),
            ApiErrorReason::DailyLimitExceeded
        );
        assert_eq!(
            ApiErrorReason::parse(&body("userRateLimitExceeded")),
            ApiErrorReason::UserRateLimitExceeded
        );
        assert!(ApiErrorReason::parse(&body("quotaExceeded")).is_quota());
    }

    #[test]
    fn test_parse_non_quota_reasons() {
        let forbidden = json!({"error": {"errors": [{"reason": "forbidden"}]}}).to_string();
        let reason = ApiErrorReason::parse(&forbidden);
        assert_eq!(reason, ApiErrorReason::Other("forbidden".to_string()));
        assert!(!reason.is_quota());

        assert_eq!(ApiErrorReason::parse("<html>"), ApiErrorReason::Unparseable);
        assert_eq!(
            ApiErrorReason::parse(r#"{"error": {"errors": []}}"#),
            ApiErrorReason::Unparseable
        );
        assert!(!ApiErrorReason::Unparseable.is_quota());
    }

    #[test]
    fn test_extract_items() {
        let items = extract_items(json!({"items": [{"id": 1}, {"id": 2}]})).unwrap();
        assert_eq!(items.len(), 2);

        assert!(extract_items(json!({"kind": "youtube#searchListResponse"}))
            .unwrap()
            .is_empty());
        assert!(extract_items(json!({"items": "nope"})).is_err());
        assert!(extract_items(json!([1, 2])).is_err());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = YouTubeClient::new("http://localhost:1234/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
