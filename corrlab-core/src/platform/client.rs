//! Authenticated HTTP client for the research platform.
//!
//! Endpoints used:
//! - `GET /users/self/signals?stage=OS&limit=..&offset=..&order=-dateSubmitted`
//! - `GET /signals/{id}` — identifying metadata for one signal
//! - `GET /signals/{id}/recordsets/pnl` — schema-described PnL recordset
//!
//! The PnL endpoint answers with a `Retry-After` header while the recordset is
//! being materialized server-side. The client sleeps exactly the advertised
//! duration and retries, bounded by both an attempt count and a wall-clock
//! budget so a stuck recordset surfaces as an error instead of hanging the
//! batch.

use super::source::{
    PlatformError, SignalMeta, SignalPage, SignalSource, POWER_POOL_CLASSIFICATION,
};
use crate::domain::{PnlSeries, Region, SignalId};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Bounds on the Retry-After wait loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of rate-limited retries for one request.
    pub max_attempts: u32,
    /// Maximum cumulative sleep across those retries.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Blocking platform client with an injected auth token.
pub struct PlatformClient {
    client: reqwest::blocking::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl PlatformClient {
    /// Build a client for `base_url` authenticating with a bearer token.
    pub fn new(base_url: impl Into<String>, auth_token: &str) -> Result<Self, PlatformError> {
        Self::with_retry(base_url, auth_token, RetryPolicy::default())
    }

    pub fn with_retry(
        base_url: impl Into<String>,
        auth_token: &str,
        retry: RetryPolicy,
    ) -> Result<Self, PlatformError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {auth_token}"))
            .map_err(|_| PlatformError::Auth("token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// GET with bounded Retry-After handling.
    fn get_ready(&self, url: &str) -> Result<reqwest::blocking::Response, PlatformError> {
        let mut waited = Duration::ZERO;

        for _attempt in 0..=self.retry.max_attempts {
            let resp = self
                .client
                .get(url)
                .send()
                .map_err(|e| PlatformError::Network(e.to_string()))?;

            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);

            if retry_after > 0.0 {
                let wait = Duration::from_secs_f64(retry_after);
                if waited + wait > self.retry.max_wait {
                    break;
                }
                std::thread::sleep(wait);
                waited += wait;
                continue;
            }

            return Ok(resp);
        }

        Err(PlatformError::RateLimitExceeded {
            waited_secs: waited.as_secs(),
        })
    }

    fn check_status(
        resp: reqwest::blocking::Response,
        id: Option<&SignalId>,
    ) -> Result<reqwest::blocking::Response, PlatformError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PlatformError::Auth(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(PlatformError::SignalNotFound { id: id.to_string() });
            }
        }
        if !status.is_success() {
            return Err(PlatformError::Network(format!("HTTP {status}")));
        }
        Ok(resp)
    }
}

impl SignalSource for PlatformClient {
    fn list_signals(&self, limit: usize, offset: usize) -> Result<SignalPage, PlatformError> {
        let url = format!(
            "{}/users/self/signals?stage=OS&limit={limit}&offset={offset}&order=-dateSubmitted",
            self.base_url
        );
        let resp = Self::check_status(self.get_ready(&url)?, None)?;
        let listing: ListingResponse = resp
            .json()
            .map_err(|e| PlatformError::ResponseFormat(format!("signal listing: {e}")))?;
        Ok(SignalPage {
            count: listing.count,
            results: listing.results.into_iter().map(SignalMeta::from).collect(),
        })
    }

    fn fetch_pnl(&self, id: &SignalId) -> Result<PnlSeries, PlatformError> {
        let url = format!("{}/signals/{id}/recordsets/pnl", self.base_url);
        let resp = Self::check_status(self.get_ready(&url)?, Some(id))?;
        let recordset: PnlRecordset = resp
            .json()
            .map_err(|e| PlatformError::ResponseFormat(format!("pnl recordset for {id}: {e}")))?;
        parse_pnl_recordset(id, recordset)
    }

    fn locate_signal(&self, id: &SignalId) -> Result<SignalMeta, PlatformError> {
        let url = format!("{}/signals/{id}", self.base_url);
        let resp = Self::check_status(self.get_ready(&url)?, Some(id))?;
        let listed: ListedSignal = resp
            .json()
            .map_err(|e| PlatformError::ResponseFormat(format!("signal {id}: {e}")))?;
        Ok(SignalMeta::from(listed))
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListingResponse {
    count: usize,
    results: Vec<ListedSignal>,
}

#[derive(Debug, Deserialize)]
struct ListedSignal {
    id: String,
    settings: SignalSettings,
    #[serde(default)]
    classifications: Vec<Classification>,
}

#[derive(Debug, Deserialize)]
struct SignalSettings {
    region: String,
}

#[derive(Debug, Deserialize)]
struct Classification {
    name: String,
}

impl From<ListedSignal> for SignalMeta {
    fn from(listed: ListedSignal) -> Self {
        let power_pool = listed
            .classifications
            .iter()
            .any(|c| c.name == POWER_POOL_CLASSIFICATION);
        SignalMeta {
            id: SignalId::new(listed.id),
            region: Region::new(listed.settings.region),
            power_pool,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PnlRecordset {
    schema: RecordsetSchema,
    records: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RecordsetSchema {
    properties: Vec<SchemaProperty>,
}

#[derive(Debug, Deserialize)]
struct SchemaProperty {
    name: String,
}

/// Convert a schema-described recordset into a PnL series.
///
/// Column positions are resolved by name from the declared schema — the
/// platform does not guarantee field order.
fn parse_pnl_recordset(id: &SignalId, recordset: PnlRecordset) -> Result<PnlSeries, PlatformError> {
    let column = |name: &str| {
        recordset
            .schema
            .properties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| {
                PlatformError::ResponseFormat(format!("pnl schema for {id} missing '{name}' column"))
            })
    };
    let date_idx = column("date")?;
    let pnl_idx = column("pnl")?;

    let mut points = Vec::with_capacity(recordset.records.len());
    for record in &recordset.records {
        let date = record
            .get(date_idx)
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                PlatformError::ResponseFormat(format!("unparseable date in pnl record for {id}"))
            })?;
        // A null pnl is an undefined observation, not a format error.
        let value = record
            .get(pnl_idx)
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        points.push((date, value));
    }
    Ok(PnlSeries::from_points(points))
}
