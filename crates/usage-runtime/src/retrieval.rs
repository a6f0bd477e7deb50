//! Paginated retrieval of usage data from the vendor API.
//!
//! The HTTP client itself lives behind [`TelemetrySource`]; this module owns
//! the request shape, cursor handling, pacing and request logging.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use usage_core::models::Channel;
use usage_core::settings::ApiSettings;
use usage_core::{Result, UsageError};
use usage_data::naming::response_file_name;

use crate::request_log::{RequestLog, RequestLogStore};

/// Delay between consecutive page requests.
pub const DEFAULT_PACE: Duration = Duration::from_millis(1_000);

// ── Wire types ────────────────────────────────────────────────────────────────

/// Body of one usage request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRequest {
    pub device_uuid: String,
    pub scopes: Vec<Channel>,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
}

impl UsageRequest {
    /// First page for `device_uuid`, requesting every channel.
    pub fn new(device_uuid: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            scopes: Channel::ALL.to_vec(),
            start_time,
            end_time,
            next: None,
        }
    }
}

/// Status and parsed body returned by a [`TelemetrySource`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Value,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The pagination cursor, if the body carries a non-null `next`.
    pub fn next_cursor(&self) -> Option<&Value> {
        self.body.get("next").filter(|v| !v.is_null())
    }
}

/// Anything that can POST a [`UsageRequest`] to the vendor endpoint.
#[async_trait]
pub trait TelemetrySource: Send {
    async fn fetch(&mut self, settings: &ApiSettings, request: &UsageRequest)
        -> Result<FetchResponse>;
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// What to retrieve and how fast.
#[derive(Debug, Clone)]
pub struct RetrievalPlan {
    pub device_uuid: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Sequence number given to the first response.
    pub first_sequence: u32,
    pub pace: Duration,
}

impl RetrievalPlan {
    pub fn new(device_uuid: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            start_time,
            end_time,
            first_sequence: 1,
            pace: DEFAULT_PACE,
        }
    }
}

/// One successful page.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedResponse {
    pub sequence: u32,
    pub file_name: String,
    pub body: Value,
}

/// Request pages until the API stops returning a `next` cursor.
///
/// Every page re-sends the original time window together with the previous
/// cursor. Each request is appended to `log`; a failed request is logged with
/// its error and ends the retrieval. `on_response` sees every successful page
/// in order. Returns the number of pages retrieved.
pub async fn retrieve_all<S, L, F>(
    source: &mut S,
    settings: &ApiSettings,
    plan: &RetrievalPlan,
    log: &mut L,
    mut on_response: F,
) -> Result<usize>
where
    S: TelemetrySource,
    L: RequestLogStore,
    F: FnMut(RetrievedResponse) -> Result<()>,
{
    settings.validate()?;

    let mut next: Option<Value> = None;
    let mut sequence = plan.first_sequence;
    let mut pages = 0usize;

    loop {
        if pages > 0 && !plan.pace.is_zero() {
            tokio::time::sleep(plan.pace).await;
        }

        let request = UsageRequest {
            next: next.take(),
            ..UsageRequest::new(plan.device_uuid.clone(), plan.start_time, plan.end_time)
        };
        let mut entry = RequestLog::post(&settings.endpoint_url, serde_json::to_value(&request)?);
        debug!("Requesting page {} for {}", sequence, plan.device_uuid);

        let response = match source.fetch(settings, &request).await {
            Ok(response) => response,
            Err(e) => {
                entry.error = Some(e.to_string());
                log.append(entry);
                return Err(e);
            }
        };

        entry.status = Some(response.status);
        entry.response = Some(response.body.clone());
        if !response.is_success() {
            let err = UsageError::Api(response.status);
            warn!("{}", err);
            entry.error = Some(err.to_string());
            log.append(entry);
            return Err(err);
        }
        log.append(entry);

        next = response.next_cursor().cloned();
        on_response(RetrievedResponse {
            sequence,
            file_name: response_file_name(&plan.device_uuid, sequence),
            body: response.body,
        })?;
        pages += 1;
        sequence = sequence.saturating_add(1);

        if next.is_none() {
            break;
        }
    }

    info!("Retrieved {} pages for {}", pages, plan.device_uuid);
    Ok(pages)
}

/// Write a retrieved page as pretty JSON into `dir`.
pub async fn save_response(dir: &Path, response: &RetrievedResponse) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&response.file_name);
    let contents = serde_json::to_string_pretty(&response.body)?;
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
