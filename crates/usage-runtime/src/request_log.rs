//! History of requests sent to the vendor API.
//!
//! The store is a trait so callers decide where history lives; the retrieval
//! driver only appends to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header carrying the vendor API key.
pub const API_KEY_HEADER: &str = "X-ND-TOKEN";

/// Stand-in written to the log instead of the real key.
pub const MASKED_API_KEY: &str = "********";

/// One request and, once known, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// Epoch milliseconds when the request was sent.
    pub timestamp: i64,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestLog {
    /// A `POST` of `body` to `url`, with the API key masked.
    pub fn post(url: &str, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(API_KEY_HEADER.to_string(), MASKED_API_KEY.to_string());
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            url: url.to_string(),
            method: "POST".to_string(),
            headers,
            body,
            response: None,
            status: None,
            error: None,
        }
    }
}

/// Where request history is kept.
pub trait RequestLogStore {
    fn append(&mut self, entry: RequestLog);
    fn entries(&self) -> &[RequestLog];
    fn clear(&mut self);
}

/// Process-local request history.
#[derive(Debug, Default, Clone)]
pub struct MemoryRequestLog {
    entries: Vec<RequestLog>,
}

impl MemoryRequestLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestLogStore for MemoryRequestLog {
    fn append(&mut self, entry: RequestLog) {
        self.entries.push(entry);
    }

    fn entries(&self) -> &[RequestLog] {
        &self.entries
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
