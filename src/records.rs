//! Request records as stored by the ingestion side. Immutable once stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One observed API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub request_id: String,
    pub client_id: String,
    /// Dotted-quad IPv4; malformed values are tolerated downstream
    pub ip: String,
    pub api_id: String,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Records at or after `now - hours_back`.
pub fn within_hours(records: Vec<RequestRecord>, now: DateTime<Utc>, hours_back: i64) -> Vec<RequestRecord> {
    let cutoff = now - Duration::hours(hours_back);
    records.into_iter().filter(|r| r.timestamp >= cutoff).collect()
}
