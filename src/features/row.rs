//! One request's numeric features, in fixed declared order.

use crate::records::RequestRecord;
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub const FEATURE_COUNT: usize = 17;

/// Column names, same order as [`FeatureRow::to_vector`]
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "hour",
    "day_of_week",
    "minute",
    "status_code",
    "method_encoded",
    "path_length",
    "path_depth",
    "ip_numeric",
    "client_id_encoded",
    "is_api_path",
    "is_admin_path",
    "is_auth_path",
    "is_error",
    "is_server_error",
    "is_client_error",
    "is_success",
    "is_redirect",
];

const AUTH_MARKERS: [&str; 3] = ["/login", "/auth", "/token"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub minute: u32,
    /// 5xx remapped to 200
    pub status_code: u16,
    pub method_encoded: i64,
    pub path_length: usize,
    pub path_depth: usize,
    pub ip_numeric: u32,
    pub client_id_encoded: i64,
    pub is_api_path: u8,
    pub is_admin_path: u8,
    pub is_auth_path: u8,
    pub is_error: u8,
    pub is_server_error: u8,
    pub is_client_error: u8,
    pub is_success: u8,
    pub is_redirect: u8,
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

/// Big-endian numeric IPv4; anything unparsable becomes 0.
pub(crate) fn ip_to_numeric(ip: &str) -> u32 {
    ip.trim().parse::<Ipv4Addr>().map(u32::from).unwrap_or(0)
}

impl FeatureRow {
    /// Build a row from a record and already-encoded categorical values.
    pub fn from_record(record: &RequestRecord, method_encoded: i64, client_id_encoded: i64) -> Self {
        // Server-side failures say nothing about the client; treat as success.
        let status = if record.is_server_error() { 200 } else { record.status };
        let path = record.path.as_str();
        let lower = path.to_lowercase();
        let ts = record.timestamp;

        Self {
            hour: ts.hour(),
            day_of_week: ts.weekday().num_days_from_monday(),
            minute: ts.minute(),
            status_code: status,
            method_encoded,
            path_length: path.chars().count(),
            path_depth: path.matches('/').count(),
            ip_numeric: ip_to_numeric(&record.ip),
            client_id_encoded,
            is_api_path: flag(path.contains("/api/")),
            is_admin_path: flag(path.contains("/admin")),
            is_auth_path: flag(AUTH_MARKERS.iter().any(|m| lower.contains(m))),
            is_error: flag(status >= 400),
            is_server_error: flag(status >= 500),
            is_client_error: flag((400..500).contains(&status)),
            is_success: flag((200..300).contains(&status)),
            is_redirect: flag((300..400).contains(&status)),
        }
    }

    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.hour),
            f64::from(self.day_of_week),
            f64::from(self.minute),
            f64::from(self.status_code),
            self.method_encoded as f64,
            self.path_length as f64,
            self.path_depth as f64,
            f64::from(self.ip_numeric),
            self.client_id_encoded as f64,
            f64::from(self.is_api_path),
            f64::from(self.is_admin_path),
            f64::from(self.is_auth_path),
            f64::from(self.is_error),
            f64::from(self.is_server_error),
            f64::from(self.is_client_error),
            f64::from(self.is_success),
            f64::from(self.is_redirect),
        ]
    }
}
