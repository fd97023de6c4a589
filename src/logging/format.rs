//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::detection::ScoredLog;
use crate::model::ModelKind;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One detected anomaly, flattened for log shippers
#[derive(Debug, Serialize)]
pub struct AnomalyLogLine<'a> {
    pub ts: String,
    pub level: &'a str,
    pub target: &'a str,
    pub message: &'a str,
    pub request_id: &'a str,
    pub api_id: &'a str,
    pub client_id: &'a str,
    pub ip: &'a str,
    pub kind: &'a str,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

impl<'a> AnomalyLogLine<'a> {
    pub fn from_scored(entry: &'a ScoredLog, kind: ModelKind) -> Self {
        Self {
            ts: entry.record.timestamp.to_rfc3339(),
            level: "WARN",
            target: "api_sentinel::detection",
            message: "anomaly detected",
            request_id: &entry.record.request_id,
            api_id: &entry.record.api_id,
            client_id: &entry.record.client_id,
            ip: &entry.record.ip,
            kind: kind.as_str(),
            score: entry.anomaly_score,
            description: entry.anomaly_description.as_deref(),
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber on stderr, level from RUST_LOG or default.
    /// Stdout stays free for command output.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    /// Emit a single structured line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use crate::records::fixtures::record;

    #[test]
    fn anomaly_line_is_one_json_object() {
        let r = record("r9", "bob", "10.1.1.1", 0);
        let entry = ScoredLog {
            index: 3,
            features: FeatureRow::from_record(&r, 0, 0),
            record: r,
            anomaly_score: 0.5,
            is_anomaly: true,
            anomaly_description: Some("odd".to_string()),
            network_findings: Vec::new(),
        };
        let mut out = Vec::new();
        StructuredLogger::emit_json(&AnomalyLogLine::from_scored(&entry, ModelKind::Knn), &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["request_id"], "r9");
        assert_eq!(v["kind"], "knn");
        assert_eq!(v["description"], "odd");
    }
}
