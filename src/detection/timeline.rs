//! Groups detected anomalies into fixed-width time slots for charting.

use super::{DetectionResult, ScoredLog};
use crate::error::{Result, SentinelError};
use crate::model::ModelKind;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyBrief {
    pub request_id: String,
    pub client_id: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub score: f64,
    pub description: String,
}

impl From<&ScoredLog> for AnomalyBrief {
    fn from(s: &ScoredLog) -> Self {
        Self {
            request_id: s.record.request_id.clone(),
            client_id: s.record.client_id.clone(),
            ip: s.record.ip.clone(),
            method: s.record.method.clone(),
            path: s.record.path.clone(),
            status: s.record.status,
            score: s.anomaly_score,
            description: s.anomaly_description.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    /// Slot start
    pub timestamp: DateTime<Utc>,
    pub anomaly_count: usize,
    pub total_score: f64,
    pub avg_score: f64,
    pub anomalies: Vec<AnomalyBrief>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub total_intervals: usize,
    pub max_anomalies_per_interval: usize,
    pub avg_anomalies_per_interval: f64,
    /// Highest per-slot average score
    pub max_score: f64,
    /// Mean of the per-slot average scores
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub model_used: ModelKind,
    pub total_anomalies: usize,
    pub interval_minutes: u32,
    pub threshold_used: f64,
    /// Ordered by slot start
    pub buckets: Vec<TimelineBucket>,
    pub summary: TimelineSummary,
}

/// Start of the slot holding `ts`: seconds dropped and the minute floored to
/// a multiple of `interval_minutes` within its hour.
pub fn slot_start(ts: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let minute = ts.minute() / interval_minutes * interval_minutes;
    ts.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(minute))
        .unwrap_or(ts)
}

impl Timeline {
    pub fn build(result: &DetectionResult, interval_minutes: u32) -> Result<Self> {
        if interval_minutes == 0 {
            return Err(SentinelError::InvalidArgument(
                "timeline interval must be at least one minute".to_string(),
            ));
        }
        let mut slots: BTreeMap<DateTime<Utc>, TimelineBucket> = BTreeMap::new();
        for a in &result.anomalies {
            let start = slot_start(a.record.timestamp, interval_minutes);
            let bucket = slots.entry(start).or_insert_with(|| TimelineBucket {
                timestamp: start,
                anomaly_count: 0,
                total_score: 0.0,
                avg_score: 0.0,
                anomalies: Vec::new(),
            });
            bucket.anomaly_count += 1;
            bucket.total_score += a.anomaly_score;
            bucket.avg_score = bucket.total_score / bucket.anomaly_count as f64;
            bucket.anomalies.push(AnomalyBrief::from(a));
        }
        let buckets: Vec<TimelineBucket> = slots.into_values().collect();
        let summary = summarize(&buckets);
        Ok(Self {
            model_used: result.model_used,
            total_anomalies: result.anomalies_detected,
            interval_minutes,
            threshold_used: result.threshold_used,
            buckets,
            summary,
        })
    }
}

fn summarize(buckets: &[TimelineBucket]) -> TimelineSummary {
    if buckets.is_empty() {
        return TimelineSummary::default();
    }
    let n = buckets.len() as f64;
    TimelineSummary {
        total_intervals: buckets.len(),
        max_anomalies_per_interval: buckets.iter().map(|b| b.anomaly_count).max().unwrap_or(0),
        avg_anomalies_per_interval: buckets.iter().map(|b| b.anomaly_count).sum::<usize>() as f64 / n,
        max_score: buckets.iter().map(|b| b.avg_score).fold(f64::NEG_INFINITY, f64::max),
        avg_score: buckets.iter().map(|b| b.avg_score).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ScoreStatistics;
    use crate::features::FeatureRow;
    use crate::records::fixtures::record;
    use chrono::TimeZone;

    fn anomaly(id: &str, minutes: i64, score: f64) -> ScoredLog {
        let r = record(id, "c", "10.0.0.1", minutes);
        ScoredLog {
            index: 0,
            features: FeatureRow::from_record(&r, 0, 0),
            record: r,
            anomaly_score: score,
            is_anomaly: true,
            anomaly_description: Some(format!("desc {}", id)),
            network_findings: Vec::new(),
        }
    }

    fn result(anomalies: Vec<ScoredLog>) -> DetectionResult {
        DetectionResult {
            model_used: ModelKind::Iforest,
            logs_analyzed: 50,
            anomalies_detected: anomalies.len(),
            anomaly_rate: 0.0,
            score_statistics: ScoreStatistics::default(),
            anomalies,
            normal_logs: Vec::new(),
            threshold_used: 0.12,
            model_threshold: 0.0,
        }
    }

    #[test]
    fn slots_floor_within_the_hour() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 47, 31).unwrap();
        assert_eq!(slot_start(ts, 30), Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap());
        assert_eq!(slot_start(ts, 15), Utc.with_ymd_and_hms(2024, 3, 5, 14, 45, 0).unwrap());
    }

    #[test]
    fn buckets_and_summary() {
        // base 14:30; +5 and +20 share the 14:30 slot, +40 lands at 15:00
        let r = result(vec![anomaly("a", 5, 0.2), anomaly("b", 20, 0.4), anomaly("c", 40, 0.5)]);
        let t = Timeline::build(&r, 30).unwrap();
        assert_eq!(t.total_anomalies, 3);
        assert_eq!(t.buckets.len(), 2);
        assert_eq!(t.buckets[0].anomaly_count, 2);
        assert!((t.buckets[0].avg_score - 0.3).abs() < 1e-12);
        assert_eq!(t.buckets[0].anomalies[1].request_id, "b");
        assert_eq!(t.buckets[1].timestamp, Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap());
        assert_eq!(t.summary.total_intervals, 2);
        assert_eq!(t.summary.max_anomalies_per_interval, 2);
        assert_eq!(t.summary.avg_anomalies_per_interval, 1.5);
        assert_eq!(t.summary.max_score, 0.5);
        assert!((t.summary.avg_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_and_invalid() {
        let t = Timeline::build(&result(Vec::new()), 30).unwrap();
        assert!(t.buckets.is_empty());
        assert_eq!(t.summary, TimelineSummary::default());
        assert!(Timeline::build(&result(Vec::new()), 0).is_err());
    }
}
