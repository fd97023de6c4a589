//! Human-readable anomaly descriptions. Wording is pluggable through
//! [`DescriptionGenerator`]; detection never fails because of it.

use crate::error::Result;
use crate::features::FeatureRow;
use crate::model::ModelKind;
use crate::network::{cidr, NetworkFinding, NetworkType};
use crate::records::RequestRecord;
use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub trait DescriptionGenerator: Send + Sync {
    fn describe(
        &self,
        record: &RequestRecord,
        score: f64,
        features: &FeatureRow,
        all_records: &[RequestRecord],
        findings: &[NetworkFinding],
    ) -> Result<String>;
}

/// Used when the generator fails
pub fn default_description(kind: ModelKind, score: f64) -> String {
    format!("Anomaly detected by model {} (score {:.3})", kind, score)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    Performance,
    Security,
    Network,
    Behavioral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn from_adjusted(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Frequencies of the record's attributes within the analyzed batch
struct Context {
    ip_frequency: f64,
    client_frequency: f64,
    method_frequency: f64,
    is_private_ip: bool,
    business_hours: bool,
    weekend: bool,
}

impl Context {
    fn new(record: &RequestRecord, all: &[RequestRecord]) -> Self {
        let share = |hits: usize| if all.is_empty() { 0.0 } else { hits as f64 / all.len() as f64 };
        let hour = record.timestamp.hour();
        Self {
            ip_frequency: share(all.iter().filter(|r| r.ip == record.ip).count()),
            client_frequency: share(all.iter().filter(|r| r.client_id == record.client_id).count()),
            method_frequency: share(all.iter().filter(|r| r.method == record.method).count()),
            is_private_ip: cidr::network_type(&record.ip) == NetworkType::Private,
            business_hours: (8..=18).contains(&hour),
            weekend: matches!(record.timestamp.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// Deterministic rule-and-template describer
#[derive(Debug, Clone, Default)]
pub struct TemplateDescriber;

impl TemplateDescriber {
    fn category(record: &RequestRecord, features: &FeatureRow, ctx: &Context) -> AnomalyCategory {
        if record.is_server_error() {
            AnomalyCategory::Performance
        } else if features.is_client_error == 1
            || ctx.ip_frequency < 0.01
            || ctx.client_frequency < 0.01
            || features.is_admin_path == 1
            || features.is_auth_path == 1
        {
            AnomalyCategory::Security
        } else if !ctx.is_private_ip {
            AnomalyCategory::Network
        } else {
            AnomalyCategory::Behavioral
        }
    }

    fn severity(record: &RequestRecord, score: f64, features: &FeatureRow, ctx: &Context) -> Severity {
        let mut adjusted = score;
        if record.is_server_error() {
            adjusted += 0.2;
        }
        if !ctx.is_private_ip {
            adjusted += 0.1;
        }
        if !ctx.business_hours {
            adjusted += 0.05;
        }
        if features.is_admin_path == 1 {
            adjusted += 0.15;
        }
        Severity::from_adjusted(adjusted)
    }

    fn details(record: &RequestRecord, features: &FeatureRow, ctx: &Context, category: AnomalyCategory) -> Vec<String> {
        let mut d = Vec::new();
        match category {
            AnomalyCategory::Security => {
                if features.is_admin_path == 1 {
                    d.push("admin area access".to_string());
                }
                if features.is_auth_path == 1 {
                    d.push("authentication attempt".to_string());
                }
                if !ctx.is_private_ip {
                    d.push(format!("public IP ({})", record.ip));
                }
                if ctx.client_frequency < 0.01 {
                    d.push("unrecognized client".to_string());
                }
                if ctx.method_frequency < 0.05 {
                    d.push(format!("unusual HTTP method ({})", record.method));
                }
                if features.is_client_error == 1 {
                    d.push(format!("client error ({})", record.status));
                }
            }
            AnomalyCategory::Network => {
                d.push(format!("external origin ({})", record.ip));
                if ctx.ip_frequency < 0.01 {
                    d.push("unrecognized IP".to_string());
                }
                if ctx.weekend {
                    d.push("weekend activity".to_string());
                }
                if !ctx.business_hours {
                    d.push("outside business hours".to_string());
                }
            }
            AnomalyCategory::Performance => {
                d.push(format!("server error ({})", record.status));
                if features.path_depth > 3 {
                    d.push("very deep path".to_string());
                }
            }
            AnomalyCategory::Behavioral => {
                if !ctx.business_hours {
                    d.push("atypical time".to_string());
                }
                if ctx.weekend {
                    d.push("weekend activity".to_string());
                }
                if ctx.method_frequency < 0.1 {
                    d.push(format!("rarely used method ({})", record.method));
                }
            }
        }
        d
    }
}

impl DescriptionGenerator for TemplateDescriber {
    fn describe(
        &self,
        record: &RequestRecord,
        score: f64,
        features: &FeatureRow,
        all_records: &[RequestRecord],
        findings: &[NetworkFinding],
    ) -> Result<String> {
        let ctx = Context::new(record, all_records);
        let category = Self::category(record, features, &ctx);
        let severity = Self::severity(record, score, features, &ctx);
        let details = Self::details(record, features, &ctx, category);
        let details = if details.is_empty() {
            "anomalous pattern detected".to_string()
        } else {
            details.join(", ")
        };
        let headline = match category {
            AnomalyCategory::Performance => "Performance anomaly detected",
            AnomalyCategory::Security => "Suspicious activity detected",
            AnomalyCategory::Network => "Anomalous network activity detected",
            AnomalyCategory::Behavioral => "Behavior change detected",
        };
        let mut text = format!(
            "[{}] {}: {} (score {:.3}, {})",
            severity.label(),
            headline,
            details,
            score,
            record.timestamp.format("%d/%m/%Y %H:%M")
        );
        if !findings.is_empty() {
            let notes: Vec<String> = findings.iter().map(|f| f.to_string()).collect();
            text.push_str("; network: ");
            text.push_str(&notes.join("; "));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;

    fn row(r: &RequestRecord) -> FeatureRow {
        FeatureRow::from_record(r, 0, 0)
    }

    #[test]
    fn admin_path_from_public_ip_is_security() {
        let mut r = record("x", "mallory", "8.8.4.4", 0);
        r.path = "/admin/users".to_string();
        let all: Vec<RequestRecord> = (0..200)
            .map(|i| record(&format!("n{}", i), "alice", "10.0.0.1", i))
            .chain(std::iter::once(r.clone()))
            .collect();
        let text = TemplateDescriber.describe(&r, 0.36, &row(&r), &all, &[]).unwrap();
        assert!(text.starts_with("[HIGH] Suspicious activity detected: admin area access"), "{}", text);
        assert!(text.contains("public IP (8.8.4.4)"));
        assert!(text.contains("score 0.360"));
    }

    #[test]
    fn server_error_is_performance_and_findings_are_appended() {
        let mut r = record("x", "alice", "10.0.0.1", 0);
        r.status = 503;
        let findings = vec![NetworkFinding::ManyRanges { count: 5 }];
        let text = TemplateDescriber.describe(&r, 0.25, &row(&r), &[r.clone()], &findings).unwrap();
        assert!(text.starts_with("[MEDIUM] Performance anomaly detected: server error (503)"), "{}", text);
        assert!(text.ends_with("; network: client using many IP ranges (5 ranges)"));
    }

    #[test]
    fn fallback_text() {
        assert_eq!(default_description(ModelKind::Lof, 0.25), "Anomaly detected by model lof (score 0.250)");
    }
}
