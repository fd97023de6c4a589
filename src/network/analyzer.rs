//! Per-client network identity checks over recent request history.

use super::cidr::{self, NetworkType};
use crate::config::NetworkConfig;
use crate::records::RequestRecord;
use chrono::Duration;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// One suspicious observation about a client's current address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkFinding {
    OutsideKnownRanges { ip: String },
    ManyRanges { count: usize },
    RecentRangeChurn { count: usize, hours: i64 },
    SuspiciousRange { ip: String, range: String },
    NetworkTypeChange { to: NetworkType },
    MultipleProviders { count: usize },
    ExcessiveRotation { frequency: f64 },
}

impl fmt::Display for NetworkFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFinding::OutsideKnownRanges { ip } => write!(f, "IP outside the client's known ranges ({})", ip),
            NetworkFinding::ManyRanges { count } => write!(f, "client using many IP ranges ({} ranges)", count),
            NetworkFinding::RecentRangeChurn { hours, .. } => {
                write!(f, "frequent IP range changes (last {} hours)", hours)
            }
            NetworkFinding::SuspiciousRange { ip, range } => {
                write!(f, "IP from suspicious range detected ({} in {})", ip, range)
            }
            NetworkFinding::NetworkTypeChange { to } => write!(f, "network type change ({})", to),
            NetworkFinding::MultipleProviders { .. } => f.write_str("IPs from multiple providers/regions detected"),
            NetworkFinding::ExcessiveRotation { frequency } => {
                write!(f, "excessive IP rotation detected ({:.0}% of requests)", frequency * 100.0)
            }
        }
    }
}

/// Range, type, provider and rotation profile of a set of client logs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpProfile {
    pub known_ranges: BTreeSet<Ipv4Net>,
    pub network_types: BTreeSet<NetworkType>,
    pub provider_buckets: BTreeSet<String>,
    pub rotation_frequency: f64,
}

pub struct NetworkAnalyzer {
    config: NetworkConfig,
    suspicious: Vec<Ipv4Net>,
}

impl NetworkAnalyzer {
    pub fn new(config: NetworkConfig) -> Self {
        let suspicious = config
            .suspicious_ranges
            .iter()
            .filter_map(|r| match r.parse::<Ipv4Net>() {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!(range = %r, error = %e, "ignoring invalid suspicious range");
                    None
                }
            })
            .collect();
        Self { config, suspicious }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn profile(&self, logs: &[RequestRecord]) -> IpProfile {
        let ips: BTreeSet<&str> = logs.iter().map(|r| r.ip.as_str()).collect();
        IpProfile {
            known_ranges: cidr::infer_ranges(
                ips.iter().copied(),
                self.config.private_range_min_ips,
                self.config.public_octet_min_ips,
            ),
            network_types: ips.iter().map(|ip| cidr::network_type(ip)).collect(),
            provider_buckets: cidr::provider_buckets(ips.iter().copied()),
            rotation_frequency: cidr::rotation_frequency(logs),
        }
    }

    /// Findings for the latest log of `client_id` in `window_logs`, judged
    /// against that client's earlier logs within `lookback_hours`.
    pub fn analyze(&self, client_id: &str, window_logs: &[RequestRecord], lookback_hours: i64) -> Vec<NetworkFinding> {
        let current = window_logs
            .iter()
            .filter(|r| r.client_id == client_id)
            .max_by_key(|r| r.timestamp);
        match current {
            Some(current) => self.analyze_record(current, window_logs, lookback_hours),
            None => Vec::new(),
        }
    }

    /// Findings for `current` against the same client's logs in `all_logs`
    /// from the preceding `lookback_hours`. Empty with fewer than two.
    pub fn analyze_record(
        &self,
        current: &RequestRecord,
        all_logs: &[RequestRecord],
        lookback_hours: i64,
    ) -> Vec<NetworkFinding> {
        let cutoff = current.timestamp - Duration::hours(lookback_hours);
        let history: Vec<RequestRecord> = all_logs
            .iter()
            .filter(|r| r.client_id == current.client_id && r.timestamp >= cutoff && r.timestamp < current.timestamp)
            .cloned()
            .collect();
        if history.len() < 2 {
            return Vec::new();
        }

        let cfg = &self.config;
        let profile = self.profile(&history);
        let mut findings = Vec::new();

        let current_addr = cidr::parse_ipv4(&current.ip);
        if !profile.known_ranges.is_empty() {
            let inside = current_addr
                .map(|a| profile.known_ranges.iter().any(|n| n.contains(&a)))
                .unwrap_or(false);
            if !inside {
                findings.push(NetworkFinding::OutsideKnownRanges { ip: current.ip.clone() });
            }
        }

        if profile.known_ranges.len() > cfg.max_known_ranges {
            findings.push(NetworkFinding::ManyRanges {
                count: profile.known_ranges.len(),
            });
        }

        let recent_cutoff = current.timestamp - Duration::hours(cfg.recent_window_hours);
        let recent: Vec<RequestRecord> = history
            .iter()
            .filter(|r| r.timestamp >= recent_cutoff)
            .cloned()
            .collect();
        let recent_ranges = self.profile(&recent).known_ranges.len();
        if recent_ranges > cfg.max_recent_ranges {
            findings.push(NetworkFinding::RecentRangeChurn {
                count: recent_ranges,
                hours: cfg.recent_window_hours,
            });
        }

        if let Some(addr) = current_addr {
            if let Some(net) = self.suspicious.iter().find(|n| n.contains(&addr)) {
                findings.push(NetworkFinding::SuspiciousRange {
                    ip: current.ip.clone(),
                    range: net.to_string(),
                });
            }
        }

        let current_type = cidr::network_type(&current.ip);
        if !profile.network_types.is_empty() && !profile.network_types.contains(&current_type) {
            findings.push(NetworkFinding::NetworkTypeChange { to: current_type });
        }

        if profile.provider_buckets.len() > cfg.max_provider_buckets {
            findings.push(NetworkFinding::MultipleProviders {
                count: profile.provider_buckets.len(),
            });
        }

        if profile.rotation_frequency > cfg.rotation_threshold {
            findings.push(NetworkFinding::ExcessiveRotation {
                frequency: profile.rotation_frequency,
            });
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;

    fn analyzer() -> NetworkAnalyzer {
        NetworkAnalyzer::new(NetworkConfig::default())
    }

    #[test]
    fn fewer_than_two_prior_logs_yield_nothing() {
        let logs = vec![record("a", "c", "10.0.0.1", 0), record("b", "c", "8.8.8.8", 5)];
        assert!(analyzer().analyze("c", &logs, 24).is_empty());
        assert!(analyzer().analyze("nobody", &logs, 24).is_empty());
    }

    #[test]
    fn jump_to_public_resolver_range() {
        let logs = vec![
            record("a", "c", "10.0.0.1", 0),
            record("a2", "c", "10.0.0.1", 2),
            record("b", "c", "10.0.0.2", 5),
            record("d", "other", "52.1.1.1", 6),
            record("e", "c", "8.8.8.8", 10),
        ];
        let f = analyzer().analyze("c", &logs, 24);
        assert_eq!(
            f,
            vec![
                NetworkFinding::OutsideKnownRanges {
                    ip: "8.8.8.8".to_string()
                },
                NetworkFinding::SuspiciousRange {
                    ip: "8.8.8.8".to_string(),
                    range: "8.8.8.0/24".to_string()
                },
                NetworkFinding::NetworkTypeChange { to: NetworkType::Public },
            ]
        );
        assert_eq!(f[2].to_string(), "network type change (public)");
    }

    #[test]
    fn rotating_public_addresses() {
        let ips = ["31.1.1.1", "45.1.1.1", "62.1.1.1", "31.2.2.2", "45.2.2.2", "62.2.2.2", "77.1.1.1", "77.2.2.2"];
        let mut logs: Vec<RequestRecord> = ips
            .iter()
            .enumerate()
            .map(|(i, ip)| record(&format!("r{}", i), "c", ip, i as i64))
            .collect();
        logs.push(record("now", "c", "31.3.3.3", 30));
        let f = analyzer().analyze("c", &logs, 24);
        assert!(f.contains(&NetworkFinding::ManyRanges { count: 4 }));
        assert!(f.contains(&NetworkFinding::RecentRangeChurn { count: 4, hours: 2 }));
        assert!(f.contains(&NetworkFinding::MultipleProviders { count: 4 }));
        assert!(f.contains(&NetworkFinding::ExcessiveRotation { frequency: 1.0 }));
        assert!(!f.iter().any(|x| matches!(x, NetworkFinding::OutsideKnownRanges { .. })));
    }

    #[test]
    fn lookback_bounds_history() {
        let logs = vec![
            record("a", "c", "10.0.0.1", 0),
            record("b", "c", "10.0.0.2", 1),
            record("e", "c", "8.8.8.8", 60 * 30),
        ];
        assert!(analyzer().analyze("c", &logs, 24).is_empty());
        assert!(!analyzer().analyze("c", &logs, 48).is_empty());
    }
}
