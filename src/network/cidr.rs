//! IPv4 range helpers: membership, network type, range and provider inference.

use crate::records::RequestRecord;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

/// Canonical private blocks, in the order they are checked
pub const PRIVATE_BLOCKS: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Private,
    Loopback,
    LinkLocal,
    Multicast,
    Public,
    Unknown,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Private => "private",
            NetworkType::Loopback => "loopback",
            NetworkType::LinkLocal => "link_local",
            NetworkType::Multicast => "multicast",
            NetworkType::Public => "public",
            NetworkType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_ipv4(ip: &str) -> Option<Ipv4Addr> {
    ip.trim().parse().ok()
}

/// `false` when either side does not parse
pub fn contains(cidr: &str, ip: &str) -> bool {
    match (cidr.parse::<Ipv4Net>(), parse_ipv4(ip)) {
        (Ok(net), Some(addr)) => net.contains(&addr),
        _ => false,
    }
}

/// Priority: private, loopback, link-local, multicast, public.
pub fn network_type(ip: &str) -> NetworkType {
    let Some(addr) = parse_ipv4(ip) else {
        return NetworkType::Unknown;
    };
    if addr.is_private() {
        NetworkType::Private
    } else if addr.is_loopback() {
        NetworkType::Loopback
    } else if addr.is_link_local() {
        NetworkType::LinkLocal
    } else if addr.is_multicast() {
        NetworkType::Multicast
    } else {
        NetworkType::Public
    }
}

/// Ranges a client's IPs cover: a private block once it holds
/// `private_min_ips` of them, and a `N.0.0.0/8` pseudo-range for every first
/// octet shared by at least `public_min_ips` non-private addresses.
pub fn infer_ranges<'a>(
    ips: impl IntoIterator<Item = &'a str>,
    private_min_ips: usize,
    public_min_ips: usize,
) -> BTreeSet<Ipv4Net> {
    let addrs: BTreeSet<Ipv4Addr> = ips.into_iter().filter_map(parse_ipv4).collect();
    let mut ranges = BTreeSet::new();

    for block in PRIVATE_BLOCKS.iter().filter_map(|b| b.parse::<Ipv4Net>().ok()) {
        if addrs.iter().filter(|a| block.contains(*a)).count() >= private_min_ips {
            ranges.insert(block);
        }
    }

    let mut by_octet: BTreeMap<u8, usize> = BTreeMap::new();
    for a in addrs.iter().filter(|a| !a.is_private()) {
        *by_octet.entry(a.octets()[0]).or_default() += 1;
    }
    for (octet, n) in by_octet {
        if n >= public_min_ips {
            if let Ok(net) = Ipv4Net::new(Ipv4Addr::new(octet, 0, 0, 0), 8) {
                ranges.insert(net);
            }
        }
    }
    ranges
}

/// Pseudo-provider buckets (`ASN_<first octet>`) for non-private addresses
pub fn provider_buckets<'a>(ips: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    ips.into_iter()
        .filter_map(parse_ipv4)
        .filter(|a| !a.is_private())
        .map(|a| format!("ASN_{}", a.octets()[0]))
        .collect()
}

/// Share of consecutive requests (by time) that switched IP: `k / (n - 1)`,
/// 0.0 for fewer than two requests, capped at 1.0.
pub fn rotation_frequency(records: &[RequestRecord]) -> f64 {
    if records.len() < 2 {
        return 0.0;
    }
    let mut sorted: Vec<&RequestRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);
    let changes = sorted.windows(2).filter(|w| w[0].ip != w[1].ip).count();
    (changes as f64 / (sorted.len() - 1) as f64).min(1.0)
}
