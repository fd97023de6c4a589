//! Network identity heuristics: CIDR range inference, rotation scoring and
//! suspicious-range matching over a client's IP history.

pub mod cidr;
mod analyzer;

pub use analyzer::{IpProfile, NetworkAnalyzer, NetworkFinding};
pub use cidr::NetworkType;
