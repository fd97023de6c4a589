//! API Sentinel: batch anomaly detection over tenant API access logs.
//!
//! Modular structure:
//! - [`features`] — Request record to fixed-schema feature rows
//! - [`model`] — Pluggable outlier estimators, training and artifact lifecycle
//! - [`detection`] — Two-stage thresholded detection, comparison, timelines
//! - [`feedback`] — Analyst judgments and feedback-driven retraining
//! - [`network`] — Client IP range and rotation heuristics
//! - [`storage`] — Encrypted local storage
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod describe;
pub mod detection;
pub mod error;
pub mod features;
pub mod feedback;
pub mod logging;
pub mod model;
pub mod network;
pub mod records;
pub mod sentinel;
pub mod storage;

pub use config::SentinelConfig;
pub use detection::{DetectionEngine, DetectionResult};
pub use error::{Result, SentinelError};
pub use features::{FeatureExtractor, FeatureRow};
pub use feedback::{FeedbackKind, FeedbackLoop};
pub use logging::StructuredLogger;
pub use model::{ModelKind, ModelStore};
pub use records::RequestRecord;
pub use sentinel::Sentinel;
pub use storage::SecureStore;
