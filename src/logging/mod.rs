//! Structured logging

mod format;

pub use format::{AnomalyLogLine, StructuredLogger};
