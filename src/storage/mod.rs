//! Encrypted local storage for request logs, feedback, the training corpus
//! and model artifacts.

mod artifacts;
mod corpus;
mod encrypted;
mod feedback;
mod logs;

pub use encrypted::SecureStore;

use crate::error::Result;
use crate::feedback::FeedbackRecord;
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};

/// Read side of the request log. Entries that cannot be decoded are skipped.
pub trait LogStore: Send + Sync {
    /// Logs oldest first. With `limit`, only the most recent `limit` entries.
    fn get(&self, api_id: Option<&str>, since: Option<DateTime<Utc>>, limit: Option<usize>) -> Result<Vec<RequestRecord>>;
    fn count(&self, api_id: Option<&str>, since: Option<DateTime<Utc>>) -> Result<usize>;
    fn find(&self, request_id: &str) -> Result<Option<RequestRecord>>;
}

pub trait FeedbackStore: Send + Sync {
    fn insert_feedback(&self, record: &FeedbackRecord) -> Result<()>;
    /// Feedback oldest first, all APIs when `api_id` is `None`
    fn feedback(&self, api_id: Option<&str>) -> Result<Vec<FeedbackRecord>>;
    /// Flag the given feedback ids processed; returns rows changed
    fn mark_processed(&self, ids: &[String]) -> Result<usize>;
}

/// Per-API training corpus, replaced wholesale
pub trait CorpusStore: Send + Sync {
    fn replace_training_corpus(&self, api_id: &str, records: &[RequestRecord]) -> Result<usize>;
    fn training_corpus(&self, api_id: &str) -> Result<Vec<RequestRecord>>;
}
