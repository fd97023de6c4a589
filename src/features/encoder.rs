//! Label tables for categorical fields. Fitted once at training, frozen afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Encoding for values the table has never seen
pub const UNKNOWN_LABEL: i64 = -1;

pub const FIELD_METHOD: &str = "method";
pub const FIELD_CLIENT_ID: &str = "clientId";

/// HTTP verbs always present in the method table
pub const KNOWN_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Sorted, de-duplicated classes; a value's label is its index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    classes: Vec<String>,
}

impl LabelTable {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn encode(&self, value: &str) -> i64 {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as i64)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Field name → fitted table. Owned by exactly one model artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoders {
    tables: BTreeMap<String, LabelTable>,
}

impl CategoricalEncoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self, field: &str) -> bool {
        self.tables.contains_key(field)
    }

    /// Fit `field` from `values` unless it already has a table. Returns
    /// whether a table was created.
    pub fn fit_field<'a>(&mut self, field: &str, values: impl IntoIterator<Item = &'a str>) -> bool {
        if self.is_fitted(field) {
            return false;
        }
        let table = if field == FIELD_METHOD {
            LabelTable::fit(KNOWN_METHODS.into_iter().chain(values))
        } else {
            LabelTable::fit(values)
        };
        self.tables.insert(field.to_string(), table);
        true
    }

    /// Label for `value`, or [`UNKNOWN_LABEL`] when the field or value is unseen.
    pub fn encode(&self, field: &str, value: &str) -> i64 {
        self.tables
            .get(field)
            .map(|t| t.encode(value))
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
