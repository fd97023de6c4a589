//! Feature extraction pipeline: records → encoders → fixed-schema rows.

use super::{CategoricalEncoders, FeatureMatrix, FeatureRow, FIELD_CLIENT_ID, FIELD_METHOD, UNKNOWN_LABEL};
use crate::error::{Result, SentinelError};
use crate::records::RequestRecord;
use tracing::debug;

pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract one row per record.
    ///
    /// With `state == None` a fresh encoder state is fitted from this batch
    /// (training). With `Some`, the given state is used frozen: nothing is
    /// refitted and unseen values encode as [`UNKNOWN_LABEL`] (detection).
    pub fn extract(
        records: &[RequestRecord],
        state: Option<CategoricalEncoders>,
    ) -> Result<(FeatureMatrix, CategoricalEncoders)> {
        if records.is_empty() {
            return Err(SentinelError::InsufficientData(
                "no records to extract features from".to_string(),
            ));
        }
        let encoders = match state {
            Some(frozen) => frozen,
            None => Self::fit_encoders(records),
        };
        let matrix = Self::transform(records, &encoders);
        Ok((matrix, encoders))
    }

    fn fit_encoders(records: &[RequestRecord]) -> CategoricalEncoders {
        let mut enc = CategoricalEncoders::new();
        enc.fit_field(FIELD_METHOD, records.iter().map(|r| r.method.as_str()));
        enc.fit_field(FIELD_CLIENT_ID, records.iter().map(|r| r.client_id.as_str()));
        enc
    }

    fn transform(records: &[RequestRecord], encoders: &CategoricalEncoders) -> FeatureMatrix {
        let mut unknown = 0usize;
        let rows = records
            .iter()
            .map(|r| {
                let method = encoders.encode(FIELD_METHOD, &r.method);
                let client = encoders.encode(FIELD_CLIENT_ID, &r.client_id);
                if method == UNKNOWN_LABEL || client == UNKNOWN_LABEL {
                    unknown += 1;
                }
                FeatureRow::from_record(r, method, client)
            })
            .collect();
        if unknown > 0 {
            debug!(unknown, total = records.len(), "records with unseen categorical values");
        }
        FeatureMatrix { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;

    #[test]
    fn empty_input_is_insufficient() {
        let err = FeatureExtractor::extract(&[], None).unwrap_err();
        assert!(matches!(err, SentinelError::InsufficientData(_)));
    }

    #[test]
    fn malformed_ip_keeps_record() {
        let records = vec![record("a", "c", "garbage", 0), record("b", "c", "10.0.0.1", 1)];
        let (m, _) = FeatureExtractor::extract(&records, None).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.rows[0].ip_numeric, 0);
    }

    #[test]
    fn frozen_state_is_not_refitted() {
        let train = vec![record("a", "alice", "10.0.0.1", 0)];
        let (_, enc) = FeatureExtractor::extract(&train, None).unwrap();

        let detect = vec![record("b", "bob", "10.0.0.1", 0)];
        let (m, after) = FeatureExtractor::extract(&detect, Some(enc.clone())).unwrap();
        assert_eq!(m.rows[0].client_id_encoded, UNKNOWN_LABEL);
        assert_eq!(after, enc);
    }

    #[test]
    fn extraction_is_deterministic() {
        let records = vec![record("a", "alice", "10.0.0.1", 0), record("b", "bob", "10.0.0.2", 5)];
        let (m1, enc) = FeatureExtractor::extract(&records, None).unwrap();
        let (m2, _) = FeatureExtractor::extract(&records, Some(enc)).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(m1.to_array().ncols(), super::super::FEATURE_COUNT);
    }
}
