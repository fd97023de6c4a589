//! Training corpus table backing feedback retrains.

use super::{CorpusStore, SecureStore};
use crate::error::Result;
use crate::records::RequestRecord;
use rusqlite::params;
use tracing::warn;

impl CorpusStore for SecureStore {
    /// Delete and insert in one transaction; a failure leaves the previous corpus.
    fn replace_training_corpus(&self, api_id: &str, records: &[RequestRecord]) -> Result<usize> {
        let sealed = records
            .iter()
            .map(|r| -> Result<_> { Ok((r.timestamp.timestamp_millis(), self.seal_json(r)?)) })
            .collect::<Result<Vec<_>>>()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM training_logs WHERE api_id = ?1", params![api_id])?;
        {
            let mut stmt = tx.prepare("INSERT INTO training_logs (api_id, ts, payload_enc) VALUES (?1, ?2, ?3)")?;
            for (ts, enc) in &sealed {
                stmt.execute(params![api_id, ts, enc])?;
            }
        }
        tx.commit()?;
        Ok(sealed.len())
    }

    /// Corpus rows in insertion order
    fn training_corpus(&self, api_id: &str) -> Result<Vec<RequestRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT seq, payload_enc FROM training_logs WHERE api_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![api_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (seq, enc) = row?;
            match self.unseal_json::<RequestRecord>(&enc) {
                Ok(r) => out.push(r),
                Err(e) => warn!(seq, error = %e, "skipping malformed corpus entry"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;

    #[test]
    fn replacement_is_wholesale_per_api() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("store.db"), b"s").unwrap();
        store
            .replace_training_corpus("api-1", &[record("a", "c", "10.0.0.1", 0), record("a", "c", "10.0.0.1", 0)])
            .unwrap();
        store.replace_training_corpus("api-2", &[record("z", "c", "10.0.0.1", 0)]).unwrap();
        assert_eq!(store.training_corpus("api-1").unwrap().len(), 2);

        store.replace_training_corpus("api-1", &[record("b", "c", "10.0.0.1", 0)]).unwrap();
        let corpus = store.training_corpus("api-1").unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].request_id, "b");
        assert_eq!(store.training_corpus("api-2").unwrap().len(), 1);
    }
}
