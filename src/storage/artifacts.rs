//! Model artifact table, one sealed payload per kind.

use super::SecureStore;
use crate::error::Result;
use crate::model::{ArtifactPersistence, ModelKind};
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::warn;

impl ArtifactPersistence for SecureStore {
    fn put(&self, kind: ModelKind, saved_at: DateTime<Utc>, payload: &[u8]) -> Result<()> {
        let enc = self.seal(payload)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO artifacts (kind, saved_at, payload_enc) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), saved_at.timestamp_millis(), enc],
        )?;
        Ok(())
    }

    fn fetch(&self, kind: ModelKind) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT payload_enc FROM artifacts WHERE kind = ?1")?;
        let mut rows = stmt.query(params![kind.as_str()])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            return Ok(Some(self.unseal(&enc)?));
        }
        Ok(None)
    }

    fn remove(&self, kind: ModelKind) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM artifacts WHERE kind = ?1", params![kind.as_str()])?;
        Ok(n > 0)
    }

    fn kinds(&self) -> Result<Vec<ModelKind>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT kind FROM artifacts ORDER BY kind")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter_map(|n| match n.parse::<ModelKind>() {
                Ok(k) => Some(k),
                Err(e) => {
                    warn!(error = %e, "ignoring artifact row");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_bytes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("store.db"), b"s").unwrap();
        store.put(ModelKind::Lof, Utc::now(), b"{\"x\":1}").unwrap();
        assert_eq!(store.fetch(ModelKind::Lof).unwrap().unwrap(), b"{\"x\":1}");
        assert_eq!(store.fetch(ModelKind::Knn).unwrap(), None);
        assert_eq!(store.kinds().unwrap(), vec![ModelKind::Lof]);
        assert!(store.remove(ModelKind::Lof).unwrap());
        assert!(store.kinds().unwrap().is_empty());
    }
}
