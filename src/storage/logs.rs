//! Request log table: sealed records with plaintext filter columns.

use super::{LogStore, SecureStore};
use crate::error::Result;
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::warn;

impl LogStore for SecureStore {
    fn get(&self, api_id: Option<&str>, since: Option<DateTime<Utc>>, limit: Option<usize>) -> Result<Vec<RequestRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT request_id, payload_enc FROM logs
             WHERE (?1 IS NULL OR api_id = ?1) AND (?2 IS NULL OR ts >= ?2)
             ORDER BY ts DESC, request_id DESC LIMIT ?3",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![api_id, since.map(|t| t.timestamp_millis()), limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, enc) = row?;
            match self.unseal_json::<RequestRecord>(&enc) {
                Ok(r) => out.push(r),
                Err(e) => warn!(request_id = %id, error = %e, "skipping malformed log entry"),
            }
        }
        out.reverse();
        Ok(out)
    }

    fn count(&self, api_id: Option<&str>, since: Option<DateTime<Utc>>) -> Result<usize> {
        let n: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM logs WHERE (?1 IS NULL OR api_id = ?1) AND (?2 IS NULL OR ts >= ?2)",
            params![api_id, since.map(|t| t.timestamp_millis())],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn find(&self, request_id: &str) -> Result<Option<RequestRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT payload_enc FROM logs WHERE request_id = ?1")?;
        let mut rows = stmt.query(params![request_id])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            return match self.unseal_json(&enc) {
                Ok(r) => Ok(Some(r)),
                Err(e) => {
                    warn!(request_id, error = %e, "stored log is unreadable");
                    Ok(None)
                }
            };
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;
    use chrono::Duration;

    fn open() -> (tempfile::TempDir, SecureStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("store.db"), b"test-secret").unwrap();
        (dir, store)
    }

    #[test]
    fn get_filters_and_orders_oldest_first() {
        let (_dir, store) = open();
        let mut other = record("x", "bob", "10.0.0.9", 1);
        other.api_id = "api-2".to_string();
        store
            .insert_logs(&[record("b", "alice", "10.0.0.1", 5), record("a", "alice", "10.0.0.1", 0), other])
            .unwrap();

        let logs = store.get(Some("api-1"), None, None).unwrap();
        assert_eq!(logs.iter().map(|r| r.request_id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(store.count(None, None).unwrap(), 3);

        let latest = store.get(Some("api-1"), None, Some(1)).unwrap();
        assert_eq!(latest[0].request_id, "b");

        let since = logs[0].timestamp + Duration::minutes(1);
        assert_eq!(store.count(Some("api-1"), Some(since)).unwrap(), 1);
    }

    #[test]
    fn find_and_prune() {
        let (_dir, store) = open();
        let r = record("a", "alice", "10.0.0.1", 0);
        store.insert_log(&r).unwrap();
        assert_eq!(store.find("a").unwrap(), Some(r.clone()));
        assert_eq!(store.find("missing").unwrap(), None);
        assert_eq!(store.prune_before(r.timestamp + Duration::seconds(1)).unwrap(), 1);
        assert_eq!(store.count(None, None).unwrap(), 0);
    }

    #[test]
    fn rows_from_another_secret_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        SecureStore::open(&path, b"first").unwrap().insert_log(&record("a", "c", "10.0.0.1", 0)).unwrap();
        let reopened = SecureStore::open(&path, b"second").unwrap();
        assert!(reopened.get(None, None, None).unwrap().is_empty());
        assert_eq!(reopened.count(None, None).unwrap(), 1);
    }
}
