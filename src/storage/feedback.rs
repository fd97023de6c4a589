//! Feedback table: sealed judgments keyed by feedback id.

use super::{FeedbackStore, SecureStore};
use crate::error::Result;
use crate::feedback::FeedbackRecord;
use rusqlite::params;
use tracing::warn;

impl FeedbackStore for SecureStore {
    fn insert_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        let enc = self.seal_json(record)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO feedback (id, log_id, api_id, kind, processed, ts, payload_enc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.log_id,
                record.api_id,
                record.kind.as_str(),
                record.processed,
                record.timestamp.timestamp_millis(),
                enc
            ],
        )?;
        Ok(())
    }

    fn feedback(&self, api_id: Option<&str>) -> Result<Vec<FeedbackRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, processed, payload_enc FROM feedback
             WHERE (?1 IS NULL OR api_id = ?1) ORDER BY ts ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![api_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, processed, enc) = row?;
            match self.unseal_json::<FeedbackRecord>(&enc) {
                // The column is authoritative; payloads are written once.
                Ok(mut fb) => {
                    fb.processed = processed;
                    out.push(fb);
                }
                Err(e) => warn!(feedback_id = %id, error = %e, "skipping malformed feedback entry"),
            }
        }
        Ok(out)
    }

    fn mark_processed(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare("UPDATE feedback SET processed = 1 WHERE id = ?1 AND processed = 0")?;
            for id in ids {
                changed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}
