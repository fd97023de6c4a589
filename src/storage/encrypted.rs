//! SQLite-backed store with AES-GCM encryption of every payload column.
//! Key derived from the store secret (SHA-256); nonce prepended, base64 encoded.

use crate::error::{Result, SentinelError};
use crate::records::RequestRecord;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| SentinelError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| SentinelError::Crypto("encryption failed".to_string()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| SentinelError::Crypto(format!("bad payload encoding: {}", e)))?;
    if raw.len() < NONCE_LEN {
        return Err(SentinelError::Crypto("payload too short".to_string()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| SentinelError::Crypto(e.to_string()))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|_| SentinelError::Crypto("decryption failed (wrong secret or tampered row)".to_string()))
}

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SecureStore {
    /// Open or create the database at `path`. Payloads are keyed by `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                request_id TEXT PRIMARY KEY,
                api_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_logs_api_ts ON logs(api_id, ts);
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                log_id TEXT NOT NULL,
                api_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                ts INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_api ON feedback(api_id, processed);
            CREATE TABLE IF NOT EXISTS training_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                api_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_training_api ON training_logs(api_id);
            CREATE TABLE IF NOT EXISTS artifacts (
                kind TEXT PRIMARY KEY,
                saved_at INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            "#,
        )?;
        let key = derive_key(secret);
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    pub(super) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SentinelError::Persistence("store lock poisoned".to_string()))
    }

    pub(super) fn seal(&self, plaintext: &[u8]) -> Result<String> {
        encrypt(&self.key, plaintext)
    }

    pub(super) fn unseal(&self, encoded: &str) -> Result<Vec<u8>> {
        decrypt(&self.key, encoded)
    }

    pub(super) fn seal_json<T: Serialize>(&self, value: &T) -> Result<String> {
        self.seal(&serde_json::to_vec(value)?)
    }

    pub(super) fn unseal_json<T: DeserializeOwned>(&self, encoded: &str) -> Result<T> {
        Ok(serde_json::from_slice(&self.unseal(encoded)?)?)
    }

    /// Insert or replace a log (payload stored encrypted)
    pub fn insert_log(&self, record: &RequestRecord) -> Result<()> {
        let enc = self.seal_json(record)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO logs (request_id, api_id, client_id, ts, payload_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.request_id,
                record.api_id,
                record.client_id,
                record.timestamp.timestamp_millis(),
                enc
            ],
        )?;
        Ok(())
    }

    /// Insert a batch in one transaction
    pub fn insert_logs(&self, records: &[RequestRecord]) -> Result<usize> {
        let sealed = records
            .iter()
            .map(|r| -> Result<_> { Ok((r, self.seal_json(r)?)) })
            .collect::<Result<Vec<_>>>()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO logs (request_id, api_id, client_id, ts, payload_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (r, enc) in &sealed {
                stmt.execute(params![r.request_id, r.api_id, r.client_id, r.timestamp.timestamp_millis(), enc])?;
            }
        }
        tx.commit()?;
        Ok(sealed.len())
    }

    /// Delete all logs for `api_id`, or every log when `None`
    pub fn clear_logs(&self, api_id: Option<&str>) -> Result<u64> {
        let n = self
            .conn()?
            .execute("DELETE FROM logs WHERE (?1 IS NULL OR api_id = ?1)", params![api_id])?;
        Ok(n as u64)
    }

    /// Retention: delete logs older than `before`
    pub fn prune_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let n = self
            .conn()?
            .execute("DELETE FROM logs WHERE ts < ?1", params![before.timestamp_millis()])?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_and_wrong_key_fails() {
        let key = derive_key(b"secret");
        let enc = encrypt(&key, b"hello").unwrap();
        assert_ne!(enc.as_bytes(), b"hello");
        assert_eq!(decrypt(&key, &enc).unwrap(), b"hello");
        assert!(decrypt(&derive_key(b"other"), &enc).is_err());
        assert!(decrypt(&key, "AAAA").is_err());
    }
}
