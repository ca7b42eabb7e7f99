use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::gnames::{NameVerification, NameVerifier};
use crate::http::ServiceError;
use crate::util::{ensure_directory, now_utc_string};

pub fn open_cache(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    let connection = Connection::open(path)
        .with_context(|| format!("failed to open verification cache {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

pub fn cached_entry_count(connection: &Connection) -> Result<i64> {
    let count = connection
        .query_row("SELECT COUNT(*) FROM verifications", [], |row| row.get(0))
        .context("failed to count cached verifications")?;
    Ok(count)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS verifications (
              name TEXT NOT NULL,
              sources TEXT NOT NULL,
              response_json TEXT NOT NULL,
              fetched_at TEXT NOT NULL,
              PRIMARY KEY (name, sources)
            );
            ",
        )
        .context("failed to create verification cache schema")
}

fn sources_key(sources: &[u32]) -> String {
    sources
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Memoizes a [`NameVerifier`] by queried name and source restriction.
///
/// Every answer is kept in memory for the life of the run. Only answers that
/// carry a best result are written to sqlite, so a later run asks the service
/// again for names that did not match.
pub struct CachedVerifier<V> {
    inner: V,
    memory: Mutex<HashMap<(String, String), NameVerification>>,
    store: Option<Mutex<Connection>>,
}

impl<V: NameVerifier> CachedVerifier<V> {
    pub fn new(inner: V, store: Option<Connection>) -> Self {
        Self {
            inner,
            memory: Mutex::new(HashMap::new()),
            store: store.map(Mutex::new),
        }
    }

    fn load(&self, name: &str, sources: &str) -> Option<NameVerification> {
        let store = self.store.as_ref()?;
        let connection = store.lock();
        let raw: Option<String> = connection
            .query_row(
                "SELECT response_json FROM verifications WHERE name = ?1 AND sources = ?2",
                params![name, sources],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|err| {
                warn!(name, error = %err, "verification cache lookup failed");
                None
            });

        match serde_json::from_str(&raw?) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(name, error = %err, "discarding unreadable cached verification");
                None
            }
        }
    }

    fn persist(&self, name: &str, sources: &str, verification: &NameVerification) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let json = match serde_json::to_string(verification) {
            Ok(json) => json,
            Err(err) => {
                warn!(name, error = %err, "failed to serialize verification for cache");
                return;
            }
        };

        let connection = store.lock();
        if let Err(err) = connection.execute(
            "INSERT OR REPLACE INTO verifications (name, sources, response_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, sources, json, now_utc_string()],
        ) {
            warn!(name, error = %err, "failed to persist verification");
        }
    }
}

impl<V: NameVerifier> NameVerifier for CachedVerifier<V> {
    fn verify(&self, name: &str, sources: &[u32]) -> Result<NameVerification, ServiceError> {
        let key = (name.to_string(), sources_key(sources));
        if let Some(hit) = self.memory.lock().get(&key) {
            return Ok(hit.clone());
        }

        if let Some(stored) = self.load(&key.0, &key.1) {
            debug!(name, "verification served from cache");
            self.memory.lock().insert(key, stored.clone());
            return Ok(stored);
        }

        let fresh = self.inner.verify(name, sources)?;
        if fresh.best_result.is_some() {
            self.persist(&key.0, &key.1, &fresh);
        }
        self.memory.lock().insert(key, fresh.clone());
        Ok(fresh)
    }
}
