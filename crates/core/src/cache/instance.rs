//! Named cache instances and their stored responses.
//!
//! A cache instance maps request identity (method + canonical URL) to a
//! stored response. Instances are created lazily on first open and persist
//! until explicitly deleted, so a populated shell survives worker restarts.

use super::connection::CacheDb;
use super::hash::request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A response held by a cache instance.
///
/// Stored verbatim at precache time and served unchanged on a hit; no
/// freshness metadata is kept because lookups never revalidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers_json: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

/// Handle to one named cache instance.
///
/// Cheap to clone; all operations go through the shared store connection.
#[derive(Debug, Clone)]
pub struct CacheInstance {
    db: CacheDb,
    id: i64,
    name: String,
}

impl CacheDb {
    /// Open the instance with the given name, creating it if absent.
    pub async fn open_instance(&self, name: &str) -> Result<CacheInstance, Error> {
        let owned = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![owned, created_at],
                )?;
                let id = conn.query_row("SELECT id FROM caches WHERE name = ?1", params![owned], |row| {
                    row.get(0)
                })?;
                Ok(id)
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheInstance { db: self.clone(), id, name: name.to_string() })
    }

    /// Enumerate all existing instance names, oldest first.
    pub async fn list_instances(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the instance with the given name and all of its entries.
    ///
    /// Returns false if no such instance existed.
    pub async fn delete_instance(&self, name: &str) -> Result<bool, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![owned])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheInstance {
    /// The version-tagged name this instance was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or update the entry for the response's request identity.
    ///
    /// Uses UPSERT semantics so a retried install converges on the latest
    /// fetched copy of each asset.
    pub async fn put(&self, response: &StoredResponse) -> Result<(), Error> {
        let id = self.id;
        let key = request_key(&response.method, &response.url);
        let response = response.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                        cache_id, key, method, url, status, content_type,
                        headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(cache_id, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        content_type = excluded.content_type,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        id,
                        key,
                        &response.method,
                        &response.url,
                        response.status,
                        &response.content_type,
                        &response.headers_json,
                        &response.body,
                        &response.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the stored response for a request identity.
    ///
    /// Returns None on a miss; never consults the network.
    pub async fn get(&self, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        let id = self.id;
        let key = request_key(method, url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, content_type, headers_json, body, stored_at
                     FROM entries WHERE cache_id = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![id, key], |row| {
                    Ok(StoredResponse {
                        method: row.get(0)?,
                        url: row.get(1)?,
                        status: row.get(2)?,
                        content_type: row.get(3)?,
                        headers_json: row.get(4)?,
                        body: row.get(5)?,
                        stored_at: row.get(6)?,
                    })
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries currently held by this instance.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        let id = self.id;
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE cache_id = ?1", params![id], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
