//! A simple persistent LRU cache, implemented using `sqlite3`. This is not
//! built for speed, because it's caching expensive AI requests that are made
//! over the network. Instead, we focus on reliability.

use std::{marker::PhantomData, path::PathBuf};

use anyhow::{anyhow, Context as _};
use log::{debug, trace};
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

/// Where we keep our cache database by default.
pub(crate) fn default_cache_path() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("could not find cache directory"))?
        .join("codeforge");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("could not create {}", dir.display()))?;
    Ok(dir.join("cache.sqlite3"))
}

/// A simple persistent LRU cache, implemented using `sqlite3`.
///
/// We store the cache in `path`, in a table `codeforge_cache` with the
/// columns `cache_name`, `key`, `value` and `last_used`.
pub(crate) struct Cache<K, V> {
    path: PathBuf,
    cache_name: String,
    approx_max_entries: u64,
    _phantom: PhantomData<(K, V)>,
}

impl<K, V> Cache<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Make sure our cache database is set up.
    pub(crate) fn new(
        path: PathBuf,
        cache_name: &str,
        approx_max_entries: u64,
    ) -> Result<Self> {
        let conn = Connection::open(&path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS codeforge_cache (
                cache_name TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                last_used TIMESTAMP DEFAULT(STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW')),
                CONSTRAINT cache_pk PRIMARY KEY (cache_name, key)
            )",
            [],
        )?;
        Ok(Self {
            path,
            cache_name: cache_name.to_owned(),
            approx_max_entries,
            _phantom: PhantomData,
        })
    }

    /// Get a value from the cache.
    pub(crate) fn get(&self, key: &K) -> Result<Option<V>> {
        // Don't check the cache if we're not supposed to cache anything.
        if self.approx_max_entries == 0 {
            return Ok(None);
        }

        let conn = Connection::open(&self.path)?;
        let key = bincode::serialize(key)?;
        let mut stmt = conn.prepare(
            "SELECT value FROM codeforge_cache
            WHERE cache_name = ?1 AND key = ?2
            ORDER BY last_used DESC
            LIMIT 1",
        )?;
        let result = stmt
            .query_map((self.cache_name.as_str(), &key), |row| {
                Ok(bincode::deserialize(&row.get::<_, Vec<u8>>(0)?).unwrap())
            })?
            .next();
        match result {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(Error::new(e).context("could not read cache")),
            None => Ok(None),
        }
    }

    /// Put a value into the cache.
    pub(crate) fn put(&self, key: &K, value: &V) -> Result<()> {
        // Don't cache anything if we're not supposed to cache anything.
        if self.approx_max_entries == 0 {
            return Ok(());
        }

        let conn = Connection::open(&self.path)?;
        let key = bincode::serialize(key)?;
        let value = bincode::serialize(value)?;

        conn.execute("BEGIN", [])?;
        conn.execute(
            "INSERT OR REPLACE INTO codeforge_cache (cache_name, key, value)
            VALUES (?1, ?2, ?3)",
            (self.cache_name.as_str(), &key, &value),
        )
        .context("could not write cache")?;

        // Count the number of entries in the cache.
        let count: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM codeforge_cache WHERE cache_name = ?1",
                [self.cache_name.as_str()],
                |row| row.get(0),
            )
            .context("could not count cache entries")?;

        // If we have too many entries, delete the oldest ones. This is
        // ridiculously slow, so we amortize it.
        trace!(
            "cache count: {} (approx. max: {})",
            count,
            self.approx_max_entries
        );
        if count > self.approx_max_entries + self.approx_max_entries / 10 {
            debug!("cleaning cache");
            conn.execute(
                "DELETE FROM codeforge_cache
                WHERE cache_name = ?1
                AND key NOT IN (
                    SELECT key FROM codeforge_cache
                    WHERE cache_name = ?1
                    ORDER BY last_used DESC
                    LIMIT ?2
                )",
                (self.cache_name.as_str(), self.approx_max_entries),
            )?;
        }
        conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Remove a single entry from the cache, if present. Used to invalidate
    /// card art so it gets regenerated.
    pub(crate) fn remove(&self, key: &K) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        let key = bincode::serialize(key)?;
        conn.execute(
            "DELETE FROM codeforge_cache WHERE cache_name = ?1 AND key = ?2",
            (self.cache_name.as_str(), &key),
        )
        .context("could not remove cache entry")?;
        Ok(())
    }

    /// Remove every entry in this cache's namespace.
    pub(crate) fn clear(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let removed = conn.execute(
            "DELETE FROM codeforge_cache WHERE cache_name = ?1",
            [self.cache_name.as_str()],
        )
        .context("could not clear cache")?;
        debug!("cleared {} entries from {}", removed, self.cache_name);
        Ok(removed as u64)
    }
}
