use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

const ALLERGENS_KEY: &str = "allergens";

/// One row of scan history. Append-only; the health and allergen flags are
/// snapshots taken when the scan was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: i64,
    pub barcode: String,
    /// Name of the cached product, if it is still in the cache
    pub product_name: Option<String>,
    pub scanned_at: DateTime<Utc>,
    pub is_healthy: bool,
    pub has_allergen_conflict: bool,
}

/// Counts over the whole scan history, taken in one read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub total: u64,
    pub healthy: u64,
    pub allergen_conflicts: u64,
}

/// Local product cache, scan history and user preferences on SQLite.
///
/// Product rows are keyed by barcode and replaced wholesale on upsert, so the
/// last write wins and a barcode never appears twice. The payload itself is
/// stored as JSON; `name` is duplicated into its own column for history joins.
///
/// Every method takes the connection lock for a single statement or a single
/// transaction and releases it before returning. Safe to share behind an `Arc`.
pub struct CacheManager {
    conn: Mutex<Connection>,
}

impl CacheManager {
    /// Open (or create) the cache database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("Failed to enable WAL mode: {}", err);
        }
        conn.busy_timeout(std::time::Duration::from_secs(2))?;

        Self::init_schema(&conn)?;
        info!("Cache opened at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway cache, mostly for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS products (
                barcode TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scan_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                barcode TEXT NOT NULL,
                scanned_at TEXT NOT NULL,
                is_healthy INTEGER NOT NULL,
                has_allergen INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_preferences (
                preference_key TEXT PRIMARY KEY,
                preference_value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    // --- Products ---

    /// Insert or replace the product stored under `barcode`
    pub fn upsert_product<T: Serialize>(&self, barcode: &str, name: &str, product: &T) -> Result<()> {
        let data = serde_json::to_string(product)?;
        let conn = self.conn()?;
        write_product(&conn, barcode, name, &data)?;
        debug!("Cached product {}", barcode);
        Ok(())
    }

    /// Upsert many products in one transaction. Either all land or none do.
    pub fn upsert_products<'a, T, I>(&self, products: I) -> Result<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a str, &'a str, &'a T)>,
    {
        let encoded = products
            .into_iter()
            .map(|(barcode, name, product)| {
                serde_json::to_string(product).map(|data| (barcode, name, data))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (barcode, name, data) in &encoded {
            write_product(&tx, barcode, name, data)?;
        }
        tx.commit()?;

        Ok(encoded.len())
    }

    pub fn get_product<T: DeserializeOwned>(&self, barcode: &str) -> Result<Option<T>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM products WHERE barcode = ?1",
                params![barcode],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        data.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    /// Every cached product, ordered by barcode
    pub fn list_products<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT data FROM products ORDER BY barcode")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(CacheError::from))
            .collect()
    }

    pub fn product_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM products")
    }

    // --- Scan history ---

    /// Append one scan. Returns the new, strictly increasing event id.
    pub fn append_scan_event(&self, barcode: &str, is_healthy: bool, has_allergen_conflict: bool) -> Result<i64> {
        let conn = self.conn()?;
        write_scan(&conn, barcode, is_healthy, has_allergen_conflict)
    }

    /// Write-through for a remote resolution: upsert the product and append
    /// its scan event in one transaction, so neither is visible without the other.
    pub fn record_scan<T: Serialize>(
        &self,
        barcode: &str,
        name: &str,
        product: &T,
        is_healthy: bool,
        has_allergen_conflict: bool,
    ) -> Result<i64> {
        let data = serde_json::to_string(product)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        write_product(&tx, barcode, name, &data)?;
        let id = write_scan(&tx, barcode, is_healthy, has_allergen_conflict)?;
        tx.commit()?;

        Ok(id)
    }

    pub fn count_scans(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM scan_history")
    }

    pub fn count_healthy_scans(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM scan_history WHERE is_healthy = 1")
    }

    pub fn count_allergen_scans(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM scan_history WHERE has_allergen = 1")
    }

    /// All three history counts from a single statement
    pub fn scan_counts(&self) -> Result<ScanCounts> {
        let conn = self.conn()?;
        let (total, healthy, allergen): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN is_healthy = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN has_allergen = 1 THEN 1 ELSE 0 END), 0)
             FROM scan_history",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(ScanCounts {
            total: total.max(0) as u64,
            healthy: healthy.max(0) as u64,
            allergen_conflicts: allergen.max(0) as u64,
        })
    }

    /// Most recent scans first, joined with the cached product name
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<ScanEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sh.id, sh.barcode, p.name, sh.scanned_at, sh.is_healthy, sh.has_allergen
             FROM scan_history sh
             LEFT JOIN products p ON sh.barcode = p.barcode
             ORDER BY sh.id DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, barcode, product_name, scanned_at, is_healthy, has_allergen_conflict)| {
                Ok(ScanEvent {
                    id,
                    barcode,
                    product_name,
                    scanned_at: parse_timestamp(&scanned_at)?,
                    is_healthy,
                    has_allergen_conflict,
                })
            })
            .collect()
    }

    // --- Preferences ---

    /// The user's allergen set. Empty when never saved.
    pub fn get_preferences(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT preference_value FROM user_preferences WHERE preference_key = ?1",
                params![ALLERGENS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match stored {
            Some(value) => decode_tags(&value),
            None => BTreeSet::new(),
        })
    }

    /// Replace the allergen set wholesale
    pub fn set_preferences(&self, allergens: &BTreeSet<String>) -> Result<()> {
        let value = serde_json::to_string(allergens)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO user_preferences (preference_key, preference_value)
             VALUES (?1, ?2)",
            params![ALLERGENS_KEY, value],
        )?;
        debug!("Saved {} allergen preference(s)", allergens.len());
        Ok(())
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn write_product(conn: &Connection, barcode: &str, name: &str, data: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO products (barcode, name, data, cached_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![barcode, name, data, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn write_scan(conn: &Connection, barcode: &str, is_healthy: bool, has_allergen_conflict: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO scan_history (barcode, scanned_at, is_healthy, has_allergen)
         VALUES (?1, ?2, ?3, ?4)",
        params![barcode, Utc::now().to_rfc3339(), is_healthy, has_allergen_conflict],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::InvalidTimestamp(format!("'{}': {}", value, e)))
}

/// Preferences are stored as a JSON array; older databases used a
/// comma-separated string, which is still accepted.
fn decode_tags(value: &str) -> BTreeSet<String> {
    match serde_json::from_str::<BTreeSet<String>>(value) {
        Ok(tags) => tags,
        Err(_) => value
            .split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
    }
}
