use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{Category, DATE_FORMAT, ItemRecord, NewItem, ServerRecord, validate_new_item};
use crate::stats::{ExpiryStats, compute_stats};

/// Device-local item store.
///
/// Only ever handed out already opened and migrated; callers own its lifetime.
pub struct Database {
    conn: Connection,
}

/// Outcome of applying a pulled snapshot to the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub inserted: usize,
    pub updated: usize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to enable WAL journal mode")?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            // AUTOINCREMENT keeps ids from being reused after deletion.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    expiry_date TEXT NOT NULL,
                    reminder_days INTEGER NOT NULL DEFAULT 3,
                    notified INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_items_expiry ON items(expiry_date);

                CREATE TABLE IF NOT EXISTS config (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // Expects columns: 0: id, 1: name, 2: category, 3: expiry_date,
    // 4: reminder_days, 5: notified
    fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<ItemRecord> {
        let category: String = row.get(2)?;
        let category = category.parse::<Category>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;
        let expiry_str: String = row.get(3)?;
        let expiry_date = NaiveDate::parse_from_str(&expiry_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?;
        Ok(ItemRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            category,
            expiry_date,
            reminder_days: row.get(4)?,
            notified: row.get(5)?,
        })
    }

    // --- Items ---

    pub fn list_items(&self) -> Result<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, category, expiry_date, reminder_days, notified
             FROM items ORDER BY expiry_date ASC, id ASC",
        )?;
        let items = stmt
            .query_map([], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get_item(&self, id: i64) -> Result<Option<ItemRecord>> {
        self.conn
            .query_row(
                "SELECT id, name, category, expiry_date, reminder_days, notified
                 FROM items WHERE id = ?1",
                params![id],
                Self::item_from_row,
            )
            .optional()
            .context("Failed to load item")
    }

    pub fn insert_item(&self, item: &NewItem) -> Result<ItemRecord> {
        let mut item = item.clone();
        validate_new_item(&mut item)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO items (name, category, expiry_date, reminder_days, notified, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![
                item.name,
                item.category.as_str(),
                item.expiry_date.format(DATE_FORMAT).to_string(),
                item.reminder_days,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_item(id)?
            .context("Item not found after insert")
    }

    /// Overwrite an item's mutable fields. Returns `None` if no such item exists.
    pub fn update_item(&self, id: i64, item: &NewItem) -> Result<Option<ItemRecord>> {
        let mut item = item.clone();
        validate_new_item(&mut item)?;
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE items SET name = ?1, category = ?2, expiry_date = ?3,
             reminder_days = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                item.name,
                item.category.as_str(),
                item.expiry_date.format(DATE_FORMAT).to_string(),
                item.reminder_days,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_item(id)
    }

    pub fn delete_item(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn set_notified(&self, id: i64, notified: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE items SET notified = ?1 WHERE id = ?2",
            params![notified, id],
        )?;
        Ok(rows > 0)
    }

    /// Upsert a pulled snapshot keyed by local id, in one transaction.
    ///
    /// Rows absent from `records` are left untouched, and `notified` is kept
    /// for rows that already exist. Inserting an explicit id advances the
    /// AUTOINCREMENT sequence, so later local inserts never reuse it.
    pub fn apply_pulled(&self, records: &[ServerRecord]) -> Result<ApplySummary> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start apply transaction")?;
        let now = Local::now().to_rfc3339();
        let mut summary = ApplySummary::default();

        for record in records {
            let updated = tx.execute(
                "UPDATE items SET name = ?1, category = ?2, expiry_date = ?3,
                 reminder_days = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    record.name,
                    record.category.as_str(),
                    record.expiry_date.format(DATE_FORMAT).to_string(),
                    record.reminder_days,
                    now,
                    record.local_id,
                ],
            )?;
            if updated > 0 {
                summary.updated += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO items (id, name, category, expiry_date, reminder_days, notified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    record.local_id,
                    record.name,
                    record.category.as_str(),
                    record.expiry_date.format(DATE_FORMAT).to_string(),
                    record.reminder_days,
                    now,
                ],
            )?;
            summary.inserted += 1;
        }

        tx.commit().context("Failed to commit pulled records")?;
        Ok(summary)
    }

    /// Stats over the local rows, identical in definition to the server's.
    pub fn compute_local_stats(&self, now: DateTime<Utc>) -> Result<ExpiryStats> {
        let items = self.list_items()?;
        Ok(compute_stats(items.iter().map(|i| i.expiry_date), now))
    }

    // --- Installation config ---

    /// Stable per-installation identifier, generated on first use.
    pub fn get_or_create_device_id(&self) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = 'device_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(device_id) = existing {
            return Ok(device_id);
        }

        let device_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES ('device_id', ?1)",
            params![device_id],
        )?;
        Ok(device_id)
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}
