//! Server-side merge point for every device in a namespace.
//!
//! Records are keyed by `(namespace, local_id)`. A push with an existing key
//! overwrites every field; the last write to arrive wins.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::models::{Category, DATE_FORMAT, PushItem, ServerRecord, validate_push_item};
use crate::namespace::Namespace;
use crate::stats::{ExpiryStats, compute_stats};

pub struct ServerStore {
    conn: Connection,
}

impl ServerStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open server database: {}", path.display()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .context("Failed to enable WAL journal mode")?;
        let store = ServerStore { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = ServerStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS server_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    namespace TEXT NOT NULL,
                    local_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    expiry_date TEXT NOT NULL,
                    reminder_days INTEGER NOT NULL DEFAULT 3,
                    updated_at TEXT NOT NULL,
                    UNIQUE(namespace, local_id)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // Expects columns: 0: local_id, 1: name, 2: category, 3: expiry_date, 4: reminder_days
    fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<ServerRecord> {
        let category: String = row.get(2)?;
        let category = category.parse::<Category>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;
        let expiry_str: String = row.get(3)?;
        let expiry_date = NaiveDate::parse_from_str(&expiry_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?;
        Ok(ServerRecord {
            local_id: row.get(0)?,
            name: row.get(1)?,
            category,
            expiry_date,
            reminder_days: row.get(4)?,
        })
    }

    /// Upsert a whole batch atomically. Every item is validated before any
    /// write, so an invalid item rejects the batch with nothing applied.
    /// Returns the number of records written.
    pub fn push_batch(&mut self, namespace: &Namespace, items: &[PushItem]) -> Result<usize> {
        for item in items {
            validate_push_item(item)?;
        }

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .context("Failed to start push transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO server_items (namespace, local_id, name, category, expiry_date, reminder_days, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(namespace, local_id) DO UPDATE SET
                    name = excluded.name,
                    category = excluded.category,
                    expiry_date = excluded.expiry_date,
                    reminder_days = excluded.reminder_days,
                    updated_at = excluded.updated_at",
            )?;
            for item in items {
                stmt.execute(params![
                    namespace.as_str(),
                    item.id,
                    item.name.trim(),
                    item.category.as_str(),
                    item.expiry_date.format(DATE_FORMAT).to_string(),
                    item.reminder_days,
                    now,
                ])?;
            }
        }
        tx.commit().context("Failed to commit pushed batch")?;

        debug!(namespace = %namespace, count = items.len(), "applied push batch");
        Ok(items.len())
    }

    pub fn pull_all(&self, namespace: &Namespace) -> Result<Vec<ServerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, name, category, expiry_date, reminder_days
             FROM server_items WHERE namespace = ?1 ORDER BY local_id ASC",
        )?;
        let records = stmt
            .query_map(params![namespace.as_str()], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove one record. Absent keys are not an error; returns whether a row went away.
    pub fn delete_one(&self, namespace: &Namespace, local_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM server_items WHERE namespace = ?1 AND local_id = ?2",
            params![namespace.as_str(), local_id],
        )?;
        Ok(rows > 0)
    }

    /// Computed fresh on every call; `now` moves, so nothing is cached.
    pub fn compute_stats(&self, namespace: &Namespace, now: DateTime<Utc>) -> Result<ExpiryStats> {
        let records = self.pull_all(namespace)?;
        Ok(compute_stats(records.iter().map(|r| r.expiry_date), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewItem;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ns(s: &str) -> Namespace {
        Namespace::parse(s).unwrap()
    }

    fn item(id: i64, name: &str, expiry: &str) -> PushItem {
        PushItem {
            id,
            name: name.to_string(),
            category: Category::Food,
            expiry_date: date(expiry),
            reminder_days: 3,
        }
    }

    #[test]
    fn test_push_and_pull() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        let written = store
            .push_batch(&home, &[item(1, "Milk", "2024-01-01"), item(2, "Eggs", "2024-01-05")])
            .unwrap();
        assert_eq!(written, 2);

        let records = store.pull_all(&home).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].local_id, 1);
        assert_eq!(records[0].name, "Milk");
        assert_eq!(records[1].local_id, 2);
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut once = ServerStore::open_in_memory().unwrap();
        let mut many = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        let batch = [item(1, "Milk", "2024-01-01"), item(2, "Eggs", "2024-01-05")];

        once.push_batch(&home, &batch).unwrap();
        for _ in 0..5 {
            many.push_batch(&home, &batch).unwrap();
        }

        assert_eq!(once.pull_all(&home).unwrap(), many.pull_all(&home).unwrap());
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let mut store = ServerStore::open_in_memory().unwrap();
        store.push_batch(&ns("A"), &[item(1, "Milk", "2024-01-01")]).unwrap();
        store.push_batch(&ns("B"), &[item(1, "Aspirin", "2025-01-01")]).unwrap();

        let a = store.pull_all(&ns("A")).unwrap();
        let b = store.pull_all(&ns("B")).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].name, "Milk");
        assert_eq!(b[0].name, "Aspirin");
    }

    #[test]
    fn test_push_overwrites_existing_key() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        store.push_batch(&home, &[item(1, "Milk", "2024-01-01")]).unwrap();
        store.push_batch(&home, &[item(1, "Milk2", "2024-02-01")]).unwrap();

        let records = store.pull_all(&home).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Milk2");
        assert_eq!(records[0].expiry_date, date("2024-02-01"));
    }

    #[test]
    fn test_duplicate_ids_in_batch_last_wins() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        store
            .push_batch(&home, &[item(1, "First", "2024-01-01"), item(1, "Second", "2024-01-02")])
            .unwrap();
        let records = store.pull_all(&home).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Second");
    }

    #[test]
    fn test_invalid_item_rejects_whole_batch() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        let result = store.push_batch(&home, &[item(1, "Milk", "2024-01-01"), item(2, "", "2024-01-01")]);
        assert!(result.is_err());
        assert!(store.pull_all(&home).unwrap().is_empty());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut store = ServerStore::open_in_memory().unwrap();
        assert_eq!(store.push_batch(&ns("HOME"), &[]).unwrap(), 0);
        assert!(store.pull_all(&ns("HOME")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_one() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        store
            .push_batch(&home, &[item(3, "Bread", "2024-01-01"), item(4, "Jam", "2024-03-01")])
            .unwrap();

        assert!(store.delete_one(&home, 3).unwrap());
        assert!(!store.delete_one(&home, 3).unwrap());
        assert!(!store.delete_one(&ns("OTHER"), 4).unwrap());

        let ids: Vec<i64> = store.pull_all(&home).unwrap().iter().map(|r| r.local_id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_compute_stats_thresholds() {
        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        store
            .push_batch(
                &home,
                &[
                    item(1, "Old", "2024-06-05"),
                    item(2, "Soon", "2024-06-12"),
                    item(3, "Later", "2024-06-20"),
                ],
            )
            .unwrap();
        let now = date("2024-06-10").and_time(chrono::NaiveTime::MIN).and_utc();
        let stats = store.compute_stats(&home, now).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.expiring_soon, 1);
        assert_eq!(stats.saved, 2);
        assert_eq!(store.compute_stats(&ns("EMPTY"), now).unwrap(), ExpiryStats::default());
    }

    #[test]
    fn test_local_and_server_stats_parity() {
        let db = Database::open_in_memory().unwrap();
        let expiries = [
            "2024-06-01", "2024-06-09", "2024-06-10", "2024-06-11", "2024-06-13", "2024-06-14",
            "2024-07-30",
        ];
        for (i, expiry) in expiries.iter().enumerate() {
            db.insert_item(&NewItem {
                name: format!("item {i}"),
                category: Category::Other,
                expiry_date: date(expiry),
                reminder_days: 1,
            })
            .unwrap();
        }

        let mut store = ServerStore::open_in_memory().unwrap();
        let home = ns("HOME");
        let batch: Vec<PushItem> = db.list_items().unwrap().iter().map(|i| i.to_push_item()).collect();
        store.push_batch(&home, &batch).unwrap();

        for hour in [0, 7, 13, 23] {
            let now = date("2024-06-10").and_hms_opt(hour, 15, 0).unwrap().and_utc();
            assert_eq!(
                db.compute_local_stats(now).unwrap(),
                store.compute_stats(&home, now).unwrap()
            );
        }
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.db");
        {
            let mut store = ServerStore::open(&path).unwrap();
            store.push_batch(&ns("HOME"), &[item(9, "Rice", "2025-01-01")]).unwrap();
        }
        let store = ServerStore::open(&path).unwrap();
        assert_eq!(store.pull_all(&ns("HOME")).unwrap().len(), 1);
    }
}
