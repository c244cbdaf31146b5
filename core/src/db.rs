use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{Entry, Goals};
use crate::service::{EntryStore, GoalsStore};

/// Owner key for rows that belong to nobody in particular (local mode).
const LOCAL_OWNER: &str = "";

const ENTRY_COLUMNS: &str = "id, user_id, date, time, protein, water, note, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
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
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS entries (
                    id TEXT PRIMARY KEY,
                    user_id TEXT,
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    protein REAL NOT NULL DEFAULT 0,
                    water REAL NOT NULL DEFAULT 0,
                    note TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_entries_date_time ON entries(date, time);

                CREATE TABLE IF NOT EXISTS goals (
                    owner TEXT PRIMARY KEY,
                    daily_protein REAL NOT NULL,
                    daily_water REAL NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        Ok(Entry {
            id: row.get(0)?,
            owner: row.get(1)?,
            date: row.get(2)?,
            time: row.get(3)?,
            protein_g: row.get(4)?,
            water_l: row.get(5)?,
            note: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // --- Entries ---

    /// All entries, ordered by date then time.
    pub fn list_entries(&self) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY date ASC, time ASC, created_at ASC"
        ))?;
        let entries = stmt
            .query_map([], Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<Entry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert new entries or overwrite existing ones with the same id.
    /// `created_at` is kept for existing rows and stamped for new ones.
    pub fn upsert_entries(&self, entries: &[Entry]) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entries (id, user_id, date, time, protein, water, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    date = excluded.date,
                    time = excluded.time,
                    protein = excluded.protein,
                    water = excluded.water,
                    note = excluded.note",
            )?;
            for e in entries {
                stmt.execute(params![
                    e.id,
                    e.owner,
                    e.date,
                    e.time,
                    e.protein_g,
                    e.water_l,
                    e.note,
                    e.created_at.as_deref().unwrap_or(now.as_str()),
                ])?;
            }
        }
        tx.commit().context("Failed to save entries")?;
        Ok(())
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn delete_all_entries(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM entries", [])?;
        Ok(rows)
    }

    /// Atomically swap the whole entry table for `entries`.
    pub fn replace_entries(&self, entries: &[Entry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        {
            let now = Local::now().to_rfc3339();
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entries (id, user_id, date, time, protein, water, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for e in entries {
                stmt.execute(params![
                    e.id,
                    e.owner,
                    e.date,
                    e.time,
                    e.protein_g,
                    e.water_l,
                    e.note,
                    e.created_at.as_deref().unwrap_or(now.as_str()),
                ])?;
            }
        }
        tx.commit().context("Failed to replace entries")?;
        Ok(())
    }

    // --- Goals ---

    pub fn get_goals(&self, owner: Option<&str>) -> Result<Option<Goals>> {
        let key = owner.unwrap_or(LOCAL_OWNER);
        let goals = self
            .conn
            .query_row(
                "SELECT daily_protein, daily_water FROM goals WHERE owner = ?1",
                params![key],
                |row| {
                    Ok(Goals {
                        owner: owner.map(str::to_string),
                        daily_protein_g: row.get(0)?,
                        daily_water_l: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(goals)
    }

    pub fn set_goals(&self, goals: &Goals) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO goals (owner, daily_protein, daily_water, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                goals.owner.as_deref().unwrap_or(LOCAL_OWNER),
                goals.daily_protein_g,
                goals.daily_water_l,
                now
            ],
        )?;
        Ok(())
    }
}

impl EntryStore for Database {
    fn load_all(&self) -> Result<Vec<Entry>> {
        self.list_entries()
    }

    fn append_or_update(&self, entries: &[Entry]) -> Result<()> {
        self.upsert_entries(entries)
    }

    fn remove(&self, id: &str) -> Result<bool> {
        self.delete_entry(id)
    }

    fn find(&self, id: &str) -> Result<Option<Entry>> {
        self.get_entry(id)
    }

    fn replace_all(&self, entries: &[Entry]) -> Result<()> {
        self.replace_entries(entries)
    }

    fn clear(&self) -> Result<usize> {
        self.delete_all_entries()
    }
}

impl GoalsStore for Database {
    fn load_goals(&self, owner: Option<&str>) -> Result<Option<Goals>> {
        self.get_goals(owner)
    }

    fn save_goals(&self, goals: &Goals) -> Result<()> {
        self.set_goals(goals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, date: &str, time: &str, protein: f64) -> Entry {
        Entry {
            id: id.to_string(),
            owner: None,
            date: date.to_string(),
            time: time.to_string(),
            protein_g: protein,
            water_l: 0.0,
            note: None,
            created_at: None,
        }
    }

    #[test]
    fn test_upsert_and_list_sorted() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entries(&[
            entry("c", "2024-01-02", "07:00", 10.0),
            entry("a", "2024-01-01", "12:00", 20.0),
            entry("b", "2024-01-01", "08:00", 30.0),
        ])
        .unwrap();

        let all = db.list_entries().unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(all.iter().all(|e| e.created_at.is_some()));
    }

    #[test]
    fn test_upsert_overwrites_and_keeps_created_at() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entries(&[entry("a", "2024-01-01", "08:00", 30.0)])
            .unwrap();
        let created = db.get_entry("a").unwrap().unwrap().created_at;

        let mut edited = entry("a", "2024-01-01", "09:15", 45.0);
        edited.note = Some("shake".to_string());
        db.upsert_entries(&[edited]).unwrap();

        let all = db.list_entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].time, "09:15");
        assert!((all[0].protein_g - 45.0).abs() < f64::EPSILON);
        assert_eq!(all[0].note.as_deref(), Some("shake"));
        assert_eq!(all[0].created_at, created);
    }

    #[test]
    fn test_get_entry_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_entry("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_entry() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entries(&[entry("a", "2024-01-01", "08:00", 30.0)])
            .unwrap();
        assert!(db.delete_entry("a").unwrap());
        assert!(!db.delete_entry("a").unwrap());
        assert!(db.list_entries().unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_entries() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entries(&[
            entry("a", "2024-01-01", "08:00", 30.0),
            entry("b", "2024-01-01", "09:00", 30.0),
        ])
        .unwrap();
        assert_eq!(db.delete_all_entries().unwrap(), 2);
        assert_eq!(db.delete_all_entries().unwrap(), 0);
    }

    #[test]
    fn test_replace_entries() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_entries(&[entry("old", "2024-01-01", "08:00", 30.0)])
            .unwrap();

        let mut remote = entry("new", "2024-02-01", "10:00", 25.0);
        remote.owner = Some("user-1".to_string());
        remote.created_at = Some("2024-02-01T10:00:00Z".to_string());
        db.replace_entries(&[remote]).unwrap();

        let all = db.list_entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "new");
        assert_eq!(all[0].owner.as_deref(), Some("user-1"));
        assert_eq!(all[0].created_at.as_deref(), Some("2024-02-01T10:00:00Z"));
    }

    #[test]
    fn test_goals_roundtrip_per_owner() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_goals(None).unwrap().is_none());

        db.set_goals(&Goals {
            owner: None,
            daily_protein_g: 150.0,
            daily_water_l: 3.0,
        })
        .unwrap();
        db.set_goals(&Goals {
            owner: Some("user-1".to_string()),
            daily_protein_g: 120.0,
            daily_water_l: 2.5,
        })
        .unwrap();

        let local = db.get_goals(None).unwrap().unwrap();
        assert!((local.daily_protein_g - 150.0).abs() < f64::EPSILON);
        assert!(local.owner.is_none());

        let user = db.get_goals(Some("user-1")).unwrap().unwrap();
        assert!((user.daily_water_l - 2.5).abs() < f64::EPSILON);
        assert_eq!(user.owner.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_goals_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        for protein in [100.0, 140.0, 180.0] {
            db.set_goals(&Goals {
                owner: None,
                daily_protein_g: protein,
                daily_water_l: 2.0,
            })
            .unwrap();
        }
        let goals = db.get_goals(None).unwrap().unwrap();
        assert!((goals.daily_protein_g - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_open_on_disk_migrates_once() {
        let dir = std::env::temp_dir().join(format!("intake-db-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("intake.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_entries(&[entry("a", "2024-01-01", "08:00", 30.0)])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_entries().unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
