use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::schema::SCHEMA;
use super::{Collection, Store};
use crate::error::{Error, Result};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn get_record(&self, collection: Collection, id: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_records(&self, collection: Collection, project_id: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT body FROM records
             WHERE collection = ?1 AND (?2 IS NULL OR project_id = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![collection.as_str(), project_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn put_record(
        &self,
        collection: Collection,
        id: &str,
        project_id: Option<&str>,
        body: &str,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO records (collection, id, project_id, body)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET
                project_id = excluded.project_id,
                body = excluded.body,
                updated_at = datetime('now')",
            params![collection.as_str(), id, project_id, body],
        )?;
        Ok(())
    }

    fn remove_record(&self, collection: Collection, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
