pub mod entities;
pub mod error;
pub mod migrations;
pub mod schema;
pub mod store;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use circle_token::IdentityDirectory;

pub use entities::Entity;
pub use error::StoreError;
pub use store::{Criteria, Row, Store, Value, rows_to_typed, text};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the store outside any explicit transaction.
    pub fn with_store<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Store<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        f(&Store::new(&conn))
    }

    /// Run `f` inside one transaction: committed when `f` returns `Ok`,
    /// rolled back otherwise.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Store<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&Store::new(&tx))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Connection(format!("DB lock poisoned: {}", e)))
    }
}

impl IdentityDirectory for Database {
    type Error = StoreError;

    fn identity_exists(&self, identity: &str) -> Result<bool, StoreError> {
        self.with_store(|s| Ok(s.count(schema::USERS.name, &[("id", text(identity))])? > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<(), StoreError> = db.transaction(|s| {
            s.insert(
                "users",
                &[
                    text("u1"),
                    text("u1@example.com"),
                    text("hash"),
                    text("A"),
                    text("B"),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    text("public"),
                    Value::Integer(0),
                    text("now"),
                ],
            )?;
            Err(StoreError::Validation("abort".into()))
        });
        assert!(result.is_err());

        assert!(!db.identity_exists("u1").unwrap());
    }

    #[test]
    fn open_creates_schema_on_disk() {
        let path = std::env::temp_dir().join(format!("circle-{}.db", uuid::Uuid::new_v4()));
        {
            let db = Database::open(&path).unwrap();
            assert_eq!(db.with_store(|s| s.count("users", &[])).unwrap(), 0);
        }
        // Reopening must not fail on existing tables
        Database::open(&path).unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
