//! Record storage for rx-lens.
//!
//! Every collection is one whole JSON document, loaded and saved in full.
//! Writes that span collections go through [`RecordStore::save_documents`],
//! which either saves every document or none.

mod json_store;
mod records;
mod schema;

pub use json_store::*;
pub use records::*;
pub use schema::*;

use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::reminders::IdsExhausted;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    IdsExhausted(#[from] IdsExhausted),
}

pub type DbResult<T> = Result<T, DbError>;

/// Stored record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Prescriptions,
    Medications,
    Reminders,
    DrugAlternatives,
    /// Highest id ever issued per record collection
    IdCounters,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Prescriptions,
        Collection::Medications,
        Collection::Reminders,
        Collection::DrugAlternatives,
        Collection::IdCounters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Prescriptions => "prescriptions",
            Collection::Medications => "medications",
            Collection::Reminders => "reminders",
            Collection::DrugAlternatives => "drug_alternatives",
            Collection::IdCounters => "id_counters",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-document storage backend.
pub trait RecordStore: Send {
    /// Stored document for a collection, `None` if never saved.
    fn load_document(&self, collection: Collection) -> DbResult<Option<String>>;

    /// Replace the stored document for a collection.
    fn save_document(&mut self, collection: Collection, body: &str) -> DbResult<()> {
        self.save_documents(&[(collection, body.to_string())])
    }

    /// Replace several documents at once. On error none of them is replaced.
    fn save_documents(&mut self, documents: &[(Collection, String)]) -> DbResult<()>;
}

const UPSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (collection, body, updated_at)
    VALUES (?1, ?2, datetime('now'))
    ON CONFLICT(collection) DO UPDATE SET
        body = excluded.body,
        updated_at = datetime('now')
"#;

/// SQLite-backed document store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

impl RecordStore for Database {
    fn load_document(&self, collection: Collection) -> DbResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1",
                [collection.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn save_documents(&mut self, documents: &[(Collection, String)]) -> DbResult<()> {
        let tx = self.transaction()?;
        for (collection, body) in documents {
            tx.execute(UPSERT_DOCUMENT, params![collection.as_str(), body])?;
        }
        tx.commit()?;
        Ok(())
    }
}
