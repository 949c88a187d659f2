//! SQLite schema definition.

/// Document table: one row per collection.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT PRIMARY KEY,
    body TEXT NOT NULL,                           -- whole JSON document
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
