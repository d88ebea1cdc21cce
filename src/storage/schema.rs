use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            image_paths TEXT,
            reminder_time INTEGER,
            CHECK ((is_deleted = 0 AND deleted_at IS NULL)
                OR (is_deleted = 1 AND deleted_at IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS notes_listing
            ON notes (is_deleted, is_pinned DESC, timestamp DESC);
        CREATE INDEX IF NOT EXISTS notes_category ON notes (category_id);
        CREATE INDEX IF NOT EXISTS notes_reminder
            ON notes (reminder_time) WHERE reminder_time IS NOT NULL;
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
