use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::{StorageOptions, TrashOptions};
use crate::model::{Category, CategoryColor, ImageAttachments, Note, NoteDraft, NoteEdit};
use crate::timefmt::now_millis;

mod schema;

const NOTE_COLUMNS: &str = "id, title, content, timestamp, is_pinned, category_id, \
                            deleted_at, image_paths, reminder_time";
const CATEGORY_COLUMNS: &str = "id, name, color, created_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDeleteOutcome {
    pub name: String,
    pub detached: usize,
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Active notes, pinned first, then newest first.
    pub fn fetch_notes(&self) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE is_deleted = 0
                 ORDER BY is_pinned DESC, timestamp DESC, id DESC"
            ),
            [],
        )
    }

    pub fn fetch_notes_in_category(&self, category_id: i64) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE is_deleted = 0 AND category_id = ?1
                 ORDER BY is_pinned DESC, timestamp DESC, id DESC"
            ),
            params![category_id],
        )
    }

    /// Case-insensitive substring match on title or content, active notes only.
    pub fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return self.fetch_notes();
        }
        let pattern = format!("%{}%", escape_like(trimmed));
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE is_deleted = 0
                   AND (title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\')
                 ORDER BY is_pinned DESC, timestamp DESC, id DESC"
            ),
            params![pattern],
        )
    }

    /// Trashed notes, most recently deleted first.
    pub fn fetch_trashed_notes(&self) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE is_deleted = 1
                 ORDER BY deleted_at DESC, id DESC"
            ),
            [],
        )
    }

    /// Every note including the trash, oldest id first.
    pub fn fetch_all_notes(&self) -> Result<Vec<Note>> {
        self.query_notes(
            &format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY id ASC"),
            [],
        )
    }

    /// Active notes carrying a reminder, soonest first.
    pub fn fetch_reminders(&self) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE is_deleted = 0 AND reminder_time IS NOT NULL
                 ORDER BY reminder_time ASC, id ASC"
            ),
            [],
        )
    }

    /// Looks a note up by id whether or not it is in the trash.
    pub fn fetch_note(&self, note_id: i64) -> Result<Option<Note>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![note_id],
                note_from_row,
            )
            .optional()
            .with_context(|| format!("fetching note {note_id}"))
        })
    }

    pub fn insert_note(&self, draft: &NoteDraft) -> Result<i64> {
        self.with_connection(|conn| {
            if let Some(category_id) = draft.category_id {
                ensure_category_exists(conn, category_id)?;
            }
            let timestamp = draft.timestamp.unwrap_or_else(now_millis);
            conn.execute(
                "INSERT INTO notes (title, content, timestamp, is_pinned, category_id,
                                    is_deleted, deleted_at, image_paths, reminder_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?7)",
                params![
                    draft.title,
                    draft.content,
                    timestamp,
                    draft.pinned,
                    draft.category_id,
                    draft.images.to_column(),
                    draft.reminder_at,
                ],
            )
            .context("inserting note")?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Overwrites every stored field of `note.id` with the given record.
    pub fn update_note(&self, note: &Note) -> Result<()> {
        self.with_connection(|conn| {
            if let Some(category_id) = note.category_id {
                ensure_category_exists(conn, category_id)?;
            }
            let updated = conn
                .execute(
                    "UPDATE notes
                     SET title = ?1, content = ?2, timestamp = ?3, is_pinned = ?4,
                         category_id = ?5, is_deleted = ?6, deleted_at = ?7,
                         image_paths = ?8, reminder_time = ?9
                     WHERE id = ?10",
                    params![
                        note.title,
                        note.content,
                        note.timestamp,
                        note.pinned,
                        note.category_id,
                        note.is_deleted(),
                        note.deleted_at,
                        note.images.to_column(),
                        note.reminder_at,
                        note.id,
                    ],
                )
                .context("updating note")?;
            if updated == 0 {
                bail!("note {} not found", note.id);
            }
            Ok(())
        })
    }

    /// Applies `edit` to an active note and moves its timestamp to `edited_at`.
    pub fn edit_note(&self, note_id: i64, edit: &NoteEdit, edited_at: i64) -> Result<Note> {
        let Some(mut note) = self.fetch_note(note_id)? else {
            bail!("note {note_id} not found");
        };
        if note.is_deleted() {
            bail!("note {note_id} is in the trash, restore it before editing");
        }
        if let Some(title) = &edit.title {
            note.title = title.trim().to_string();
        }
        if let Some(content) = &edit.content {
            note.content = content.clone();
        }
        if let Some(category_id) = edit.category_id {
            note.category_id = category_id;
        }
        note.timestamp = edited_at;
        self.update_note(&note)
            .with_context(|| format!("saving edits to note {note_id}"))?;
        tracing::debug!(note_id, "edited note");
        Ok(note)
    }

    pub fn set_pinned(&self, note_id: i64, pinned: bool) -> Result<()> {
        self.update_active(
            note_id,
            "UPDATE notes SET is_pinned = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![pinned, note_id],
            "updating note pinned state",
        )
    }

    pub fn set_reminder(&self, note_id: i64, reminder_at: Option<i64>) -> Result<()> {
        self.update_active(
            note_id,
            "UPDATE notes SET reminder_time = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![reminder_at, note_id],
            "updating note reminder",
        )
    }

    pub fn set_images(&self, note_id: i64, images: &ImageAttachments) -> Result<()> {
        self.update_active(
            note_id,
            "UPDATE notes SET image_paths = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![images.to_column(), note_id],
            "updating note images",
        )
    }

    pub fn set_note_category(&self, note_id: i64, category_id: Option<i64>) -> Result<()> {
        if let Some(category_id) = category_id {
            self.with_connection(|conn| ensure_category_exists(conn, category_id))?;
        }
        self.update_active(
            note_id,
            "UPDATE notes SET category_id = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![category_id, note_id],
            "updating note category",
        )
    }

    pub fn move_to_trash(&self, note_id: i64, deleted_at: i64) -> Result<()> {
        self.update_active(
            note_id,
            "UPDATE notes SET is_deleted = 1, deleted_at = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![deleted_at, note_id],
            "moving note to trash",
        )
    }

    pub fn restore_from_trash(&self, note_id: i64) -> Result<()> {
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE notes SET is_deleted = 0, deleted_at = NULL
                     WHERE id = ?1 AND is_deleted = 1",
                    params![note_id],
                )
                .context("restoring note from trash")?;
            if updated == 0 {
                bail!("note {note_id} not found in trash");
            }
            Ok(())
        })
    }

    /// Removes a note for good, whether or not it is in the trash.
    pub fn delete_note(&self, note_id: i64) -> Result<()> {
        self.with_connection(|conn| {
            let deleted = conn
                .execute("DELETE FROM notes WHERE id = ?1", params![note_id])
                .context("deleting note")?;
            if deleted == 0 {
                bail!("note {note_id} not found");
            }
            Ok(())
        })
    }

    pub fn trash_count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM notes WHERE is_deleted = 1", [], |row| {
                    row.get(0)
                })
                .context("counting trashed notes")?;
            Ok(count as usize)
        })
    }

    pub fn empty_trash(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count = conn
                .execute("DELETE FROM notes WHERE is_deleted = 1", [])
                .context("emptying trash")?;
            Ok(count)
        })
    }

    /// Permanently deletes trashed notes deleted at or before `cutoff`.
    pub fn purge_trash_before(&self, cutoff: i64) -> Result<usize> {
        self.with_connection(|conn| {
            let count = conn
                .execute(
                    "DELETE FROM notes WHERE is_deleted = 1 AND deleted_at <= ?1",
                    params![cutoff],
                )
                .context("purging expired trash")?;
            Ok(count)
        })
    }

    pub fn purge_expired_trash(&self, trash: &TrashOptions, now: i64) -> Result<usize> {
        match trash.cutoff(now) {
            Some(cutoff) => self.purge_trash_before(cutoff),
            None => Ok(0),
        }
    }

    /// Inserts restored notes under fresh ids, in one transaction. Category
    /// references that do not resolve are dropped.
    pub fn import_notes(&self, notes: &[Note]) -> Result<Vec<i64>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting import transaction")?;
        let mut ids = Vec::with_capacity(notes.len());
        for note in notes {
            let category_id = match note.category_id {
                Some(category_id) if category_exists(&tx, category_id)? => Some(category_id),
                Some(category_id) => {
                    tracing::warn!(
                        category_id,
                        title = %note.title,
                        "imported note references a missing category, detaching"
                    );
                    None
                }
                None => None,
            };
            tx.execute(
                "INSERT INTO notes (title, content, timestamp, is_pinned, category_id,
                                    is_deleted, deleted_at, image_paths, reminder_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    note.title,
                    note.content,
                    note.timestamp,
                    note.pinned,
                    category_id,
                    note.is_deleted(),
                    note.deleted_at,
                    note.images.to_column(),
                    note.reminder_at,
                ],
            )
            .context("inserting imported note")?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().context("committing import")?;
        Ok(ids)
    }

    /// Categories, newest first.
    pub fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map([], category_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
                .context("fetching categories")
        })
    }

    /// Categories keyed by id, newest first.
    pub fn category_index(&self) -> Result<IndexMap<i64, Category>> {
        Ok(self
            .fetch_categories()?
            .into_iter()
            .map(|category| (category.id, category))
            .collect())
    }

    pub fn fetch_category(&self, category_id: i64) -> Result<Option<Category>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                params![category_id],
                category_from_row,
            )
            .optional()
            .with_context(|| format!("fetching category {category_id}"))
        })
    }

    pub fn category_count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
                .context("counting categories")?;
            Ok(count as usize)
        })
    }

    pub fn insert_category(&self, name: &str, color: &str) -> Result<i64> {
        let name = validate_category_name(name)?;
        let color = validate_color(color)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO categories (name, color, created_at) VALUES (?1, ?2, ?3)",
                params![name, color, now_millis()],
            )
            .context("inserting category")?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn rename_category(&self, category_id: i64, name: &str) -> Result<()> {
        let name = validate_category_name(name)?;
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE categories SET name = ?1 WHERE id = ?2",
                    params![name, category_id],
                )
                .context("renaming category")?;
            if updated == 0 {
                bail!("category {category_id} not found");
            }
            Ok(())
        })
    }

    pub fn set_category_color(&self, category_id: i64, color: &str) -> Result<()> {
        let color = validate_color(color)?;
        self.with_connection(|conn| {
            let updated = conn
                .execute(
                    "UPDATE categories SET color = ?1 WHERE id = ?2",
                    params![color, category_id],
                )
                .context("recolouring category")?;
            if updated == 0 {
                bail!("category {category_id} not found");
            }
            Ok(())
        })
    }

    /// Deletes a category and detaches every note that referenced it,
    /// trashed notes included. Notes themselves are kept.
    pub fn delete_category(&self, category_id: i64) -> Result<CategoryDeleteOutcome> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let name: String = tx
            .query_row(
                "SELECT name FROM categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| anyhow::anyhow!("category {category_id} not found"))?;
        let detached = tx
            .execute(
                "UPDATE notes SET category_id = NULL WHERE category_id = ?1",
                params![category_id],
            )
            .context("detaching notes from category")?;
        tx.execute("DELETE FROM categories WHERE id = ?1", params![category_id])
            .context("deleting category")?;
        tx.commit()?;
        Ok(CategoryDeleteOutcome { name, detached })
    }

    /// Number of active notes filed under the category.
    pub fn notes_in_category(&self, category_id: i64) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM notes WHERE category_id = ?1 AND is_deleted = 0",
                    params![category_id],
                    |row| row.get(0),
                )
                .context("counting notes in category")?;
            Ok(count as usize)
        })
    }

    fn query_notes<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Note>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, note_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
                .context("querying notes")
        })
    }

    fn update_active<P: rusqlite::Params>(
        &self,
        note_id: i64,
        sql: &str,
        params: P,
        what: &'static str,
    ) -> Result<()> {
        self.with_connection(|conn| {
            let updated = conn.execute(sql, params).context(what)?;
            if updated == 0 {
                bail!("note {note_id} not found");
            }
            Ok(())
        })
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let images: Option<String> = row.get(7)?;
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        timestamp: row.get(3)?,
        pinned: row.get::<_, i64>(4)? != 0,
        category_id: row.get(5)?,
        deleted_at: row.get(6)?,
        images: ImageAttachments::from_json(images.as_deref()),
        reminder_at: row.get(8)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn category_exists(conn: &Connection, category_id: i64) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![category_id],
            |_row| Ok(()),
        )
        .optional()
        .context("checking category existence")?
        .is_some();
    Ok(exists)
}

fn ensure_category_exists(conn: &Connection, category_id: i64) -> Result<()> {
    if !category_exists(conn, category_id)? {
        bail!("category {category_id} not found");
    }
    Ok(())
}

fn validate_category_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("category name cannot be empty");
    }
    Ok(trimmed)
}

fn validate_color(color: &str) -> Result<String> {
    match CategoryColor::parse(color) {
        Some(parsed) => Ok(parsed.to_string()),
        None => bail!("'{color}' is not a #RRGGBB or #AARRGGBB colour"),
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn init(storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
