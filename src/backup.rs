use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use time::macros::format_description;

use crate::model::{ImageAttachments, Note, UNTITLED};
use crate::storage::StorageHandle;
use crate::timefmt::{millis_to_datetime, now_millis};

pub const BACKUP_VERSION: u32 = 1;

const RULE_WIDTH: usize = 50;
const ENTRY_RULE_WIDTH: usize = 30;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported backup version {0} (expected {})", BACKUP_VERSION)]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: u32,
    pub export_date: i64,
    #[serde(default)]
    pub notes_count: usize,
    pub notes: Vec<BackupNote>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupNote {
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_pinned: bool,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    /// JSON array of paths, encoded as a string.
    pub image_paths: Option<String>,
    pub reminder_time: Option<i64>,
}

impl From<&Note> for BackupNote {
    fn from(note: &Note) -> Self {
        Self {
            id: Some(note.id),
            title: note.title.clone(),
            content: note.content.clone(),
            timestamp: note.timestamp,
            is_pinned: note.pinned,
            category_id: note.category_id,
            is_deleted: note.is_deleted(),
            deleted_at: note.deleted_at,
            image_paths: note.images.to_column(),
            reminder_time: note.reminder_at,
        }
    }
}

impl BackupNote {
    /// Rebuilds a note for insertion. The id is not preserved, and a deleted
    /// flag without an instant is stamped with `imported_at`. Deletion
    /// instants never lie after `imported_at`.
    pub fn into_note(self, imported_at: i64) -> Note {
        let deleted_at = match (self.is_deleted, self.deleted_at) {
            (true, Some(at)) => Some(at.min(imported_at)),
            (true, None) => Some(imported_at),
            (false, _) => None,
        };
        Note {
            id: 0,
            title: self.title,
            content: self.content,
            timestamp: self.timestamp,
            pinned: self.is_pinned,
            category_id: self.category_id,
            deleted_at,
            images: ImageAttachments::from_json(self.image_paths.as_deref()),
            reminder_at: self.reminder_time,
        }
    }
}

impl BackupDocument {
    pub fn from_notes(notes: &[Note], exported_at: i64) -> Self {
        Self {
            version: BACKUP_VERSION,
            export_date: exported_at,
            notes_count: notes.len(),
            notes: notes.iter().map(BackupNote::from).collect(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, BackupError> {
        let doc: BackupDocument = serde_json::from_str(raw)?;
        if doc.version != BACKUP_VERSION {
            return Err(BackupError::UnsupportedVersion(doc.version));
        }
        if doc.notes_count != doc.notes.len() {
            tracing::warn!(
                declared = doc.notes_count,
                actual = doc.notes.len(),
                "backup note count does not match its contents"
            );
        }
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing backup")
    }

    pub fn into_notes(self, imported_at: i64) -> Vec<Note> {
        self.notes
            .into_iter()
            .map(|note| note.into_note(imported_at))
            .collect()
    }
}

/// `<prefix>_<millis>.<extension>` inside `dir`.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str, now: i64) -> PathBuf {
    dir.join(format!("{prefix}_{now}.{extension}"))
}

pub fn default_json_path(backup_dir: &Path, now: i64) -> PathBuf {
    timestamped_path(backup_dir, "notes_backup", "json", now)
}

pub fn default_text_path(backup_dir: &Path, now: i64) -> PathBuf {
    timestamped_path(backup_dir, "my_notes_export", "txt", now)
}

/// Writes every stored note, trash included. Returns the number written.
pub fn export_json(storage: &StorageHandle, path: &Path) -> Result<usize> {
    let notes = storage.fetch_all_notes()?;
    let doc = BackupDocument::from_notes(&notes, now_millis());
    write_file(path, &doc.to_json_pretty()?)?;
    tracing::info!(path = %path.display(), notes = notes.len(), "exported backup");
    Ok(notes.len())
}

/// Adds every note in the backup under fresh ids. Returns the new ids.
pub fn import_json(storage: &StorageHandle, path: &Path) -> Result<Vec<i64>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading backup {}", path.display()))?;
    let doc = BackupDocument::parse(&raw)
        .with_context(|| format!("parsing backup {}", path.display()))?;
    let notes = doc.into_notes(now_millis());
    let ids = storage.import_notes(&notes)?;
    tracing::info!(path = %path.display(), notes = ids.len(), "imported backup");
    Ok(ids)
}

/// Active notes in list order as a readable text document.
pub fn export_text(storage: &StorageHandle, path: &Path) -> Result<usize> {
    let notes = storage.fetch_notes()?;
    write_file(path, &render_text(&notes, now_millis()))?;
    tracing::info!(path = %path.display(), notes = notes.len(), "exported text");
    Ok(notes.len())
}

pub fn render_text(notes: &[Note], generated_at: i64) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "My Notes Export");
    let _ = writeln!(out, "Generated on: {}", format_long_date(generated_at));
    let _ = writeln!(out, "Total notes: {}", notes.len());
    let _ = writeln!(out, "{rule}\n");

    for (index, note) in notes.iter().enumerate() {
        let title = if note.title.is_empty() {
            UNTITLED
        } else {
            note.title.as_str()
        };
        let _ = writeln!(out, "{}. {title}", index + 1);
        let _ = writeln!(out, "{}", "-".repeat(ENTRY_RULE_WIDTH));
        let _ = writeln!(out, "{}\n", note.content);
        let _ = write!(out, "Created: {}", format_long_date(note.timestamp));
        if note.pinned {
            out.push_str(" (Pinned)");
        }
        if let Some(category_id) = note.category_id {
            let _ = write!(out, " (Category: {category_id})");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{rule}\n");
    }
    out
}

/// One note as shareable plain text: title, body, then a creation footer.
pub fn render_note_text(note: &Note) -> String {
    let mut out = String::new();
    if !note.title.is_empty() {
        let _ = write!(out, "{}\n\n", note.title);
    }
    out.push_str(&note.content);
    let _ = writeln!(out, "\n\n---");
    let _ = writeln!(out, "Created: {}", format_long_date(note.timestamp));
    out
}

fn format_long_date(millis: i64) -> String {
    let format = format_description!("[month repr:short] [day], [year] at [hour]:[minute]");
    millis_to_datetime(millis)
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| millis.to_string())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOptions;
    use crate::model::NoteDraft;
    use crate::storage;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn note(id: i64, title: &str) -> Note {
        Note {
            id,
            title: title.into(),
            content: format!("body {id}"),
            timestamp: 0,
            pinned: false,
            category_id: None,
            deleted_at: None,
            images: ImageAttachments::default(),
            reminder_at: None,
        }
    }

    #[test]
    fn export_omits_null_fields() -> Result<()> {
        let doc = BackupDocument::from_notes(&[note(7, "Hello")], 1_000);
        let value: serde_json::Value = serde_json::from_str(&doc.to_json_pretty()?)?;
        assert_eq!(value["version"], 1);
        assert_eq!(value["exportDate"], 1_000);
        assert_eq!(value["notesCount"], 1);
        let entry = value["notes"][0].as_object().expect("note object");
        let mut keys: Vec<&str> = entry.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["content", "id", "isDeleted", "isPinned", "timestamp", "title"]
        );
        Ok(())
    }

    #[test]
    fn image_paths_travel_as_json_string() -> Result<()> {
        let mut with_images = note(1, "pics");
        with_images.images = ImageAttachments::new(vec!["/a.jpg".into()]);
        let doc = BackupDocument::from_notes(&[with_images.clone()], 0);
        let value: serde_json::Value = serde_json::from_str(&doc.to_json_pretty()?)?;
        assert_eq!(value["notes"][0]["imagePaths"], r#"["/a.jpg"]"#);

        let restored = BackupDocument::parse(&doc.to_json_pretty()?)?.into_notes(0);
        assert_eq!(restored[0].images, with_images.images);
        Ok(())
    }

    #[test]
    fn parse_accepts_minimal_entries() -> Result<()> {
        let raw = r#"{
            "version": 1,
            "exportDate": 5,
            "notes": [{"title": "t", "content": "c", "timestamp": 9}]
        }"#;
        let notes = BackupDocument::parse(raw)?.into_notes(100);
        assert_eq!(notes.len(), 1);
        assert!(!notes[0].pinned);
        assert_eq!(notes[0].deleted_at, None);
        assert!(notes[0].images.is_empty());
        Ok(())
    }

    #[test]
    fn parse_rejects_other_versions() {
        let raw = r#"{"version": 2, "exportDate": 0, "notesCount": 0, "notes": []}"#;
        assert_matches!(
            BackupDocument::parse(raw),
            Err(BackupError::UnsupportedVersion(2))
        );
        assert_matches!(BackupDocument::parse("{"), Err(BackupError::Json(_)));
    }

    #[test]
    fn future_deletion_instant_is_clamped_to_import_time() -> Result<()> {
        let raw = r#"{
            "version": 1,
            "exportDate": 0,
            "notes": [{"title": "t", "content": "", "timestamp": 1,
                       "isDeleted": true, "deletedAt": 9223372036854775000}]
        }"#;
        let notes = BackupDocument::parse(raw)?.into_notes(5_000);
        assert_eq!(notes[0].deleted_at, Some(5_000));
        Ok(())
    }

    #[test]
    fn import_normalises_deletion_state() {
        let flagged = BackupNote {
            is_deleted: true,
            deleted_at: None,
            ..BackupNote::from(&note(1, "a"))
        };
        assert_eq!(flagged.into_note(42).deleted_at, Some(42));

        let stray_instant = BackupNote {
            is_deleted: false,
            deleted_at: Some(7),
            ..BackupNote::from(&note(2, "b"))
        };
        assert_eq!(stray_instant.into_note(42).deleted_at, None);
    }

    #[test]
    fn text_export_marks_pinned_and_category() {
        let mut pinned = note(1, "");
        pinned.pinned = true;
        pinned.category_id = Some(3);
        let rendered = render_text(&[pinned, note(2, "Second")], 0);
        insta::assert_snapshot!(rendered, @r###"
        My Notes Export
        Generated on: Jan 01, 1970 at 00:00
        Total notes: 2
        ==================================================

        1. Untitled
        ------------------------------
        body 1

        Created: Jan 01, 1970 at 00:00 (Pinned) (Category: 3)
        ==================================================

        2. Second
        ------------------------------
        body 2

        Created: Jan 01, 1970 at 00:00
        ==================================================
        "###);
    }

    #[test]
    fn single_note_text_skips_empty_title() {
        let mut titled = note(4, "Groceries");
        titled.content = "milk\neggs".into();
        titled.timestamp = 1_700_000_000_000;
        insta::assert_snapshot!(render_note_text(&titled), @r###"
        Groceries

        milk
        eggs

        ---
        Created: Nov 14, 2023 at 22:13
        "###);

        let untitled = note(5, "");
        assert_eq!(
            render_note_text(&untitled),
            "body 5\n\n---\nCreated: Jan 01, 1970 at 00:00\n"
        );
    }

    #[test]
    fn export_then_import_assigns_fresh_ids() -> Result<()> {
        let temp = TempDir::new()?;
        let storage = storage::init(&StorageOptions {
            database_path: temp.path().join("notes.db"),
            ..StorageOptions::default()
        })?;
        let kept = storage.insert_note(&NoteDraft::new("kept", "x").pinned(true))?;
        let binned = storage.insert_note(&NoteDraft::new("binned", "y"))?;
        storage.move_to_trash(binned, 123)?;

        let path = default_json_path(&temp.path().join("backups"), 1);
        assert_eq!(export_json(&storage, &path)?, 2);
        let ids = import_json(&storage, &path)?;
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&kept) && !ids.contains(&binned));
        assert_eq!(storage.fetch_all_notes()?.len(), 4);
        assert_eq!(storage.trash_count()?, 2);

        let text_path = default_text_path(temp.path(), 1);
        assert_eq!(export_text(&storage, &text_path)?, 2);
        assert!(fs::read_to_string(&text_path)?.contains("Total notes: 2"));
        Ok(())
    }
}
