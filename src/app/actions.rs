use anyhow::Result;

use crate::config::TrashOptions;
use crate::model::{NoteDraft, NoteEdit};
use crate::storage::StorageHandle;

pub struct ActionDispatcher<'a> {
    storage: &'a StorageHandle,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(storage: &'a StorageHandle) -> Self {
        Self { storage }
    }

    pub fn create_note(&self, title: &str, body: &str) -> Result<i64> {
        self.storage.insert_note(&NoteDraft::new(title.trim(), body))
    }

    pub fn edit_note(&self, note_id: i64, title: &str, body: &str, now: i64) -> Result<()> {
        let edit = NoteEdit {
            title: Some(title.to_string()),
            content: Some(body.to_string()),
            category_id: None,
        };
        self.storage.edit_note(note_id, &edit, now).map(|_| ())
    }

    pub fn toggle_pin(&self, note_id: i64, pin: bool) -> Result<()> {
        self.storage.set_pinned(note_id, pin)
    }

    pub fn move_to_trash(&self, note_id: i64, now: i64) -> Result<()> {
        self.storage.move_to_trash(note_id, now)
    }

    pub fn restore(&self, note_id: i64) -> Result<()> {
        self.storage.restore_from_trash(note_id)
    }

    pub fn delete_permanently(&self, note_id: i64) -> Result<()> {
        self.storage.delete_note(note_id)
    }

    pub fn empty_trash(&self) -> Result<usize> {
        self.storage.empty_trash()
    }

    pub fn purge_expired(&self, trash: &TrashOptions, now: i64) -> Result<usize> {
        self.storage.purge_expired_trash(trash, now)
    }
}
