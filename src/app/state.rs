use anyhow::Result;
use crossbeam_channel::Sender;
use indexmap::IndexMap;
use ratatui::layout::Rect;
use strum::Display;

use crate::list::{NoteInteraction, NoteList, RowView};
use crate::model::{Category, Note};
use crate::storage::StorageHandle;
use crate::timefmt::TimeAgoTemplates;

const MILLIS_PER_SECOND: i64 = 1_000;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ListView {
    Notes,
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    List,
    Detail,
}

/// Row interactions forwarded from the list to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    Open(i64),
    Options { note_id: i64, anchor: Rect },
}

pub struct ChannelObserver {
    tx: Sender<ListEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<ListEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: ListEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "list event receiver gone");
        }
    }
}

impl NoteInteraction<Rect> for ChannelObserver {
    fn on_primary(&mut self, note: &Note) {
        self.forward(ListEvent::Open(note.id));
    }

    fn on_secondary(&mut self, note: &Note, anchor: &Rect) {
        self.forward(ListEvent::Options {
            note_id: note.id,
            anchor: *anchor,
        });
    }
}

#[derive(Debug, Clone)]
pub struct TrashStatus {
    pub label: String,
    pub expired: bool,
    pub indefinite: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub active: bool,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DraftField {
    #[default]
    Title,
    Body,
}

#[derive(Debug, Clone, Default)]
pub struct NewNoteOverlay {
    pub title: String,
    pub body: String,
    pub field: DraftField,
    /// Set when the overlay edits an existing note instead of creating one.
    pub editing: Option<i64>,
}

impl NewNoteOverlay {
    pub fn push(&mut self, ch: char) {
        match self.field {
            DraftField::Title => {
                if self.title.chars().count() < MAX_TITLE_CHARS {
                    self.title.push(ch);
                }
            }
            DraftField::Body => self.body.push(ch),
        }
    }

    pub fn pop(&mut self) {
        match self.field {
            DraftField::Title => self.title.pop(),
            DraftField::Body => self.body.pop(),
        };
    }

    pub fn switch_field(&mut self) {
        self.field = match self.field {
            DraftField::Title => DraftField::Body,
            DraftField::Body => DraftField::Title,
        };
    }
}

/// Per-note actions popup, drawn next to the row it was opened from.
#[derive(Debug, Clone)]
pub struct OptionsOverlay {
    pub note_id: i64,
    pub title: String,
    pub pinned: bool,
    pub trashed: bool,
    pub anchor: Rect,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    NewNote(NewNoteOverlay),
    Options(OptionsOverlay),
    EmptyTrash { count: usize },
}

#[derive(Debug)]
pub struct AppState {
    pub view: ListView,
    pub focus: FocusPane,
    pub selected: usize,
    pub opened: Option<i64>,
    pub retention_days: u32,
    pub list: NoteList<Rect>,
    pub rows: Vec<RowView>,
    pub categories: IndexMap<i64, Category>,
    pub search: SearchState,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
}

impl AppState {
    pub fn new(templates: TimeAgoTemplates, retention_days: u32) -> Self {
        Self {
            view: ListView::Notes,
            focus: FocusPane::List,
            selected: 0,
            opened: None,
            retention_days,
            list: NoteList::new(templates),
            rows: Vec::new(),
            categories: IndexMap::new(),
            search: SearchState::default(),
            status_message: None,
            overlay: None,
        }
    }

    pub fn load(
        storage: &StorageHandle,
        templates: TimeAgoTemplates,
        retention_days: u32,
    ) -> Result<Self> {
        let mut state = Self::new(templates, retention_days);
        state.refresh(storage)?;
        Ok(state)
    }

    pub fn len(&self) -> usize {
        self.list.count()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Row position of the selection, `None` while the list is empty.
    pub fn selected_position(&self) -> Option<usize> {
        (!self.list.is_empty()).then_some(self.selected)
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.list.note(self.selected)
    }

    pub fn selected_note_id(&self) -> Option<i64> {
        self.selected_note().map(|note| note.id)
    }

    pub fn refresh(&mut self, storage: &StorageHandle) -> Result<()> {
        let notes = match self.view {
            ListView::Trash => storage.fetch_trashed_notes()?,
            ListView::Notes if !self.search.query.trim().is_empty() => {
                storage.search_notes(&self.search.query)?
            }
            ListView::Notes => storage.fetch_notes()?,
        };
        self.categories = storage.category_index()?;
        let previous = self.selected_note_id();
        self.list.replace(Some(notes));
        match previous {
            Some(note_id) => self.select_note_by_id(note_id),
            None => self.normalize_selection(),
        }
        if let Some(opened) = self.opened {
            if self.list.position_of(opened).is_none() {
                self.opened = None;
            }
        }
        Ok(())
    }

    /// Re-projects cached rows when the list signalled a refresh.
    pub fn sync_rows(&mut self, now: i64) -> bool {
        match self.list.take_refresh() {
            Some(refresh) => {
                tracing::trace!(generation = refresh.generation, rows = refresh.rows, "rebinding rows");
                self.rows = (0..self.list.count())
                    .filter_map(|index| self.list.bind_row_at(index, now).ok())
                    .collect();
                true
            }
            None => false,
        }
    }

    /// Relative labels drift with the clock, so rows are re-projected periodically.
    pub fn relabel(&mut self, now: i64) {
        self.rows = self.list.rows_at(now);
    }

    pub fn select_note_by_id(&mut self, note_id: i64) {
        if let Some(index) = self.list.position_of(note_id) {
            self.selected = index;
        } else {
            self.normalize_selection();
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.list.is_empty() {
            return;
        }
        let last = self.list.count() as isize - 1;
        let next = (self.selected as isize + delta).clamp(0, last);
        self.selected = next as usize;
    }

    fn normalize_selection(&mut self) {
        let count = self.list.count();
        if count == 0 {
            self.selected = 0;
        } else if self.selected >= count {
            self.selected = count - 1;
        }
    }

    pub fn set_view(&mut self, view: ListView, storage: &StorageHandle) -> Result<()> {
        if self.view == view {
            return Ok(());
        }
        self.view = view;
        self.selected = 0;
        self.opened = None;
        self.search = SearchState::default();
        self.focus = FocusPane::List;
        self.refresh(storage)
    }

    pub fn open_note(&mut self, note_id: i64) {
        if self.list.position_of(note_id).is_some() {
            self.opened = Some(note_id);
            self.focus = FocusPane::Detail;
        }
    }

    pub fn close_detail(&mut self) {
        self.opened = None;
        self.focus = FocusPane::List;
    }

    pub fn opened_note(&self) -> Option<&Note> {
        let index = self.list.position_of(self.opened?)?;
        self.list.note(index)
    }

    pub fn category_of(&self, note: &Note) -> Option<&Category> {
        note.category_id.and_then(|id| self.categories.get(&id))
    }

    pub fn begin_search(&mut self) {
        self.search.active = true;
        self.focus = FocusPane::List;
    }

    pub fn finish_search(&mut self) {
        self.search.active = false;
    }

    pub fn cancel_search(&mut self, storage: &StorageHandle) -> Result<()> {
        self.search = SearchState::default();
        self.refresh(storage)
    }

    pub fn push_search_char(&mut self, storage: &StorageHandle, ch: char) -> Result<()> {
        self.search.query.push(ch);
        self.refresh(storage)
    }

    pub fn pop_search_char(&mut self, storage: &StorageHandle) -> Result<()> {
        if self.search.query.pop().is_some() {
            self.refresh(storage)?;
        }
        Ok(())
    }

    pub fn is_search_active(&self) -> bool {
        self.search.active
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn open_new_note(&mut self) {
        self.overlay = Some(OverlayState::NewNote(NewNoteOverlay::default()));
    }

    /// Opens the note overlay pre-filled with the selected active note.
    pub fn open_edit_note(&mut self) -> bool {
        let Some(note) = self.selected_note().filter(|note| !note.is_deleted()) else {
            return false;
        };
        let overlay = NewNoteOverlay {
            title: note.title.clone(),
            body: note.content.clone(),
            field: DraftField::Title,
            editing: Some(note.id),
        };
        self.overlay = Some(OverlayState::NewNote(overlay));
        true
    }

    pub fn new_note_overlay_mut(&mut self) -> Option<&mut NewNoteOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::NewNote(draft)) => Some(draft),
            _ => None,
        }
    }

    pub fn open_options(&mut self, note_id: i64, anchor: Rect) {
        let Some(note) = self
            .list
            .position_of(note_id)
            .and_then(|index| self.list.note(index))
        else {
            return;
        };
        self.overlay = Some(OverlayState::Options(OptionsOverlay {
            note_id,
            title: note.display_title().to_string(),
            pinned: note.pinned,
            trashed: note.is_deleted(),
            anchor,
        }));
    }

    pub fn options_overlay(&self) -> Option<&OptionsOverlay> {
        match self.overlay.as_ref() {
            Some(OverlayState::Options(options)) => Some(options),
            _ => None,
        }
    }

    pub fn trash_status(&self, note: &Note, now: i64) -> Option<TrashStatus> {
        compute_trash_status(note.deleted_at, self.retention_days, now)
    }
}

/// Purge countdown for a trashed note. Instants are epoch milliseconds.
pub fn compute_trash_status(
    deleted_at: Option<i64>,
    retention_days: u32,
    now: i64,
) -> Option<TrashStatus> {
    let deleted_at = deleted_at?;
    if retention_days == 0 {
        return Some(TrashStatus {
            label: "Manual purge only".into(),
            expired: false,
            indefinite: true,
        });
    }

    let purge_at = deleted_at
        .saturating_add(i64::from(retention_days) * SECONDS_PER_DAY * MILLIS_PER_SECOND);
    let remaining = purge_at.saturating_sub(now) / MILLIS_PER_SECOND;
    if remaining <= 0 {
        return Some(TrashStatus {
            label: "Expired, purge soon".into(),
            expired: true,
            indefinite: false,
        });
    }

    let label = if remaining >= SECONDS_PER_DAY * 2 {
        format!("{}d left", remaining / SECONDS_PER_DAY)
    } else if remaining >= SECONDS_PER_DAY {
        let days = remaining / SECONDS_PER_DAY;
        let hours = (remaining % SECONDS_PER_DAY + SECONDS_PER_HOUR - 1) / SECONDS_PER_HOUR;
        if hours == 0 {
            format!("{days}d left")
        } else {
            format!("{days}d {hours}h left")
        }
    } else if remaining >= SECONDS_PER_HOUR {
        format!("{}h left", (remaining + SECONDS_PER_HOUR - 1) / SECONDS_PER_HOUR)
    } else {
        format!("{}m left", (remaining + 59) / 60)
    };

    Some(TrashStatus {
        label,
        expired: false,
        indefinite: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    use crate::config::StorageOptions;
    use crate::model::NoteDraft;
    use crate::storage;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = SECONDS_PER_DAY * MILLIS_PER_SECOND;

    fn setup() -> Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let storage = storage::init(&StorageOptions {
            database_path: temp.path().join("notes.db"),
            ..StorageOptions::default()
        })?;
        Ok((temp, storage))
    }

    #[test]
    fn trash_status_manual_purge_only_when_retention_zero() {
        let status = compute_trash_status(Some(NOW), 0, NOW).expect("status");
        assert_eq!(status.label, "Manual purge only");
        assert!(!status.expired);
        assert!(status.indefinite);
        assert!(compute_trash_status(None, 30, NOW).is_none());
    }

    #[test]
    fn trash_status_marks_expired_when_past_retention_window() {
        let status = compute_trash_status(Some(NOW - 2 * DAY_MS), 1, NOW).expect("status");
        assert!(status.expired);
        assert!(status.label.contains("Expired"));
        assert!(!status.indefinite);
    }

    #[test]
    fn trash_status_reports_remaining_time() {
        let hour_left = NOW - (DAY_MS - SECONDS_PER_HOUR * MILLIS_PER_SECOND);
        let status = compute_trash_status(Some(hour_left), 1, NOW).expect("status");
        assert_eq!(status.label, "1h left");

        let status = compute_trash_status(Some(NOW), 30, NOW).expect("status");
        assert_eq!(status.label, "30d left");
    }

    #[test]
    fn trash_status_saturates_at_extreme_instants() {
        let status = compute_trash_status(Some(i64::MAX - 1_000), 30, NOW).expect("status");
        assert!(!status.expired);
        assert!(status.label.ends_with("d left"));

        let status = compute_trash_status(Some(i64::MIN + 1_000), 30, i64::MAX).expect("status");
        assert!(status.expired);
    }

    #[test]
    fn channel_observer_forwards_row_events() {
        let (tx, rx) = unbounded();
        let mut list: NoteList<Rect> = NoteList::default();
        list.set_interaction_observer(Some(Box::new(ChannelObserver::new(tx))));
        list.replace(Some(vec![Note {
            id: 4,
            title: "t".into(),
            content: String::new(),
            timestamp: NOW,
            pinned: false,
            category_id: None,
            deleted_at: None,
            images: Default::default(),
            reminder_at: None,
        }]));

        let anchor = Rect::new(1, 2, 30, 3);
        list.dispatch_primary(Some(0));
        list.dispatch_secondary(Some(0), &anchor);
        list.dispatch_secondary(None, &anchor);
        assert_eq!(rx.try_recv(), Ok(ListEvent::Open(4)));
        assert_eq!(
            rx.try_recv(),
            Ok(ListEvent::Options { note_id: 4, anchor })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rows_rebind_only_after_refresh() -> Result<()> {
        let (_temp, storage) = setup()?;
        storage.insert_note(&NoteDraft::new("first", "").at(NOW - 120_000))?;
        let mut state = AppState::load(&storage, TimeAgoTemplates::english(), 30)?;

        assert!(state.sync_rows(NOW));
        assert_eq!(state.rows.len(), 1);
        assert_eq!(state.rows[0].timestamp_label, "2m ago");
        assert!(!state.sync_rows(NOW + 3_600_000));
        assert_eq!(state.rows[0].timestamp_label, "2m ago");

        state.relabel(NOW + 3_600_000);
        assert_eq!(state.rows[0].timestamp_label, "1h ago");
        Ok(())
    }

    #[test]
    fn refresh_keeps_selection_on_same_note() -> Result<()> {
        let (_temp, storage) = setup()?;
        let older = storage.insert_note(&NoteDraft::new("older", "").at(1))?;
        storage.insert_note(&NoteDraft::new("newer", "").at(2))?;
        let mut state = AppState::load(&storage, TimeAgoTemplates::english(), 30)?;
        state.move_selection(5);
        assert_eq!(state.selected_note_id(), Some(older));

        storage.set_pinned(older, true)?;
        state.refresh(&storage)?;
        assert_eq!(state.selected, 0);
        assert_eq!(state.selected_note_id(), Some(older));
        Ok(())
    }

    #[test]
    fn search_narrows_and_cancel_restores() -> Result<()> {
        let (_temp, storage) = setup()?;
        storage.insert_note(&NoteDraft::new("groceries", "milk"))?;
        storage.insert_note(&NoteDraft::new("work", "deploy"))?;
        let mut state = AppState::load(&storage, TimeAgoTemplates::english(), 30)?;

        state.begin_search();
        for ch in "MILK".chars() {
            state.push_search_char(&storage, ch)?;
        }
        assert_eq!(state.len(), 1);
        state.pop_search_char(&storage)?;
        assert_eq!(state.search.query, "MIL");
        state.cancel_search(&storage)?;
        assert_eq!(state.len(), 2);
        assert!(!state.is_search_active());
        Ok(())
    }

    #[test]
    fn empty_list_has_no_selected_position() {
        let state = AppState::new(TimeAgoTemplates::english(), 30);
        assert_eq!(state.selected_position(), None);
        assert!(state.selected_note().is_none());
    }
}
