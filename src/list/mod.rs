//! Presentation model behind the note list.
//!
//! [`NoteList`] holds the sequence of notes currently on screen, projects
//! rows for the renderer and routes row interactions to a single observer.
//! It never talks to storage: callers re-supply the whole sequence through
//! [`NoteList::replace`] after every mutation.

use std::fmt;

use thiserror::Error;

use crate::model::Note;
use crate::timefmt::{now_millis, TimeAgoTemplates};

mod observer;
mod row;

pub use observer::{interaction_fn, InteractionFns, NoteInteraction};
pub use row::RowView;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("row {index} out of range for {len} notes")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Outcome of routing a row interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    NoObserver,
    /// The row had no valid position (detached or stale); the event was discarded.
    Dropped,
}

/// Full-refresh signal raised by [`NoteList::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    pub generation: u64,
    pub rows: usize,
}

pub struct NoteList<A: ?Sized = ()> {
    notes: Vec<Note>,
    observer: Option<Box<dyn NoteInteraction<A>>>,
    templates: TimeAgoTemplates,
    generation: u64,
    pending_refresh: bool,
}

impl<A: ?Sized> Default for NoteList<A> {
    fn default() -> Self {
        Self::new(TimeAgoTemplates::english())
    }
}

impl<A: ?Sized> fmt::Debug for NoteList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteList")
            .field("notes", &self.notes.len())
            .field("observer", &self.observer.is_some())
            .field("generation", &self.generation)
            .field("pending_refresh", &self.pending_refresh)
            .finish()
    }
}

impl<A: ?Sized> NoteList<A> {
    pub fn new(templates: TimeAgoTemplates) -> Self {
        Self {
            notes: Vec::new(),
            observer: None,
            templates,
            generation: 0,
            pending_refresh: false,
        }
    }

    pub fn templates(&self) -> &TimeAgoTemplates {
        &self.templates
    }

    /// Swapping templates changes every label, so it raises a refresh too.
    pub fn set_templates(&mut self, templates: TimeAgoTemplates) {
        self.templates = templates;
        self.signal_refresh();
    }

    /// Swaps the displayed sequence. `None` empties the list.
    pub fn replace(&mut self, notes: Option<Vec<Note>>) {
        self.notes = notes.unwrap_or_default();
        tracing::debug!(rows = self.notes.len(), "note list replaced");
        self.signal_refresh();
    }

    pub fn count(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn position_of(&self, note_id: i64) -> Option<usize> {
        self.notes.iter().position(|note| note.id == note_id)
    }

    pub fn bind_row(&self, index: usize) -> Result<RowView, ListError> {
        self.bind_row_at(index, now_millis())
    }

    pub fn bind_row_at(&self, index: usize, now: i64) -> Result<RowView, ListError> {
        let note = self.notes.get(index).ok_or(ListError::IndexOutOfRange {
            index,
            len: self.notes.len(),
        })?;
        Ok(RowView::project(note, now, &self.templates))
    }

    /// Every row, in display order, projected against the same `now`.
    pub fn rows_at(&self, now: i64) -> Vec<RowView> {
        self.notes
            .iter()
            .map(|note| RowView::project(note, now, &self.templates))
            .collect()
    }

    /// Consumes the pending refresh. Replacements made since the last call
    /// coalesce into a single signal.
    pub fn take_refresh(&mut self) -> Option<Refresh> {
        if !self.pending_refresh {
            return None;
        }
        self.pending_refresh = false;
        Some(Refresh {
            generation: self.generation,
            rows: self.notes.len(),
        })
    }

    pub fn set_interaction_observer(&mut self, observer: Option<Box<dyn NoteInteraction<A>>>) {
        self.observer = observer;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    pub fn dispatch_primary(&mut self, position: Option<usize>) -> Dispatch {
        let Some(note) = position.and_then(|index| self.notes.get(index)) else {
            tracing::trace!(?position, "dropping primary action without a valid row");
            return Dispatch::Dropped;
        };
        match self.observer.as_mut() {
            Some(observer) => {
                observer.on_primary(note);
                Dispatch::Delivered
            }
            None => Dispatch::NoObserver,
        }
    }

    pub fn dispatch_secondary(&mut self, position: Option<usize>, anchor: &A) -> Dispatch {
        let Some(note) = position.and_then(|index| self.notes.get(index)) else {
            tracing::trace!(?position, "dropping secondary action without a valid row");
            return Dispatch::Dropped;
        };
        match self.observer.as_mut() {
            Some(observer) => {
                observer.on_secondary(note, anchor);
                Dispatch::Delivered
            }
            None => Dispatch::NoObserver,
        }
    }

    fn signal_refresh(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending_refresh = true;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::model::ImageAttachments;

    const NOW: i64 = 1_700_000_000_000;

    fn note(id: i64, title: &str, pinned: bool) -> Note {
        Note {
            id,
            title: title.into(),
            content: format!("content {id}"),
            timestamp: NOW - id * 60_000,
            pinned,
            category_id: None,
            deleted_at: None,
            images: ImageAttachments::default(),
            reminder_at: None,
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Primary(i64),
        Secondary(i64, &'static str),
    }

    fn recorder() -> (Rc<RefCell<Vec<Seen>>>, Box<dyn NoteInteraction<&'static str>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let primary = Rc::clone(&seen);
        let secondary = Rc::clone(&seen);
        let observer = interaction_fn(
            move |note: &Note| primary.borrow_mut().push(Seen::Primary(note.id)),
            move |note: &Note, anchor: &&'static str| {
                secondary
                    .borrow_mut()
                    .push(Seen::Secondary(note.id, *anchor))
            },
        );
        (seen, Box::new(observer))
    }

    #[test]
    fn replace_sets_count_and_none_empties() {
        let mut list: NoteList = NoteList::default();
        assert_eq!(list.count(), 0);
        list.replace(Some(vec![note(1, "a", false), note(2, "b", false)]));
        assert_eq!(list.count(), 2);
        list.replace(None);
        assert_eq!(list.count(), 0);
        assert!(list.is_empty());
        list.replace(Some(Vec::new()));
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn keeps_supplied_order() {
        let mut list: NoteList = NoteList::default();
        list.replace(Some(vec![note(3, "c", false), note(1, "a", true), note(2, "b", false)]));
        let ids: Vec<i64> = list.notes().iter().map(|note| note.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(list.position_of(1), Some(1));
        assert_eq!(list.position_of(42), None);
    }

    #[test]
    fn bind_row_projects_fields() -> Result<(), ListError> {
        let mut list: NoteList = NoteList::default();
        list.replace(Some(vec![note(1, "", true), note(2, "Shopping", false)]));

        let first = list.bind_row_at(0, NOW)?;
        assert_eq!(first.title, "Untitled");
        assert_eq!(first.content, "content 1");
        assert_eq!(first.timestamp_label, "1m ago");
        assert!(first.pinned_visible);

        let second = list.bind_row_at(1, NOW)?;
        assert_eq!(second.title, "Shopping");
        assert_eq!(second.timestamp_label, "2m ago");
        assert!(!second.pinned_visible);
        Ok(())
    }

    #[test]
    fn bind_row_rejects_out_of_range() {
        let mut list: NoteList = NoteList::default();
        assert_matches!(
            list.bind_row(0),
            Err(ListError::IndexOutOfRange { index: 0, len: 0 })
        );
        list.replace(Some(vec![note(1, "a", false)]));
        assert_matches!(
            list.bind_row_at(1, NOW),
            Err(ListError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn bind_row_is_stable_between_replacements() -> Result<(), ListError> {
        let mut list: NoteList = NoteList::default();
        list.replace(Some(vec![note(1, "a", false)]));
        let before = list.bind_row_at(0, NOW)?;
        let _ = list.take_refresh();
        let _ = list.dispatch_primary(Some(0));
        assert_eq!(list.bind_row_at(0, NOW)?, before);
        assert_eq!(list.rows_at(NOW), vec![before]);
        Ok(())
    }

    #[test]
    fn custom_templates_feed_labels() -> Result<(), ListError> {
        let mut list: NoteList = NoteList::new(TimeAgoTemplates {
            minutes: "vor {n} Min.".into(),
            ..TimeAgoTemplates::english()
        });
        list.replace(Some(vec![note(5, "x", false)]));
        assert_eq!(list.bind_row_at(0, NOW)?.timestamp_label, "vor 5 Min.");
        Ok(())
    }

    #[test]
    fn replacements_coalesce_into_one_refresh() {
        let mut list: NoteList = NoteList::default();
        assert_eq!(list.take_refresh(), None);
        list.replace(Some(vec![note(1, "a", false)]));
        list.replace(Some(vec![note(1, "a", false), note(2, "b", false)]));
        let refresh = list.take_refresh().expect("refresh pending");
        assert_eq!(refresh.rows, 2);
        assert_eq!(refresh.generation, 2);
        assert_eq!(list.take_refresh(), None);

        list.set_templates(TimeAgoTemplates::english());
        assert_matches!(list.take_refresh(), Some(Refresh { rows: 2, .. }));
    }

    #[test]
    fn dispatch_routes_to_observer() {
        let mut list: NoteList<&'static str> = NoteList::default();
        let (seen, observer) = recorder();
        list.set_interaction_observer(Some(observer));
        list.replace(Some(vec![note(1, "a", false), note(2, "b", false)]));

        assert_eq!(list.dispatch_primary(Some(1)), Dispatch::Delivered);
        assert_eq!(list.dispatch_secondary(Some(0), &"more"), Dispatch::Delivered);
        assert_eq!(
            *seen.borrow(),
            vec![Seen::Primary(2), Seen::Secondary(1, "more")]
        );
    }

    #[test]
    fn invalid_positions_are_dropped_silently() {
        let mut list: NoteList<&'static str> = NoteList::default();
        let (seen, observer) = recorder();
        list.set_interaction_observer(Some(observer));
        list.replace(Some(vec![note(1, "a", false)]));

        assert_eq!(list.dispatch_primary(None), Dispatch::Dropped);
        assert_eq!(list.dispatch_primary(Some(1)), Dispatch::Dropped);
        assert_eq!(list.dispatch_secondary(None, &"more"), Dispatch::Dropped);
        assert_eq!(list.dispatch_secondary(Some(7), &"more"), Dispatch::Dropped);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn dispatch_without_observer_is_a_no_op() {
        let mut list: NoteList<&'static str> = NoteList::default();
        list.replace(Some(vec![note(1, "a", false)]));
        assert_eq!(list.dispatch_primary(Some(0)), Dispatch::NoObserver);
        assert_eq!(list.dispatch_secondary(Some(0), &"more"), Dispatch::NoObserver);
    }

    #[test]
    fn clearing_observer_suppresses_dispatch() {
        let mut list: NoteList<&'static str> = NoteList::default();
        let (seen, observer) = recorder();
        list.set_interaction_observer(Some(observer));
        list.replace(Some(vec![note(1, "a", false)]));
        assert_eq!(list.dispatch_primary(Some(0)), Dispatch::Delivered);

        list.set_interaction_observer(None);
        assert!(!list.has_observer());
        assert_eq!(list.dispatch_primary(Some(0)), Dispatch::NoObserver);
        assert_eq!(list.dispatch_secondary(Some(0), &"more"), Dispatch::NoObserver);
        assert_eq!(*seen.borrow(), vec![Seen::Primary(1)]);
    }

    #[test]
    fn replacing_observer_routes_to_latest() {
        let mut list: NoteList<&'static str> = NoteList::default();
        let (first_seen, first) = recorder();
        let (second_seen, second) = recorder();
        list.replace(Some(vec![note(1, "a", false)]));
        list.set_interaction_observer(Some(first));
        list.set_interaction_observer(Some(second));
        list.dispatch_primary(Some(0));
        assert!(first_seen.borrow().is_empty());
        assert_eq!(*second_seen.borrow(), vec![Seen::Primary(1)]);
    }
}
