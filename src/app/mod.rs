use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::list::Dispatch;
use crate::storage::StorageHandle;
use crate::timefmt::now_millis;
use crate::ui;

mod actions;
pub mod state;

pub use state::{
    AppState, ChannelObserver, DraftField, FocusPane, ListEvent, ListView, NewNoteOverlay,
    OptionsOverlay, OverlayState, TrashStatus,
};

const RELABEL_EVERY: Duration = Duration::from_secs(60);

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    Open,
    ShowOptions,
    CloseDetail,
    Refresh,
    NewNote,
    EditNote,
    StartSearch,
    TogglePin,
    TrashNote,
    ToggleTrashView,
    RestoreNote,
    EmptyTrash,
}

pub struct App {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    state: AppState,
    list_state: ListState,
    list_area: Rect,
    events: Receiver<ListEvent>,
    should_quit: bool,
    tick_rate: Duration,
    last_relabel: Instant,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let purged = if config.trash.purge_on_start {
            actions::ActionDispatcher::new(&storage)
                .purge_expired(&config.trash, now_millis())
                .context("purging expired trash on start")?
        } else {
            0
        };
        let mut state =
            AppState::load(&storage, config.time_ago.clone(), config.trash.retention_days)
                .context("loading notes for initial state")?;
        let (tx, events) = crossbeam_channel::unbounded();
        state
            .list
            .set_interaction_observer(Some(Box::new(ChannelObserver::new(tx))));
        if purged > 0 {
            tracing::info!(purged, "purged expired trash");
            state.set_status_message(Some(format!(
                "Purged {purged} expired note{} from trash",
                if purged == 1 { "" } else { "s" }
            )));
        }
        Ok(Self {
            config,
            storage,
            state,
            list_state: ListState::default(),
            list_area: Rect::default(),
            events,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
            last_relabel: Instant::now(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            self.state.sync_rows(now_millis());
            self.list_state.select(self.state.selected_position());
            let palette = self.config.theme.palette();
            let mut list_area = self.list_area;
            terminal
                .draw(|frame| {
                    list_area = ui::draw_app(frame, &self.state, &mut self.list_state, &palette);
                })
                .context("rendering frame")?;
            self.list_area = list_area;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        if self.last_relabel.elapsed() >= RELABEL_EVERY {
            self.state.relabel(now_millis());
            self.last_relabel = Instant::now();
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            self.drain_list_events();
            return;
        }

        if self.state.is_search_active() && self.handle_search_key(key) {
            return;
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Refresh)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Enter => Some(Action::Open),
            KeyCode::Esc => Some(Action::CloseDetail),
            KeyCode::Char('m') if plain(&key) => Some(Action::ShowOptions),
            KeyCode::Char('a') if plain(&key) => Some(Action::NewNote),
            KeyCode::Char('e') if plain(&key) => Some(Action::EditNote),
            KeyCode::Char('p') if plain(&key) => Some(Action::TogglePin),
            KeyCode::Char('d') if plain(&key) => Some(Action::TrashNote),
            KeyCode::Char('u') if plain(&key) => Some(Action::RestoreNote),
            KeyCode::Char('/') if plain(&key) => Some(Action::StartSearch),
            KeyCode::Char('T') => Some(Action::ToggleTrashView),
            KeyCode::Char('X') => Some(Action::EmptyTrash),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
        self.drain_list_events();
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::Open => {
                let position = self.state.selected_position();
                self.state.list.dispatch_primary(position);
            }
            Action::ShowOptions => {
                let position = self.state.selected_position();
                let anchor = position
                    .and_then(|index| {
                        ui::row_anchor(self.list_area, self.list_state.offset(), index)
                    })
                    .unwrap_or(self.list_area);
                if self.state.list.dispatch_secondary(position, &anchor) == Dispatch::Dropped {
                    self.state.set_status_message(Some("No note selected"));
                }
            }
            Action::CloseDetail => self.state.close_detail(),
            Action::Refresh => self.refresh_with_status("Notes refreshed"),
            Action::NewNote => {
                if self.state.view == ListView::Trash {
                    self.state
                        .set_status_message(Some("Leave the trash (T) to create notes"));
                    return;
                }
                self.state.open_new_note();
                self.state.set_status_message(Some(
                    "New note: Tab switch field • Enter save • Esc cancel",
                ));
            }
            Action::EditNote => {
                if self.state.view == ListView::Trash {
                    self.state
                        .set_status_message(Some("Restore the note before editing it"));
                    return;
                }
                if self.state.open_edit_note() {
                    self.state.set_status_message(Some(
                        "Edit note: Tab switch field • Enter save • Esc cancel",
                    ));
                } else {
                    self.state.set_status_message(Some("No note selected"));
                }
            }
            Action::StartSearch => {
                if self.state.view == ListView::Trash {
                    self.state
                        .set_status_message(Some("Search is only available for active notes"));
                    return;
                }
                self.state.begin_search();
            }
            Action::TogglePin => {
                if let Some(note_id) = self.state.selected_note_id() {
                    self.toggle_pin(note_id);
                }
            }
            Action::TrashNote => {
                if let Some(note_id) = self.state.selected_note_id() {
                    match self.state.view {
                        ListView::Notes => self.trash_note(note_id),
                        ListView::Trash => self.delete_permanently(note_id),
                    }
                }
            }
            Action::ToggleTrashView => self.handle_toggle_trash_view(),
            Action::RestoreNote => {
                if self.state.view != ListView::Trash {
                    self.state
                        .set_status_message(Some("Restore only available in trash view"));
                    return;
                }
                if let Some(note_id) = self.state.selected_note_id() {
                    self.restore_note(note_id);
                }
            }
            Action::EmptyTrash => {
                if self.state.view != ListView::Trash {
                    self.state
                        .set_status_message(Some("Open the trash (T) to empty it"));
                    return;
                }
                if self.state.is_empty() {
                    self.state.set_status_message(Some("Trash is already empty"));
                    return;
                }
                self.state.overlay = Some(OverlayState::EmptyTrash {
                    count: self.state.len(),
                });
            }
        }
    }

    fn drain_list_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ListEvent::Open(note_id) => self.state.open_note(note_id),
                ListEvent::Options { note_id, anchor } => {
                    self.state.open_options(note_id, anchor);
                    let hint = match self.state.view {
                        ListView::Notes => "p pin/unpin • d move to trash • Esc close",
                        ListView::Trash => "p restore • d delete forever • Esc close",
                    };
                    self.state.set_status_message(Some(hint));
                }
            }
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        let result = match key.code {
            KeyCode::Esc => self.state.cancel_search(&self.storage),
            KeyCode::Enter => {
                self.state.finish_search();
                Ok(())
            }
            KeyCode::Backspace => self.state.pop_search_char(&self.storage),
            KeyCode::Char(ch) if plain(&key) => self.state.push_search_char(&self.storage, ch),
            _ => return false,
        };
        if let Err(err) = result {
            tracing::error!(?err, "failed to update search");
            self.state.set_status_message(Some("Search failed"));
        }
        true
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::NewNote(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Canceled"));
                    }
                    KeyCode::Enter => self.submit_new_note(),
                    KeyCode::Tab => {
                        if let Some(draft) = self.state.new_note_overlay_mut() {
                            draft.switch_field();
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(draft) = self.state.new_note_overlay_mut() {
                            draft.pop();
                        }
                    }
                    KeyCode::Char(ch) if plain(&key) => {
                        if let Some(draft) = self.state.new_note_overlay_mut() {
                            draft.push(ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::Options(options)) => {
                let note_id = options.note_id;
                let pinned = options.pinned;
                let trashed = options.trashed;
                match key.code {
                    KeyCode::Esc | KeyCode::Char('m') => {
                        self.state.close_overlay();
                        self.state.set_status_message(None::<String>);
                    }
                    KeyCode::Char('p') if plain(&key) => {
                        self.state.close_overlay();
                        if trashed {
                            self.restore_note(note_id);
                        } else {
                            self.apply_pin(note_id, !pinned);
                        }
                    }
                    KeyCode::Char('d') if plain(&key) => {
                        self.state.close_overlay();
                        if trashed {
                            self.delete_permanently(note_id);
                        } else {
                            self.trash_note(note_id);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::EmptyTrash { .. }) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Kept the trash"));
                    }
                    KeyCode::Enter => {
                        self.state.close_overlay();
                        self.empty_trash();
                    }
                    _ => {}
                }
                true
            }
            None => false,
        }
    }

    fn submit_new_note(&mut self) {
        let Some(draft) = self.state.new_note_overlay_mut().map(|draft| draft.clone()) else {
            return;
        };
        if draft.title.trim().is_empty() && draft.body.trim().is_empty() {
            self.state
                .set_status_message(Some("Type a title or a body first"));
            return;
        }
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        if let Some(note_id) = draft.editing {
            match dispatcher.edit_note(note_id, &draft.title, &draft.body, now_millis()) {
                Ok(()) => {
                    self.state.close_overlay();
                    self.refresh_with_status("Note updated");
                    self.state.select_note_by_id(note_id);
                }
                Err(err) => {
                    tracing::error!(?err, note_id, "failed to edit note");
                    self.state.set_status_message(Some("Failed to save note"));
                }
            }
            return;
        }
        match dispatcher.create_note(&draft.title, &draft.body) {
            Ok(note_id) => {
                self.state.close_overlay();
                self.refresh_with_status("Note created");
                self.state.select_note_by_id(note_id);
            }
            Err(err) => {
                tracing::error!(?err, "failed to create note");
                self.state.set_status_message(Some("Failed to create note"));
            }
        }
    }

    fn toggle_pin(&mut self, note_id: i64) {
        if self.state.view == ListView::Trash {
            self.state
                .set_status_message(Some("Restore the note before pinning it"));
            return;
        }
        let should_pin = self
            .state
            .selected_note()
            .map(|note| !note.pinned)
            .unwrap_or(true);
        self.apply_pin(note_id, should_pin);
    }

    fn apply_pin(&mut self, note_id: i64, pin: bool) {
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        if let Err(err) = dispatcher.toggle_pin(note_id, pin) {
            tracing::error!(?err, note_id, "failed to toggle pin");
            self.state
                .set_status_message(Some("Failed to update pin state"));
            return;
        }
        let message = if pin { "Note pinned" } else { "Note unpinned" };
        self.refresh_with_status(message);
        self.state.select_note_by_id(note_id);
    }

    fn trash_note(&mut self, note_id: i64) {
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        match dispatcher.move_to_trash(note_id, now_millis()) {
            Ok(()) => self.refresh_with_status("Note moved to trash"),
            Err(err) => {
                tracing::error!(?err, note_id, "failed to trash note");
                self.state.set_status_message(Some("Failed to trash note"));
            }
        }
    }

    fn restore_note(&mut self, note_id: i64) {
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        match dispatcher.restore(note_id) {
            Ok(()) => self.refresh_with_status("Note restored"),
            Err(err) => {
                tracing::error!(?err, note_id, "failed to restore note");
                self.state.set_status_message(Some("Failed to restore note"));
            }
        }
    }

    fn delete_permanently(&mut self, note_id: i64) {
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        match dispatcher.delete_permanently(note_id) {
            Ok(()) => self.refresh_with_status("Note deleted forever"),
            Err(err) => {
                tracing::error!(?err, note_id, "failed to delete note");
                self.state.set_status_message(Some("Failed to delete note"));
            }
        }
    }

    fn empty_trash(&mut self) {
        let dispatcher = actions::ActionDispatcher::new(&self.storage);
        match dispatcher.empty_trash() {
            Ok(count) => {
                tracing::info!(count, "emptied trash");
                self.refresh_with_status(format!(
                    "Deleted {count} note{} forever",
                    if count == 1 { "" } else { "s" }
                ));
            }
            Err(err) => {
                tracing::error!(?err, "failed to empty trash");
                self.state.set_status_message(Some("Failed to empty trash"));
            }
        }
    }

    fn handle_toggle_trash_view(&mut self) {
        let next = match self.state.view {
            ListView::Notes => ListView::Trash,
            ListView::Trash => ListView::Notes,
        };
        match self.state.set_view(next, &self.storage) {
            Ok(()) => {
                let message = match next {
                    ListView::Trash => "Trash view: j/k browse • u restore • d delete • X empty • T exit",
                    ListView::Notes => "Back to active notes",
                };
                self.state.set_status_message(Some(message));
            }
            Err(err) => {
                tracing::error!(?err, "failed to toggle trash view");
                self.state
                    .set_status_message(Some("Failed to toggle trash view"));
            }
        }
    }

    fn refresh_with_status<S: Into<String>>(&mut self, message: S) {
        match self.state.refresh(&self.storage) {
            Ok(()) => self.state.set_status_message(Some(message)),
            Err(err) => {
                tracing::error!(?err, "failed to refresh notes from storage");
                self.state
                    .set_status_message(Some("Could not refresh notes"));
            }
        }
    }
}

fn plain(key: &KeyEvent) -> bool {
    !key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
