use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, DraftField, FocusPane, ListView, OverlayState, TrashStatus};
use crate::config::ThemePalette;
use crate::model::{Category, CategoryColor};
use crate::timefmt::{format_absolute, now_millis};

/// Terminal lines per list row: title, meta, snippet.
pub const ROW_HEIGHT: u16 = 3;
const HIGHLIGHT_SYMBOL: &str = "▸ ";
const OPTIONS_WIDTH: u16 = 32;
const OPTIONS_HEIGHT: u16 = 5;

/// Draws the whole screen and returns the inner area of the note list.
pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    list_state: &mut ListState,
    palette: &ThemePalette,
) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(vertical[0]);

    let now = now_millis();
    let list_block = Block::default()
        .title(state.view.to_string())
        .borders(Borders::ALL)
        .border_style(focus_style(state.focus == FocusPane::List, palette));
    let list_inner = list_block.inner(columns[0]);
    let text_width = usize::from(list_inner.width)
        .saturating_sub(HIGHLIGHT_SYMBOL.width());

    let mut items = Vec::with_capacity(state.rows.len());
    for (row, note) in state.rows.iter().zip(state.list.notes()) {
        let mut title_spans = Vec::new();
        if row.pinned_visible {
            title_spans.push(Span::styled(
                "★ ",
                Style::default()
                    .fg(palette.pinned)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        title_spans.push(Span::styled(
            truncate_to_width(&row.title, text_width.saturating_sub(2)),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        if let Some(category) = state.category_of(note) {
            title_spans.push(Span::raw(" "));
            title_spans.push(Span::styled("●", Style::default().fg(category_color(category))));
        }

        let meta_line = match state.trash_status(note, now) {
            Some(status) => {
                let deleted = note
                    .deleted_at
                    .map(|at| state.list.templates().format(at, now))
                    .unwrap_or_default();
                Line::from(vec![
                    Span::styled(
                        format!("Deleted {deleted}"),
                        Style::default().fg(palette.muted),
                    ),
                    Span::raw(" • "),
                    Span::styled(status.label.clone(), trash_status_style(&status, palette)),
                ])
            }
            None => Line::from(Span::styled(
                row.timestamp_label.clone(),
                Style::default().fg(palette.muted),
            )),
        };
        let snippet = row
            .content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");
        items.push(ListItem::new(vec![
            Line::from(title_spans),
            meta_line,
            Line::from(truncate_to_width(snippet, text_width)),
        ]));
    }
    if items.is_empty() {
        let empty = match state.view {
            ListView::Trash => "Trash is empty.",
            ListView::Notes if !state.search.query.is_empty() => "No matches.",
            ListView::Notes => "No notes yet. Press `a` to create one.",
        };
        items.push(ListItem::new(empty));
    }

    let list = List::new(items)
        .block(list_block)
        .highlight_style(
            Style::default()
                .bg(palette.selection_bg)
                .fg(palette.selection_fg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(HIGHLIGHT_SYMBOL);
    frame.render_stateful_widget(list, columns[0], list_state);

    let detail = Paragraph::new(detail_text(state, palette, now))
        .block(
            Block::default()
                .title("Note")
                .borders(Borders::ALL)
                .border_style(focus_style(state.focus == FocusPane::Detail, palette)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, columns[1]);
    frame.render_widget(detail, columns[1]);

    let status = Paragraph::new(build_status_line(state, palette))
        .style(Style::default().fg(palette.muted));
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state, palette);
    list_inner
}

fn detail_text(state: &AppState, palette: &ThemePalette, now: i64) -> Text<'static> {
    let Some(note) = state.opened_note() else {
        return Text::from("Press Enter to open the selected note.");
    };
    let mut lines = Vec::new();
    let mut header = Vec::new();
    if note.pinned {
        header.push(Span::styled(
            "★ ",
            Style::default()
                .fg(palette.pinned)
                .add_modifier(Modifier::BOLD),
        ));
    }
    header.push(Span::styled(
        note.display_title().to_string(),
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
    ));
    if let Some(category) = state.category_of(note) {
        header.push(Span::raw("  "));
        header.push(Span::styled(
            category.name.clone(),
            Style::default().fg(category_color(category)),
        ));
    }
    lines.push(Line::from(header));
    lines.push(Line::from(Span::styled(
        format!(
            "Created {} ({})",
            format_absolute(note.timestamp),
            state.list.templates().format(note.timestamp, now)
        ),
        Style::default().fg(palette.muted),
    )));
    if let Some(reminder_at) = note.reminder_at {
        lines.push(Line::from(Span::styled(
            format!("Reminder {}", format_absolute(reminder_at)),
            Style::default().fg(palette.muted),
        )));
    }
    if let Some(status) = state.trash_status(note, now) {
        lines.push(Line::from(Span::styled(
            format!("In trash • {}", status.label),
            trash_status_style(&status, palette),
        )));
    }
    for path in note.images.paths() {
        lines.push(Line::from(Span::styled(
            format!("Image {path}"),
            Style::default().fg(palette.muted),
        )));
    }
    lines.push(Line::from(""));
    lines.extend(note.content.lines().map(|line| Line::from(line.to_string())));
    Text::from(lines)
}

fn build_status_line(state: &AppState, palette: &ThemePalette) -> Text<'static> {
    let total = state.len();
    let position = match state.selected_position() {
        Some(index) => format!("{}/{}", index + 1, total),
        None => "0/0".to_string(),
    };
    let mut spans = vec![
        Span::raw(format!("{} ", state.view)),
        Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
    ];
    if state.is_search_active() || !state.search.query.is_empty() {
        spans.push(Span::raw(" | Search /"));
        spans.push(Span::styled(
            state.search.query.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        if state.is_search_active() {
            spans.push(Span::styled(" ▌", Style::default().fg(palette.accent)));
        }
    }
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(message.clone(), Style::default().fg(palette.accent)));
    }
    let hints = Line::from(Span::styled(
        "j/k move • Enter open • m options • a new • e edit • p pin • d trash • T trash • / search • q quit",
        Style::default().fg(Color::DarkGray),
    ));
    Text::from(vec![Line::from(spans), hints])
}

fn render_overlay(frame: &mut Frame, state: &AppState, palette: &ThemePalette) {
    match state.overlay() {
        Some(OverlayState::NewNote(draft)) => {
            let area = centered_rect(60, 40, frame.size());
            frame.render_widget(Clear, area);
            let field_style = |field: DraftField| {
                if draft.field == field {
                    Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(palette.muted)
                }
            };
            let cursor = |field: DraftField| if draft.field == field { "▌" } else { "" };
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled("Title", field_style(DraftField::Title))),
                Line::from(format!("{}{}", draft.title, cursor(DraftField::Title))),
                Line::from(""),
                Line::from(Span::styled("Body", field_style(DraftField::Body))),
                Line::from(format!("{}{}", draft.body, cursor(DraftField::Body))),
                Line::from(""),
                Line::from(Span::styled(
                    "Tab switch field • Enter save • Esc cancel",
                    Style::default().fg(palette.muted),
                )),
            ])
            .block(
                Block::default()
                    .title(if draft.editing.is_some() { "Edit Note" } else { "New Note" })
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Options(options)) => {
            let area = anchored_popup(options.anchor, frame.size(), OPTIONS_WIDTH, OPTIONS_HEIGHT);
            frame.render_widget(Clear, area);
            let (first, second) = if options.trashed {
                ("p  Restore", "d  Delete forever")
            } else if options.pinned {
                ("p  Unpin", "d  Move to trash")
            } else {
                ("p  Pin", "d  Move to trash")
            };
            let paragraph = Paragraph::new(vec![
                Line::from(first),
                Line::from(Span::styled(second, Style::default().fg(palette.danger))),
                Line::from(Span::styled("Esc close", Style::default().fg(palette.muted))),
            ])
            .block(
                Block::default()
                    .title(truncate_to_width(
                        &options.title,
                        usize::from(OPTIONS_WIDTH.saturating_sub(4)),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            );
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::EmptyTrash { count }) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(format!(
                    "Delete {count} note{} forever?",
                    if *count == 1 { "" } else { "s" }
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to confirm • Esc to cancel",
                    Style::default().fg(palette.muted),
                )),
            ])
            .block(
                Block::default()
                    .title("Empty Trash")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.danger)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        None => {}
    }
}

/// Screen area of row `index` inside the list's inner area, when visible.
pub fn row_anchor(list_inner: Rect, offset: usize, index: usize) -> Option<Rect> {
    let visible = index.checked_sub(offset)?;
    let top = u16::try_from(visible)
        .ok()?
        .checked_mul(ROW_HEIGHT)?
        .checked_add(list_inner.y)?;
    if top.checked_add(ROW_HEIGHT)? > list_inner.bottom() {
        return None;
    }
    Some(Rect::new(list_inner.x, top, list_inner.width, ROW_HEIGHT))
}

/// Places a popup just below `anchor`, or above it when there is no room,
/// kept inside `bounds`.
pub fn anchored_popup(anchor: Rect, bounds: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(bounds.width);
    let height = height.min(bounds.height);
    let max_x = bounds.right().saturating_sub(width);
    let x = anchor.x.clamp(bounds.x, max_x.max(bounds.x));
    let y = if anchor.bottom().saturating_add(height) <= bounds.bottom() {
        anchor.bottom()
    } else if anchor.y >= bounds.y.saturating_add(height) {
        anchor.y - height
    } else {
        bounds.y + (bounds.height - height) / 2
    };
    Rect::new(x, y, width, height)
}

/// Cuts `text` to at most `max_width` terminal columns, ending with `…` when cut.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let width = grapheme.width();
        if used + width + 1 > max_width {
            break;
        }
        out.push_str(grapheme);
        used += width;
    }
    out.push('…');
    out
}

fn category_color(category: &Category) -> Color {
    let color = CategoryColor::parse_or_gray(&category.color);
    Color::Rgb(color.red, color.green, color.blue)
}

fn focus_style(focused: bool, palette: &ThemePalette) -> Style {
    if focused {
        Style::default().fg(palette.accent)
    } else {
        Style::default()
    }
}

fn trash_status_style(status: &TrashStatus, palette: &ThemePalette) -> Style {
    if status.expired {
        Style::default()
            .fg(palette.danger)
            .add_modifier(Modifier::BOLD | Modifier::ITALIC)
    } else if status.indefinite {
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::ITALIC)
    } else {
        Style::default()
            .fg(palette.pinned)
            .add_modifier(Modifier::ITALIC)
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::model::{ImageAttachments, Note};
    use crate::timefmt::TimeAgoTemplates;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn note(id: i64, title: &str, pinned: bool) -> Note {
        Note {
            id,
            title: title.into(),
            content: "first line\nsecond".into(),
            timestamp: now_millis() - 5 * 60_000,
            pinned,
            category_id: None,
            deleted_at: None,
            images: ImageAttachments::default(),
            reminder_at: None,
        }
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn truncation_respects_wide_graphemes() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefgh", 5), "abcd…");
        assert_eq!(truncate_to_width("日本語テキスト", 5), "日本…");
        assert_eq!(truncate_to_width("anything", 0), "");
    }

    #[test]
    fn category_colour_falls_back_to_gray() {
        let category = |color: &str| Category {
            id: 1,
            name: "Work".into(),
            color: color.into(),
            created_at: 0,
        };
        assert_eq!(category_color(&category("#2196F3")), Color::Rgb(0x21, 0x96, 0xF3));
        let gray = CategoryColor::GRAY;
        assert_eq!(
            category_color(&category("teal")),
            Color::Rgb(gray.red, gray.green, gray.blue)
        );
    }

    #[test]
    fn row_anchor_follows_scroll_offset() {
        let inner = Rect::new(1, 1, 30, 9);
        assert_eq!(row_anchor(inner, 0, 0), Some(Rect::new(1, 1, 30, 3)));
        assert_eq!(row_anchor(inner, 0, 2), Some(Rect::new(1, 7, 30, 3)));
        assert_eq!(row_anchor(inner, 0, 3), None);
        assert_eq!(row_anchor(inner, 2, 3), Some(Rect::new(1, 4, 30, 3)));
        assert_eq!(row_anchor(inner, 2, 1), None);
    }

    #[test]
    fn popup_prefers_below_then_above() {
        let bounds = Rect::new(0, 0, 80, 24);
        let below = anchored_popup(Rect::new(2, 4, 30, 3), bounds, 32, 5);
        assert_eq!(below, Rect::new(2, 7, 32, 5));
        let above = anchored_popup(Rect::new(60, 19, 30, 3), bounds, 32, 5);
        assert_eq!(above, Rect::new(48, 14, 32, 5));
    }

    #[test]
    fn draws_cached_rows_with_pin_marker() {
        let mut state = AppState::new(TimeAgoTemplates::english(), 30);
        state
            .list
            .replace(Some(vec![note(1, "Pinned idea", true), note(2, "", false)]));
        state.sync_rows(now_millis());
        let mut list_state = ListState::default();
        list_state.select(state.selected_position());

        let mut terminal = Terminal::new(TestBackend::new(80, 16)).expect("test terminal");
        let mut inner = Rect::default();
        terminal
            .draw(|frame| {
                inner = draw_app(frame, &state, &mut list_state, &ThemeName::Dark.palette());
            })
            .expect("draw");

        let screen = screen_text(&terminal);
        assert!(screen.contains("★ Pinned idea"));
        assert!(screen.contains("Untitled"));
        assert!(screen.contains("5m ago"));
        assert!(screen.contains("Press Enter to open"));
        assert_eq!(inner, Rect::new(1, 1, 30, 12));
    }
}
