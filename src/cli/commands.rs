use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Subcommand};
use indexmap::IndexMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::backup::{self, BackupNote};
use crate::config::{AppConfig, ConfigPaths};
use crate::list::NoteList;
use crate::model::{pick_palette_color, Category, Note, NoteDraft, NoteEdit};
use crate::storage::StorageHandle;
use crate::timefmt::{datetime_to_millis, format_absolute, millis_to_datetime, now_millis};

const SNIPPET_CHARS: usize = 80;
const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Show the trash instead of active notes
    #[arg(long, conflicts_with = "category")]
    pub trash: bool,
    /// Only notes filed under this category id
    #[arg(long)]
    pub category: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note (may be left empty)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note body inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
    /// Pin the new note
    #[arg(long)]
    pub pin: bool,
    /// File the note under this category id
    #[arg(long)]
    pub category: Option<i64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    pub note_id: i64,
    /// Replace the title
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the body. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
    /// Move the note to this category id
    #[arg(long, conflicts_with = "no_category")]
    pub category: Option<i64>,
    /// Remove the note from its category
    #[arg(long)]
    pub no_category: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    pub note_id: i64,
    /// Print the note as a backup JSON entry
    #[arg(long, conflicts_with = "text")]
    pub json: bool,
    /// Print the note as shareable plain text
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Text matched against titles and bodies, case-insensitively
    #[arg(required = true)]
    pub query: Vec<String>,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct NoteIdArgs {
    pub note_id: i64,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PurgeArgs {
    /// Empty the whole trash instead of only expired notes
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("when").required(true).args(["in_minutes", "at", "clear"])))]
pub struct RemindArgs {
    pub note_id: i64,
    /// Remind after this many minutes
    #[arg(long = "in", value_name = "MINUTES")]
    pub in_minutes: Option<i64>,
    /// Remind at an RFC 3339 instant
    #[arg(long)]
    pub at: Option<String>,
    /// Remove the reminder
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    pub note_id: i64,
    /// Image file to attach
    pub path: PathBuf,
    /// Detach the path instead
    #[arg(long)]
    pub remove: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryArgs {
    #[command(subcommand)]
    pub command: CategoryCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// Create a category (colour picked from the palette when omitted)
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// List categories with their active note counts
    List,
    /// Rename a category
    Rename { category_id: i64, name: String },
    /// Change a category colour (#RRGGBB or #AARRGGBB)
    Color { category_id: i64, color: String },
    /// Delete a category; its notes are kept without a category
    Delete { category_id: i64 },
    /// File a note under a category, or clear it when no category is given
    Assign {
        note_id: i64,
        category_id: Option<i64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BackupCommand {
    /// Write every note, trash included, to a JSON backup
    Export { path: Option<PathBuf> },
    /// Add the notes from a JSON backup under fresh ids
    Import { path: PathBuf },
    /// Write active notes as plain text
    Text { path: Option<PathBuf> },
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_notes(config: &AppConfig, storage: &StorageHandle, args: &ListArgs) -> Result<String> {
    let notes = if args.trash {
        storage.fetch_trashed_notes()?
    } else if let Some(category_id) = args.category {
        if storage.fetch_category(category_id)?.is_none() {
            bail!("category {category_id} not found");
        }
        storage.fetch_notes_in_category(category_id)?
    } else {
        storage.fetch_notes()?
    };
    if notes.is_empty() {
        let empty = if args.trash { "Trash is empty.\n" } else { "No notes.\n" };
        return Ok(empty.to_string());
    }
    let categories = storage.category_index()?;
    let mut list: NoteList = NoteList::new(config.time_ago.clone());
    list.replace(Some(notes));
    format_note_rows(&list, &categories, now_millis())
}

pub fn new_note(storage: &StorageHandle, args: NewArgs) -> Result<String> {
    let title = args.title.unwrap_or_default().trim().to_owned();
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    if title.is_empty() && body.trim().is_empty() {
        bail!("a note needs a title or a body");
    }
    let draft = NoteDraft::new(title, body)
        .pinned(args.pin)
        .in_category(args.category);
    let note_id = storage.insert_note(&draft).context("creating note")?;
    tracing::info!(note_id, pinned = args.pin, "created note");
    Ok(format!(
        "Created note #{note_id}{}\n",
        if args.pin { " (pinned)" } else { "" }
    ))
}

pub fn edit_note(storage: &StorageHandle, args: EditArgs, now: i64) -> Result<String> {
    let content = match args.body {
        Some(body) => Some(body),
        None => read_stdin()?.filter(|body| !body.is_empty()),
    };
    let category_id = if args.no_category {
        Some(None)
    } else {
        args.category.map(Some)
    };
    let edit = NoteEdit {
        title: args.title,
        content,
        category_id,
    };
    if edit.is_empty() {
        bail!("nothing to change: pass --title, --body, --category or --no-category");
    }
    let note = storage.edit_note(args.note_id, &edit, now)?;
    tracing::info!(note_id = note.id, "edited note");
    Ok(format!("Updated note #{}  {}\n", note.id, note.display_title()))
}

pub fn show_note(config: &AppConfig, storage: &StorageHandle, args: &ShowArgs) -> Result<String> {
    let note = require_note(storage, args.note_id)?;
    if args.json {
        let mut json = serde_json::to_string_pretty(&BackupNote::from(&note))
            .context("serializing note")?;
        json.push('\n');
        return Ok(json);
    }
    if args.text {
        return Ok(backup::render_note_text(&note));
    }
    let now = now_millis();
    let templates = &config.time_ago;
    let mut out = String::new();
    let _ = writeln!(out, "#{}  {}", note.id, note.display_title());
    let _ = writeln!(out, "{}", "-".repeat(30));
    let _ = writeln!(out, "{}", note.content);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Created:  {} ({})",
        format_absolute(note.timestamp),
        templates.format(note.timestamp, now)
    );
    if note.pinned {
        let _ = writeln!(out, "Pinned:   yes");
    }
    if let Some(category_id) = note.category_id {
        let name = storage
            .fetch_category(category_id)?
            .map(|category| category.name)
            .unwrap_or_else(|| format!("#{category_id}"));
        let _ = writeln!(out, "Category: {name}");
    }
    if let Some(reminder_at) = note.reminder_at {
        let _ = writeln!(out, "Reminder: {}", format_absolute(reminder_at));
    }
    if let Some(deleted_at) = note.deleted_at {
        let _ = writeln!(
            out,
            "Trashed:  {} ({})",
            format_absolute(deleted_at),
            templates.format(deleted_at, now)
        );
    }
    for path in note.images.paths() {
        let _ = writeln!(out, "Image:    {path}");
    }
    Ok(out)
}

pub fn search_notes(config: &AppConfig, storage: &StorageHandle, args: &SearchArgs) -> Result<String> {
    let raw_query = args.query.join(" ");
    let trimmed = raw_query.trim();
    if trimmed.is_empty() {
        bail!("search query cannot be empty");
    }
    let results = storage.search_notes(trimmed).context("executing search")?;
    if results.is_empty() {
        return Ok("No matches found.\n".to_string());
    }
    let categories = storage.category_index()?;
    let mut list: NoteList = NoteList::new(config.time_ago.clone());
    list.replace(Some(results));
    format_note_rows(&list, &categories, now_millis())
}

pub fn set_pinned(storage: &StorageHandle, args: NoteIdArgs, pinned: bool) -> Result<String> {
    storage
        .set_pinned(args.note_id, pinned)
        .with_context(|| format!("updating note #{}", args.note_id))?;
    let verb = if pinned { "Pinned" } else { "Unpinned" };
    Ok(format!("{verb} note #{}\n", args.note_id))
}

pub fn trash_note(storage: &StorageHandle, args: NoteIdArgs) -> Result<String> {
    storage
        .move_to_trash(args.note_id, now_millis())
        .with_context(|| format!("moving note #{} to trash", args.note_id))?;
    tracing::info!(note_id = args.note_id, "moved note to trash");
    Ok(format!("Moved note #{} to trash\n", args.note_id))
}

pub fn restore_note(storage: &StorageHandle, args: NoteIdArgs) -> Result<String> {
    storage
        .restore_from_trash(args.note_id)
        .with_context(|| format!("restoring note #{}", args.note_id))?;
    Ok(format!("Restored note #{}\n", args.note_id))
}

pub fn purge_trash(config: &AppConfig, storage: &StorageHandle, args: PurgeArgs) -> Result<String> {
    let purged = if args.all {
        storage.empty_trash()?
    } else {
        storage.purge_expired_trash(&config.trash, now_millis())?
    };
    tracing::info!(purged, all = args.all, "purged trash");
    Ok(format!("Purged {purged} note{} from trash\n", plural(purged)))
}

pub fn remind(storage: &StorageHandle, args: &RemindArgs, now: i64) -> Result<String> {
    let reminder_at = if args.clear {
        None
    } else if let Some(minutes) = args.in_minutes {
        if minutes <= 0 {
            bail!("reminder delay must be at least one minute");
        }
        let at = minutes
            .checked_mul(MILLIS_PER_MINUTE)
            .and_then(|delay| now.checked_add(delay))
            .filter(|at| millis_to_datetime(*at).is_some());
        match at {
            Some(at) => Some(at),
            None => bail!("reminder delay of {minutes} minutes is out of range"),
        }
    } else if let Some(raw) = args.at.as_deref() {
        let at = OffsetDateTime::parse(raw, &Rfc3339)
            .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))?;
        Some(datetime_to_millis(at))
    } else {
        bail!("one of --in, --at or --clear is required");
    };
    storage
        .set_reminder(args.note_id, reminder_at)
        .with_context(|| format!("updating reminder for note #{}", args.note_id))?;
    Ok(match reminder_at {
        Some(at) => format!(
            "Reminder for note #{} set to {}\n",
            args.note_id,
            format_absolute(at)
        ),
        None => format!("Cleared reminder for note #{}\n", args.note_id),
    })
}

pub fn list_reminders(storage: &StorageHandle, now: i64) -> Result<String> {
    let notes = storage.fetch_reminders()?;
    if notes.is_empty() {
        return Ok("No reminders.\n".to_string());
    }
    let mut out = String::new();
    for note in notes {
        let Some(at) = note.reminder_at else { continue };
        let overdue = if at <= now { "  [OVERDUE]" } else { "" };
        let _ = writeln!(
            out,
            "#{}  {}  {}{overdue}",
            note.id,
            note.display_title(),
            format_absolute(at)
        );
    }
    Ok(out)
}

pub fn attach_image(storage: &StorageHandle, args: &AttachArgs) -> Result<String> {
    let mut note = require_note(storage, args.note_id)?;
    if note.is_deleted() {
        bail!("note #{} is in the trash", note.id);
    }
    if args.remove {
        let raw = args.path.to_string_lossy();
        if !note.images.detach(&raw) {
            bail!("{raw} is not attached to note #{}", note.id);
        }
        storage.set_images(note.id, &note.images)?;
        return Ok(format!("Detached {raw} from note #{}\n", note.id));
    }
    let path = fs::canonicalize(&args.path)
        .with_context(|| format!("resolving image {}", args.path.display()))?;
    let path = path.to_string_lossy().into_owned();
    if !note.images.attach(path.clone()) {
        return Ok(format!("{path} is already attached to note #{}\n", note.id));
    }
    storage.set_images(note.id, &note.images)?;
    Ok(format!(
        "Attached {path} to note #{} ({} image{})\n",
        note.id,
        note.images.len(),
        plural(note.images.len())
    ))
}

pub fn handle_category_command(
    config: Arc<AppConfig>,
    storage: &StorageHandle,
    args: CategoryArgs,
) -> Result<String> {
    match args.command {
        CategoryCommand::Add { name, color } => category_add(&config, storage, &name, color),
        CategoryCommand::List => category_list(storage),
        CategoryCommand::Rename { category_id, name } => {
            storage.rename_category(category_id, &name)?;
            Ok(format!("Renamed category #{category_id} to '{}'\n", name.trim()))
        }
        CategoryCommand::Color { category_id, color } => {
            storage.set_category_color(category_id, &color)?;
            Ok(format!("Recoloured category #{category_id}\n"))
        }
        CategoryCommand::Delete { category_id } => {
            let outcome = storage.delete_category(category_id)?;
            Ok(format!(
                "Deleted category '{}' (detached {} note{})\n",
                outcome.name,
                outcome.detached,
                plural(outcome.detached)
            ))
        }
        CategoryCommand::Assign {
            note_id,
            category_id,
        } => {
            storage.set_note_category(note_id, category_id)?;
            Ok(match category_id {
                Some(category_id) => {
                    format!("Filed note #{note_id} under category #{category_id}\n")
                }
                None => format!("Cleared category of note #{note_id}\n"),
            })
        }
    }
}

fn category_add(
    config: &AppConfig,
    storage: &StorageHandle,
    name: &str,
    color: Option<String>,
) -> Result<String> {
    let color = match color {
        Some(color) => color,
        None => pick_palette_color(&config.categories.palette, storage.category_count()?),
    };
    let category_id = storage.insert_category(name, &color)?;
    Ok(format!(
        "Created category #{category_id} '{}' ({color})\n",
        name.trim()
    ))
}

fn category_list(storage: &StorageHandle) -> Result<String> {
    let categories = storage.category_index()?;
    if categories.is_empty() {
        return Ok("No categories.\n".to_string());
    }
    let mut out = String::new();
    for (id, category) in &categories {
        let count = storage.notes_in_category(*id)?;
        let _ = writeln!(
            out,
            "#{id}  {}  {}  ({count} note{})",
            category.name,
            category.color,
            plural(count)
        );
    }
    Ok(out)
}

pub fn handle_backup_command(
    storage: &StorageHandle,
    paths: &ConfigPaths,
    args: BackupArgs,
) -> Result<String> {
    let now = now_millis();
    match args.command {
        BackupCommand::Export { path } => {
            let path = path.unwrap_or_else(|| backup::default_json_path(&paths.backup_dir, now));
            let count = backup::export_json(storage, &path)?;
            Ok(format!(
                "Exported {count} note{} to {}\n",
                plural(count),
                path.display()
            ))
        }
        BackupCommand::Import { path } => {
            let ids = backup::import_json(storage, &path)?;
            Ok(format!(
                "Imported {} note{} from {}\n",
                ids.len(),
                plural(ids.len()),
                path.display()
            ))
        }
        BackupCommand::Text { path } => {
            let path = path.unwrap_or_else(|| backup::default_text_path(&paths.backup_dir, now));
            let count = backup::export_text(storage, &path)?;
            Ok(format!(
                "Wrote {count} note{} to {}\n",
                plural(count),
                path.display()
            ))
        }
    }
}

fn format_note_rows(
    list: &NoteList,
    categories: &IndexMap<i64, Category>,
    now: i64,
) -> Result<String> {
    let mut out = String::new();
    for (index, note) in list.notes().iter().enumerate() {
        let row = list.bind_row_at(index, now)?;
        let mut headline = format!("#{}  {}", row.note_id, row.title);
        if row.pinned_visible {
            headline.push_str("  [PINNED]");
        }
        if let Some(category) = note.category_id.and_then(|id| categories.get(&id)) {
            let _ = write!(headline, "  [{}]", category.name);
        }
        let _ = writeln!(out, "{headline}");
        match note.deleted_at {
            Some(deleted_at) => {
                let _ = writeln!(out, "    trashed {}", list.templates().format(deleted_at, now));
            }
            None => {
                let _ = writeln!(out, "    {}", row.timestamp_label);
            }
        }
        if let Some(snippet) = build_snippet(&row.content) {
            let _ = writeln!(out, "    {snippet}");
        }
        out.push('\n');
    }
    Ok(out)
}

fn build_snippet(content: &str) -> Option<String> {
    let joined = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return None;
    }
    let mut snippet: String = joined.chars().take(SNIPPET_CHARS).collect();
    if joined.chars().count() > SNIPPET_CHARS {
        snippet.push('…');
    }
    Some(snippet)
}

fn require_note(storage: &StorageHandle, note_id: i64) -> Result<Note> {
    match storage.fetch_note(note_id)? {
        Some(note) => Ok(note),
        None => bail!("note #{note_id} not found"),
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
