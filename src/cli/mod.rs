use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;
use crate::timefmt::now_millis;

pub mod commands;

use self::commands::{
    AttachArgs, BackupArgs, CategoryArgs, EditArgs, ListArgs, NewArgs, NoteIdArgs, PurgeArgs,
    RemindArgs, SearchArgs, ShowArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "pocketnotes",
    version,
    about = "Pocket-sized notes with categories, pinning, trash and reminders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over POCKETNOTES_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over POCKETNOTES_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Print active notes, pinned first then newest
    List(ListArgs),
    /// Create a new note from the command line
    New(NewArgs),
    /// Change the title, body or category of a note
    Edit(EditArgs),
    /// Print one note
    Show(ShowArgs),
    /// Print notes whose title or body contains the query
    Search(SearchArgs),
    /// Pin a note to the top of the list
    Pin(NoteIdArgs),
    /// Unpin a note
    Unpin(NoteIdArgs),
    /// Move a note to the trash
    Trash(NoteIdArgs),
    /// Bring a note back from the trash
    Restore(NoteIdArgs),
    /// Permanently delete expired (or, with --all, every) trashed notes
    Purge(PurgeArgs),
    /// Set or clear a note reminder
    Remind(RemindArgs),
    /// List pending reminders, soonest first
    Reminders,
    /// Attach an image path to a note
    Attach(AttachArgs),
    /// Manage categories
    Category(CategoryArgs),
    /// Export or import notes
    Backup(BackupArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&config.storage)?;

    let config = Arc::new(config);
    let command = cli.command.unwrap_or(Commands::Tui);
    let output = match command {
        Commands::Tui => {
            let mut app = App::new(config.clone(), storage.clone())?;
            return commands::run_tui(&mut app);
        }
        Commands::List(args) => commands::list_notes(&config, &storage, &args)?,
        Commands::New(args) => commands::new_note(&storage, args)?,
        Commands::Edit(args) => commands::edit_note(&storage, args, now_millis())?,
        Commands::Show(args) => commands::show_note(&config, &storage, &args)?,
        Commands::Search(args) => commands::search_notes(&config, &storage, &args)?,
        Commands::Pin(args) => commands::set_pinned(&storage, args, true)?,
        Commands::Unpin(args) => commands::set_pinned(&storage, args, false)?,
        Commands::Trash(args) => commands::trash_note(&storage, args)?,
        Commands::Restore(args) => commands::restore_note(&storage, args)?,
        Commands::Purge(args) => commands::purge_trash(&config, &storage, args)?,
        Commands::Remind(args) => commands::remind(&storage, &args, now_millis())?,
        Commands::Reminders => commands::list_reminders(&storage, now_millis())?,
        Commands::Attach(args) => commands::attach_image(&storage, &args)?,
        Commands::Category(args) => {
            commands::handle_category_command(config.clone(), &storage, args)?
        }
        Commands::Backup(args) => commands::handle_backup_command(&storage, &paths, args)?,
    };
    print!("{output}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
