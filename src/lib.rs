pub mod app;
pub mod backup;
pub mod cli;
pub mod config;
pub mod list;
pub mod model;
pub mod storage;
pub mod timefmt;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use list::{Dispatch, ListError, NoteInteraction, NoteList, RowView};
pub use model::{Category, Note, NoteDraft};
pub use timefmt::{time_ago, TimeAgoTemplates};
