use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder shown wherever a note without a title is displayed.
pub const UNTITLED: &str = "Untitled";

pub const DEFAULT_PALETTE: [&str; 15] = [
    "#FF5722", "#E91E63", "#9C27B0", "#673AB7", "#3F51B5", "#2196F3", "#03A9F4", "#00BCD4",
    "#009688", "#4CAF50", "#8BC34A", "#CDDC39", "#FFEB3B", "#FFC107", "#FF9800",
];

/// A stored note. Instants are epoch milliseconds.
///
/// The deleted flag is derived from `deleted_at`, so a note is in the trash
/// exactly when it carries a deletion instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub timestamp: i64,
    pub pinned: bool,
    pub category_id: Option<i64>,
    pub deleted_at: Option<i64>,
    pub images: ImageAttachments,
    pub reminder_at: Option<i64>,
}

impl Note {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }
}

/// Caller-supplied fields for a note that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    /// Defaults to the insertion instant when absent.
    pub timestamp: Option<i64>,
    pub pinned: bool,
    pub category_id: Option<i64>,
    pub images: ImageAttachments,
    pub reminder_at: Option<i64>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn in_category(mut self, category_id: Option<i64>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Field changes applied to an existing note. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` files the note under no category.
    pub category_id: Option<Option<i64>>,
}

impl NoteEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.category_id.is_none()
    }
}

/// Ordered image paths attached to a note.
///
/// Persisted as a JSON array of strings; an empty list is stored as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageAttachments(Vec<String>);

impl ImageAttachments {
    pub fn new(paths: Vec<String>) -> Self {
        Self(paths)
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Appends `path` unless it is already attached. Returns whether it was added.
    pub fn attach(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if self.0.iter().any(|existing| existing == &path) {
            return false;
        }
        self.0.push(path);
        true
    }

    pub fn detach(&mut self, path: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != path);
        before != self.0.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.0.clone()).to_string()
    }

    /// Column encoding: `None` when nothing is attached.
    pub fn to_column(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.to_json())
        }
    }

    /// Lenient decode. Absent, empty or malformed input yields an empty list.
    pub fn from_json(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(items)) => Self(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(path) => Some(path),
                        _ => None,
                    })
                    .collect(),
            ),
            Ok(other) => {
                tracing::warn!(kind = ?other, "image attachment column is not a JSON array");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(%err, "discarding malformed image attachment JSON");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Hex colour, `#RRGGBB` or `#AARRGGBB`.
    pub color: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryColor {
    pub alpha: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("valid hex colour regex")
});

impl CategoryColor {
    pub const GRAY: CategoryColor = CategoryColor {
        alpha: 0xFF,
        red: 0x88,
        green: 0x88,
        blue: 0x88,
    };

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !HEX_COLOR.is_match(raw) {
            return None;
        }
        let value = u32::from_str_radix(&raw[1..], 16).ok()?;
        let (alpha, rgb) = if raw.len() == 7 {
            (0xFF, value)
        } else {
            ((value >> 24) as u8, value & 0x00FF_FFFF)
        };
        Some(Self {
            alpha,
            red: (rgb >> 16) as u8,
            green: (rgb >> 8) as u8,
            blue: rgb as u8,
        })
    }

    pub fn parse_or_gray(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::GRAY)
    }
}

impl fmt::Display for CategoryColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha == 0xFF {
            write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
        } else {
            write!(
                f,
                "#{:02X}{:02X}{:02X}{:02X}",
                self.alpha, self.red, self.green, self.blue
            )
        }
    }
}

/// Colour for the next category, cycling through `palette` by how many exist.
pub fn pick_palette_color(palette: &[String], existing: usize) -> String {
    if palette.is_empty() {
        return DEFAULT_PALETTE[existing % DEFAULT_PALETTE.len()].to_string();
    }
    palette[existing % palette.len()].clone()
}
