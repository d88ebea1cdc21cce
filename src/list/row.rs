use crate::model::Note;
use crate::timefmt::TimeAgoTemplates;

/// Display fields derived from one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub note_id: i64,
    pub title: String,
    pub content: String,
    pub timestamp_label: String,
    pub pinned_visible: bool,
}

impl RowView {
    /// Pure projection: the same note, `now` and templates always give the same row.
    pub fn project(note: &Note, now: i64, templates: &TimeAgoTemplates) -> Self {
        Self {
            note_id: note.id,
            title: note.display_title().to_string(),
            content: note.content.clone(),
            timestamp_label: templates.format(note.timestamp, now),
            pinned_visible: note.pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageAttachments;

    const NOW: i64 = 1_700_000_000_000;

    fn note(title: &str, pinned: bool, age_ms: i64) -> Note {
        Note {
            id: 9,
            title: title.into(),
            content: "line one\nline two".into(),
            timestamp: NOW - age_ms,
            pinned,
            category_id: Some(3),
            deleted_at: None,
            images: ImageAttachments::default(),
            reminder_at: None,
        }
    }

    #[test]
    fn projects_placeholder_and_label() {
        let row = RowView::project(&note("", false, 120_000), NOW, &TimeAgoTemplates::english());
        assert_eq!(row.title, "Untitled");
        assert_eq!(row.content, "line one\nline two");
        assert_eq!(row.timestamp_label, "2m ago");
        assert!(!row.pinned_visible);
        assert_eq!(row.note_id, 9);
    }

    #[test]
    fn pinned_indicator_mirrors_flag_only() {
        let templates = TimeAgoTemplates::english();
        for pinned in [true, false] {
            for title in ["", "Plan"] {
                let row = RowView::project(&note(title, pinned, 0), NOW, &templates);
                assert_eq!(row.pinned_visible, pinned);
            }
        }
    }
}
