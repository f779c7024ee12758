use crate::models::Note;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    /// The store's own order: pinned first, newest first.
    #[default]
    Newest,
    /// The store's order reversed.
    Oldest,
}

/// Search and display settings a UI applies on top of the store's list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteQuery {
    pub term: String,
    pub mode: SortMode,
}

impl NoteQuery {
    pub fn new(term: impl Into<String>, mode: SortMode) -> Self {
        Self {
            term: term.into(),
            mode,
        }
    }

    pub fn apply<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        let mut result = filter_notes(notes, &self.term);
        if self.mode == SortMode::Oldest {
            result.reverse();
        }
        result
    }
}

/// Case-insensitive substring match on title or content. A blank term matches everything.
pub fn filter_notes<'a>(notes: &'a [Note], term: &str) -> Vec<&'a Note> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return notes.iter().collect();
    }

    notes
        .iter()
        .filter(|note| {
            note.title.to_lowercase().contains(&needle)
                || note.content.to_lowercase().contains(&needle)
        })
        .collect()
}
