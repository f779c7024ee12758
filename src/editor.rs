use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::models::{ImageChange, NewNote, Note, NoteColor, NoteUpdate};
use crate::storage::KeyValueStorage;
use crate::store::NoteStore;

/// The note currently open for editing. An empty `id` means it was never saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub color: NoteColor,
    pub image: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    image_touched: bool,
}

impl Draft {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_note(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            pinned: note.pinned,
            color: note.color,
            image: note.image.clone(),
            created_at: Some(note.created_at),
            image_touched: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }

    /// Replaces or removes the attachment. Until this is called, saving leaves
    /// the stored image alone.
    pub fn set_image(&mut self, image: Option<String>) {
        self.image = image;
        self.image_touched = true;
    }

    /// Takes over the saved note's identity so later saves update it.
    pub fn adopt(&mut self, saved: &Note) {
        self.id = saved.id.clone();
        self.created_at = Some(saved.created_at);
        self.image = saved.image.clone();
        self.image_touched = false;
    }

    fn image_change(&self) -> ImageChange {
        if self.image_touched {
            ImageChange::from(self.image.clone())
        } else {
            ImageChange::Keep
        }
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.title.hash(&mut hasher);
        self.content.hash(&mut hasher);
        self.pinned.hash(&mut hasher);
        self.color.hash(&mut hasher);
        self.image.hash(&mut hasher);
        hasher.finish()
    }
}

/// Saves a draft with trimmed title and content.
///
/// A draft whose title and content are both blank is not saved. A new draft
/// is created, anything else is an update of the note with the draft's id.
pub fn save_draft<S, C>(store: &mut NoteStore<S, C>, draft: &Draft) -> Option<Note>
where
    S: KeyValueStorage,
    C: Clock,
{
    let title = draft.title.trim();
    let content = draft.content.trim();
    if title.is_empty() && content.is_empty() {
        return None;
    }

    let saved = if draft.is_new() {
        store.create(NewNote {
            title: title.to_string(),
            content: content.to_string(),
            pinned: Some(draft.pinned),
            color: Some(draft.color),
            image: draft.image.clone(),
        })
    } else {
        store.update(NoteUpdate {
            id: draft.id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            pinned: draft.pinned,
            color: draft.color,
            created_at: draft.created_at,
            image: draft.image_change(),
        })
    };
    Some(saved)
}

/// Coalesces rapid edits into one save once the editor has been quiet for a while.
#[derive(Debug, Clone)]
pub struct AutoSave {
    quiet: Duration,
    last_edit: Option<Instant>,
    last_saved_hash: Option<u64>,
}

impl AutoSave {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_edit: None,
            last_saved_hash: None,
        }
    }

    /// Starts tracking `draft` as already saved, e.g. right after opening a note.
    pub fn tracking(quiet: Duration, draft: &Draft) -> Self {
        Self {
            quiet,
            last_edit: None,
            last_saved_hash: Some(draft.content_hash()),
        }
    }

    pub fn touch(&mut self, at: Instant) {
        self.last_edit = Some(at);
    }

    pub fn is_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    pub fn due(&self, draft: &Draft, at: Instant) -> bool {
        let Some(edited) = self.last_edit else {
            return false;
        };
        at.saturating_duration_since(edited) >= self.quiet
            && self.last_saved_hash != Some(draft.content_hash())
    }

    pub fn mark_saved(&mut self, draft: &Draft) {
        self.last_saved_hash = Some(draft.content_hash());
        self.last_edit = None;
    }

    /// Saves the draft if it is due and adopts the saved note into it.
    pub fn poll<S, C>(
        &mut self,
        store: &mut NoteStore<S, C>,
        draft: &mut Draft,
        at: Instant,
    ) -> Option<Note>
    where
        S: KeyValueStorage,
        C: Clock,
    {
        let edited = self.last_edit?;
        if at.saturating_duration_since(edited) < self.quiet {
            return None;
        }
        if !self.due(draft, at) {
            // Edited back to the saved state.
            self.last_edit = None;
            return None;
        }

        let saved = save_draft(store, draft);
        if let Some(note) = &saved {
            draft.adopt(note);
        }
        self.mark_saved(draft);
        saved
    }

    /// Saves immediately if anything changed since the last save, e.g. when the editor closes.
    pub fn flush<S, C>(&mut self, store: &mut NoteStore<S, C>, draft: &mut Draft) -> Option<Note>
    where
        S: KeyValueStorage,
        C: Clock,
    {
        if self.last_saved_hash == Some(draft.content_hash()) {
            self.last_edit = None;
            return None;
        }
        let saved = save_draft(store, draft);
        if let Some(note) = &saved {
            draft.adopt(note);
        }
        self.mark_saved(draft);
        saved
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use crate::store::DEFAULT_STORAGE_KEY;

    const QUIET: Duration = Duration::from_millis(600);
    const IMAGE: &str = "data:image/png;base64,AAA";

    fn store() -> NoteStore<MemoryStorage, ManualClock> {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        NoteStore::with_clock(
            MemoryStorage::new(),
            DEFAULT_STORAGE_KEY,
            ManualClock::ticking(start, ChronoDuration::seconds(1)),
        )
    }

    fn count_commits(store: &mut NoteStore<MemoryStorage, ManualClock>) -> Rc<RefCell<usize>> {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        // The first call is the subscription itself.
        store.subscribe(move |_| *sink.borrow_mut() += 1);
        *count.borrow_mut() = 0;
        count
    }

    #[test]
    fn blank_drafts_are_not_saved() {
        let mut store = store();
        let draft = Draft {
            title: "  ".into(),
            content: "\n".into(),
            ..Draft::empty()
        };
        assert_eq!(save_draft(&mut store, &draft), None);
        assert!(store.is_empty());
    }

    #[test]
    fn new_draft_is_created_with_trimmed_fields() {
        let mut store = store();
        let draft = Draft {
            title: "   ".into(),
            content: "  body  ".into(),
            color: NoteColor::Green,
            pinned: true,
            ..Draft::empty()
        };

        let saved = save_draft(&mut store, &draft).unwrap();
        assert_eq!(saved.title, "Untitled");
        assert_eq!(saved.content, "body");
        assert_eq!(saved.color, NoteColor::Green);
        assert!(saved.pinned);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn saving_an_opened_note_keeps_its_image_unless_changed() {
        let mut store = store();
        let note = store.create(NewNote::new("Photo", "caption").image(IMAGE));

        let mut draft = Draft::from_note(&note);
        draft.image = None; // not via set_image, so not a removal
        draft.content = "new caption".into();
        let saved = save_draft(&mut store, &draft).unwrap();
        assert_eq!(saved.image.as_deref(), Some(IMAGE));

        draft.set_image(None);
        let saved = save_draft(&mut store, &draft).unwrap();
        assert_eq!(saved.image, None);
        assert_eq!(store.get(&note.id).unwrap().image, None);
    }

    #[test]
    fn rapid_edits_collapse_into_one_save() {
        let mut store = store();
        let commits = count_commits(&mut store);
        let mut draft = Draft::empty();
        let mut autosave = AutoSave::new(QUIET);
        let t0 = Instant::now();

        for (i, text) in ["h", "he", "hel", "hello"].into_iter().enumerate() {
            draft.content = text.into();
            let at = t0 + Duration::from_millis(100 * i as u64);
            autosave.touch(at);
            assert_eq!(autosave.poll(&mut store, &mut draft, at), None);
        }

        let later = t0 + Duration::from_millis(300) + QUIET;
        let saved = autosave.poll(&mut store, &mut draft, later).unwrap();
        assert_eq!(saved.content, "hello");
        assert_eq!(*commits.borrow(), 1);
        assert_eq!(draft.id, saved.id);
        assert!(!autosave.is_pending());

        // Further edits update the same note instead of creating another.
        draft.content = "hello world".into();
        autosave.touch(later);
        autosave.poll(&mut store, &mut draft, later + QUIET).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.notes()[0].content, "hello world");
        assert_eq!(*commits.borrow(), 2);
    }

    #[test]
    fn reverting_to_the_saved_text_skips_the_write() {
        let mut store = store();
        let note = store.create(NewNote::new("Title", "same"));
        let commits = count_commits(&mut store);

        let mut draft = Draft::from_note(&note);
        let mut autosave = AutoSave::tracking(QUIET, &draft);
        let t0 = Instant::now();

        draft.content = "changed".into();
        autosave.touch(t0);
        draft.content = "same".into();
        autosave.touch(t0 + Duration::from_millis(50));

        assert_eq!(autosave.poll(&mut store, &mut draft, t0 + QUIET * 2), None);
        assert!(!autosave.is_pending());
        assert_eq!(*commits.borrow(), 0);
    }

    #[test]
    fn flush_saves_pending_changes_immediately() {
        let mut store = store();
        let mut draft = Draft {
            title: "Quick".into(),
            ..Draft::empty()
        };
        let mut autosave = AutoSave::new(QUIET);
        autosave.touch(Instant::now());

        let saved = autosave.flush(&mut store, &mut draft).unwrap();
        assert_eq!(saved.title, "Quick");
        assert_eq!(autosave.flush(&mut store, &mut draft), None);
        assert_eq!(store.len(), 1);
    }
}
