use chrono::{DateTime, Utc};

use crate::models::{Note, NoteUpdate, title_or_untitled};

/// Builds the note that replaces `existing` when `update` is saved at `now`.
///
/// Title, content, pin flag and color come from the update. The image follows
/// `update.image`, so a payload that never mentioned it keeps the stored one.
/// The id and creation time always come from the stored note.
pub fn reconcile(existing: &Note, update: NoteUpdate, now: DateTime<Utc>) -> Note {
    let NoteUpdate {
        id: _,
        title,
        content,
        pinned,
        color,
        created_at: _,
        image,
    } = update;

    Note {
        id: existing.id.clone(),
        title: title_or_untitled(title),
        content,
        created_at: existing.created_at,
        updated_at: now,
        pinned,
        color,
        image: image.apply(existing.image.clone()),
    }
}

/// What `update` would look like as a note if nothing was stored under its id.
pub fn detached(update: NoteUpdate, now: DateTime<Utc>) -> Note {
    Note {
        id: update.id,
        title: title_or_untitled(update.title),
        content: update.content,
        created_at: update.created_at.unwrap_or(now),
        updated_at: now,
        pinned: update.pinned,
        color: update.color,
        image: update.image.apply(None),
    }
}
