use std::cmp::Ordering;

use crate::models::Note;

/// Pinned notes first, then most recently updated first.
pub fn display_order(a: &Note, b: &Note) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// Stable, so notes that compare equal keep their current relative order.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(display_order);
}

pub fn is_sorted(notes: &[Note]) -> bool {
    notes
        .windows(2)
        .all(|pair| display_order(&pair[0], &pair[1]) != Ordering::Greater)
}
