use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::models::{NewNote, Note, NoteUpdate, title_or_untitled};
use crate::ordering::sort_notes;
use crate::reconcile::{detached, reconcile};
use crate::storage::KeyValueStorage;

pub const DEFAULT_STORAGE_KEY: &str = "local-notes-app-notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Subscriber {
    Callback(Box<dyn FnMut(&[Note])>),
    Channel(SyncSender<Vec<Note>>),
}

impl Subscriber {
    /// Returns false once the subscriber can no longer receive lists.
    fn notify(&mut self, notes: &[Note]) -> bool {
        match self {
            Subscriber::Callback(callback) => {
                callback(notes);
                true
            }
            Subscriber::Channel(tx) => match tx.try_send(notes.to_vec()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!("dropping a channel subscriber that stopped draining its lists");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }
}

/// The authoritative, always sorted list of notes.
///
/// Every mutation writes the whole list through to `storage` under one key and
/// then hands the new list to each subscriber before returning. Storage
/// failures are logged and never returned; the in-memory list still changes.
pub struct NoteStore<S: KeyValueStorage, C: Clock = SystemClock> {
    storage: S,
    clock: C,
    key: String,
    notes: Vec<Note>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl<S: KeyValueStorage> NoteStore<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self::with_clock(storage, key, SystemClock)
    }
}

impl<S: KeyValueStorage, C: Clock> NoteStore<S, C> {
    pub fn with_clock(storage: S, key: impl Into<String>, clock: C) -> Self {
        let key = key.into();
        let notes = load_notes(&storage, &key);
        Self {
            storage,
            clock,
            key,
            notes,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn create(&mut self, payload: NewNote) -> Note {
        let now = self.clock.now();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: title_or_untitled(payload.title),
            content: payload.content,
            created_at: now,
            updated_at: now,
            pinned: payload.pinned.unwrap_or(false),
            color: payload.color.unwrap_or_default(),
            image: payload.image,
        };

        self.notes.insert(0, note.clone());
        self.commit();
        note
    }

    /// Saves `update` over the stored note with the same id.
    ///
    /// An id that is no longer stored leaves the list untouched; the returned
    /// note is then the payload with a fresh `updated_at`.
    pub fn update(&mut self, update: NoteUpdate) -> Note {
        let now = self.clock.now();
        let Some(index) = self.notes.iter().position(|note| note.id == update.id) else {
            log::debug!("update for unknown note {} ignored", update.id);
            return detached(update, now);
        };

        let merged = reconcile(&self.notes[index], update, now);
        self.notes[index] = merged.clone();
        self.commit();
        merged
    }

    pub fn delete(&mut self, id: &str) {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        if self.notes.len() == before {
            log::debug!("delete for unknown note {id} ignored");
            return;
        }
        self.commit();
    }

    /// Flips the pin flag. The note's `updated_at` is left as it was.
    pub fn toggle_pin(&mut self, id: &str) {
        let Some(note) = self.notes.iter_mut().find(|note| note.id == id) else {
            log::debug!("pin toggle for unknown note {id} ignored");
            return;
        };
        note.pinned = !note.pinned;
        self.commit();
    }

    /// Calls `callback` with the current list now and after every later mutation.
    pub fn subscribe(&mut self, callback: impl FnMut(&[Note]) + 'static) -> SubscriptionId {
        self.add_subscriber(Subscriber::Callback(Box::new(callback)))
    }

    /// Same stream as `subscribe`, delivered as owned lists over a channel that
    /// holds at most `capacity` undelivered lists.
    ///
    /// A subscriber that lets the channel fill up is dropped, and its receiver
    /// disconnects once the queued lists are read.
    pub fn subscribe_channel(&mut self, capacity: usize) -> Receiver<Vec<Note>> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.add_subscriber(Subscriber::Channel(tx));
        rx
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    fn add_subscriber(&mut self, mut subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        if subscriber.notify(&self.notes) {
            self.subscribers.push((id, subscriber));
        }
        id
    }

    fn commit(&mut self) {
        sort_notes(&mut self.notes);
        self.persist();
        self.publish();
    }

    fn persist(&mut self) {
        let encoded = match serde_json::to_string(&self.notes) {
            Ok(encoded) => encoded,
            Err(err) => {
                log::error!("failed to encode notes: {err}");
                return;
            }
        };

        match self.storage.set(&self.key, &encoded) {
            Ok(()) => log::debug!("saved {} notes under '{}'", self.notes.len(), self.key),
            Err(err) => log::error!("failed to save notes under '{}': {err}", self.key),
        }
    }

    fn publish(&mut self) {
        let notes = &self.notes;
        self.subscribers
            .retain_mut(|(_, subscriber)| subscriber.notify(notes));
    }
}

fn load_notes<S: KeyValueStorage>(storage: &S, key: &str) -> Vec<Note> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            log::error!("failed to read notes under '{key}': {err}");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Note>>(&raw) {
        Ok(mut notes) => {
            sort_notes(&mut notes);
            dedup_by_id(&mut notes, key);
            notes
        }
        Err(err) => {
            log::error!("discarding unreadable notes under '{key}': {err}");
            Vec::new()
        }
    }
}

/// Keeps the first note for each id, so the one that sorts highest wins.
fn dedup_by_id(notes: &mut Vec<Note>, key: &str) {
    let mut seen = HashSet::new();
    let before = notes.len();
    notes.retain(|note| seen.insert(note.id.clone()));
    if notes.len() != before {
        log::warn!(
            "dropped {} notes with repeated ids under '{key}'",
            before - notes.len()
        );
    }
}
