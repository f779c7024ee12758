pub mod clock;
pub mod config;
pub mod db;
pub mod editor;
pub mod models;
pub mod ordering;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::SqliteStorage;
pub use models::{ImageChange, NewNote, Note, NoteColor, NoteUpdate};
pub use storage::{KeyValueStorage, MemoryStorage, StorageError};
pub use store::{NoteStore, SubscriptionId};
