use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use directories::ProjectDirs;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};

use crate::storage::{KeyValueStorage, StorageError};

pub const DB_FILE_NAME: &str = "notes.db";

pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    let proj = ProjectDirs::from("com", "LocalNotes", "local_notes").ok_or(StorageError::NoDataDir)?;
    Ok(proj.data_dir().to_path_buf())
}

/// Key-value storage in a SQLite file. A corrupt database file is moved aside
/// and replaced by an empty one, so reads after recovery see no data.
pub struct SqliteStorage {
    conn: RefCell<Connection>,
    path: Option<PathBuf>,
    quota_bytes: Option<usize>,
}

impl SqliteStorage {
    pub fn open(path: impl Into<PathBuf>, quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = match open_and_setup(&path) {
            Ok(conn) => conn,
            Err(err) if is_corruption_error(&err) => {
                log::warn!("database at {} is corrupt ({err}), starting fresh", path.display());
                backup_corrupt_db_files(&path)?;
                open_and_setup(&path)?
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            conn: RefCell::new(conn),
            path: Some(path),
            quota_bytes,
        })
    }

    pub fn open_in_memory(quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        setup_schema(&conn)?;
        Ok(Self {
            conn: RefCell::new(conn),
            path: None,
            quota_bytes,
        })
    }

    fn run_with_recovery<T, F>(&self, mut operation: F) -> Result<T, StorageError>
    where
        F: FnMut(&Connection) -> Result<T, StorageError>,
    {
        let result = operation(&self.conn.borrow());
        match result {
            Err(err) if self.path.is_some() && is_corruption_error(&err) => {
                log::warn!("storage operation hit a corrupt database ({err}), recovering");
                self.recover_connection()?;
                operation(&self.conn.borrow())
            }
            other => other,
        }
    }

    fn recover_connection(&self) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let mut conn = self.conn.borrow_mut();
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        let old = std::mem::replace(&mut *conn, Connection::open_in_memory()?);
        drop(old);
        backup_corrupt_db_files(path)?;
        *conn = open_and_setup(path)?;
        Ok(())
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.run_with_recovery(|conn| {
            Ok(conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let quota = self.quota_bytes;
        self.run_with_recovery(|conn| {
            if let Some(limit) = quota {
                let others: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0)
                     FROM kv WHERE key <> ?1",
                    [key],
                    |row| row.get(0),
                )?;
                let needed = usize::try_from(others).unwrap_or(0) + key.len() + value.len();
                if needed > limit {
                    return Err(StorageError::QuotaExceeded { needed, limit });
                }
            }

            conn.execute(
                "INSERT INTO kv(key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

fn create_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn open_and_setup(path: &Path) -> Result<Connection, StorageError> {
    let conn = create_connection(path)?;
    setup_schema(&conn)?;
    Ok(conn)
}

fn setup_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn backup_corrupt_db_files(db_file: &Path) -> Result<(), StorageError> {
    let stamp = unix_timestamp();
    for file in [
        db_file.to_path_buf(),
        PathBuf::from(format!("{}-wal", db_file.display())),
        PathBuf::from(format!("{}-shm", db_file.display())),
    ] {
        if file.exists() {
            let backup = PathBuf::from(format!("{}.corrupt.{stamp}", file.display()));
            std::fs::rename(&file, &backup)?;
            log::warn!("moved corrupt file {} to {}", file.display(), backup.display());
        }
    }
    Ok(())
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn is_corruption_error(err: &StorageError) -> bool {
    let StorageError::Sqlite(sql_err) = err else {
        return false;
    };

    if let rusqlite::Error::SqliteFailure(code, _) = sql_err {
        if code.code == ErrorCode::DatabaseCorrupt || code.code == ErrorCode::NotADatabase {
            return true;
        }
    }

    sql_err
        .to_string()
        .to_lowercase()
        .contains("database disk image is malformed")
}
