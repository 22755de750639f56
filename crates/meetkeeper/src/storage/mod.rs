//! Storage layer for meetkeeper.
//!
//! This module provides `SQLite`-based persistent storage for meetings,
//! their note blocks and tasks, plus a small fixed-key value area for
//! settings, the current meeting pointer, theme and application state.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::{Block, BlockContent, BlockKind};
use crate::error::{Error, Result};
use crate::meeting::{
    AppState, Meeting, Settings, Task, TaskSource, TaskStatus, Theme, APP_STATE_KEY,
    CURRENT_MEETING_KEY, SETTINGS_KEY, THEME_KEY,
};

const MEMORY_PATH: &str = ":memory:";

/// Storage shared between a note session, its coordinator and extraction.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Lock shared storage, reporting poisoning as an error.
///
/// # Errors
///
/// Returns [`Error::LockPoisoned`] if a previous holder panicked.
pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, Storage>> {
    storage
        .lock()
        .map_err(|_| Error::LockPoisoned { resource: "storage" })
}

/// Storage engine for meetings, notes and tasks.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(MEMORY_PATH),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(MEMORY_PATH),
            conn,
        })
    }

    /// Wrap this storage for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Meetings ===

    /// Store a new meeting and count it in the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_meeting(&self, meeting: &Meeting) -> Result<()> {
        let agenda = serde_json::to_string(&meeting.agenda)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r"
            INSERT INTO meetings (id, title, agenda, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                meeting.id,
                meeting.title,
                agenda,
                meeting.created_at.to_rfc3339(),
                meeting.updated_at.to_rfc3339(),
            ],
        )?;

        let mut state: AppState = get_json(&tx, APP_STATE_KEY)?.unwrap_or_default();
        state.meetings_created += 1;
        set_json(&tx, APP_STATE_KEY, &state)?;
        tx.commit()?;

        debug!(meeting_id = %meeting.id, "created meeting");
        Ok(())
    }

    /// Get a meeting by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_meeting(&self, id: &str) -> Result<Option<Meeting>> {
        let meeting = self
            .conn
            .query_row(
                r"
                SELECT id, title, agenda, created_at, updated_at
                FROM meetings WHERE id = ?1
                ",
                [id],
                Self::row_to_meeting,
            )
            .optional()?;
        Ok(meeting)
    }

    /// Get a meeting by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeetingNotFound`] for an unknown id, or a database error.
    pub fn require_meeting(&self, id: &str) -> Result<Meeting> {
        self.get_meeting(id)?
            .ok_or_else(|| Error::meeting_not_found(id))
    }

    /// List all meetings, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_meetings(&self) -> Result<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, title, agenda, created_at, updated_at
            FROM meetings ORDER BY created_at DESC, rowid DESC
            ",
        )?;
        let meetings = stmt
            .query_map([], Self::row_to_meeting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(meetings)
    }

    /// Replace a meeting's agenda.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeetingNotFound`] for an unknown id, or a database error.
    pub fn update_agenda(&self, id: &str, agenda: &[String]) -> Result<()> {
        let agenda = serde_json::to_string(agenda)?;
        let affected = self.conn.execute(
            "UPDATE meetings SET agenda = ?1, updated_at = ?2 WHERE id = ?3",
            params![agenda, Utc::now().to_rfc3339(), id],
        )?;
        if affected == 0 {
            return Err(Error::meeting_not_found(id));
        }
        Ok(())
    }

    /// Delete a meeting together with its blocks and tasks.
    ///
    /// Clears the current-meeting pointer if it named this meeting.
    /// Returns `true` if a meeting was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_meeting(&self, id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM note_blocks WHERE meeting_id = ?1", [id])?;
        tx.execute("DELETE FROM tasks WHERE meeting_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM meetings WHERE id = ?1", [id])?;

        let current: Option<String> = get_json(&tx, CURRENT_MEETING_KEY)?;
        if current.as_deref() == Some(id) {
            remove_key(&tx, CURRENT_MEETING_KEY)?;
        }
        tx.commit()?;

        if affected > 0 {
            info!(meeting_id = %id, "deleted meeting");
        }
        Ok(affected > 0)
    }

    fn touch_meeting(conn: &Connection, id: &str) -> Result<()> {
        let affected = conn.execute(
            "UPDATE meetings SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if affected == 0 {
            return Err(Error::meeting_not_found(id));
        }
        Ok(())
    }

    // === Note blocks ===

    /// Load a meeting's blocks in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_blocks(&self, meeting_id: &str) -> Result<Vec<Block>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, kind, content, timestamp
            FROM note_blocks WHERE meeting_id = ?1
            ORDER BY position ASC
            ",
        )?;
        let blocks = stmt
            .query_map([meeting_id], Self::row_to_block)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    /// Store `blocks` as the meeting's complete block sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeetingNotFound`] for an unknown meeting, or a database error.
    pub fn save_blocks(&self, meeting_id: &str, blocks: &[Block]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        Self::touch_meeting(&tx, meeting_id)?;
        tx.execute("DELETE FROM note_blocks WHERE meeting_id = ?1", [meeting_id])?;

        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO note_blocks (id, meeting_id, position, kind, content, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )?;
            for (position, block) in blocks.iter().enumerate() {
                let position = i64::try_from(position).unwrap_or(i64::MAX);
                stmt.execute(params![
                    block.id,
                    meeting_id,
                    position,
                    block.kind.to_string(),
                    serde_json::to_string(&block.content)?,
                    block.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(%meeting_id, count = blocks.len(), "saved note blocks");
        Ok(())
    }

    /// Remove one block from a meeting's sequence.
    ///
    /// Later blocks move up one position. Returns `true` if a block was
    /// removed, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_block(&self, meeting_id: &str, block_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let position: Option<i64> = tx
            .query_row(
                "SELECT position FROM note_blocks WHERE meeting_id = ?1 AND id = ?2",
                [meeting_id, block_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(position) = position else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM note_blocks WHERE meeting_id = ?1 AND id = ?2",
            [meeting_id, block_id],
        )?;
        tx.execute(
            "UPDATE note_blocks SET position = position - 1 WHERE meeting_id = ?1 AND position > ?2",
            params![meeting_id, position],
        )?;
        Self::touch_meeting(&tx, meeting_id)?;
        tx.commit()?;

        debug!(%meeting_id, %block_id, "removed note block");
        Ok(true)
    }

    // === Tasks ===

    /// Insert a task.
    ///
    /// Returns the assigned ID, or `None` if the task was deduplicated
    /// (a task with the same title already exists in the meeting).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeetingNotFound`] for an unknown meeting, or a database error.
    pub fn insert_task(&self, task: &Task) -> Result<Option<i64>> {
        if self.get_meeting(&task.meeting_id)?.is_none() {
            return Err(Error::meeting_not_found(&task.meeting_id));
        }
        if self.task_exists_by_hash(&task.content_hash)? {
            debug!(
                "Skipping duplicate task with hash {}",
                &task.content_hash[..16.min(task.content_hash.len())]
            );
            return Ok(None);
        }

        self.conn.execute(
            r"
            INSERT INTO tasks (meeting_id, title, status, source, created_at, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                task.meeting_id,
                task.title,
                task.status.to_string(),
                task.source.to_string(),
                task.created_at.to_rfc3339(),
                task.content_hash,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted task with id {}", id);
        Ok(Some(id))
    }

    /// Find the task with the given dedup hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_task_by_hash(&self, hash: &str) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                r"
                SELECT id, meeting_id, title, status, source, created_at, content_hash
                FROM tasks WHERE content_hash = ?1
                ",
                [hash],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn task_exists_by_hash(&self, hash: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE content_hash = ?1",
            [hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a task by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                r"
                SELECT id, meeting_id, title, status, source, created_at, content_hash
                FROM tasks WHERE id = ?1
                ",
                [id],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// List a meeting's tasks in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_tasks(&self, meeting_id: &str) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, meeting_id, title, status, source, created_at, content_hash
            FROM tasks WHERE meeting_id = ?1 ORDER BY id ASC
            ",
        )?;
        let tasks = stmt
            .query_map([meeting_id], Self::row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Change a task's status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown id, or a database error.
    pub fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        if affected == 0 {
            return Err(Error::TaskNotFound { id });
        }
        Ok(())
    }

    // === Fixed-key values ===

    /// Read a JSON value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        get_json(&self.conn, key)
    }

    /// Store `value` as JSON under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or encoding fails.
    pub fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        set_json(&self.conn, key, value)
    }

    /// Stored settings, or the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn settings(&self) -> Result<Settings> {
        Ok(self.get_value(SETTINGS_KEY)?.unwrap_or_default())
    }

    /// Store settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_settings(&self, settings: &Settings) -> Result<()> {
        self.set_value(SETTINGS_KEY, settings)
    }

    /// Stored theme, or the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn theme(&self) -> Result<Theme> {
        Ok(self.get_value(THEME_KEY)?.unwrap_or_default())
    }

    /// Store the theme.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set_value(THEME_KEY, &theme)
    }

    /// The id of the currently selected meeting, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn current_meeting(&self) -> Result<Option<String>> {
        self.get_value(CURRENT_MEETING_KEY)
    }

    /// Select a meeting, or clear the selection with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MeetingNotFound`] for an unknown id, or a database error.
    pub fn set_current_meeting(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                self.require_meeting(id)?;
                self.set_value(CURRENT_MEETING_KEY, id)
            }
            None => remove_key(&self.conn, CURRENT_MEETING_KEY),
        }
    }

    /// Stored application state, or the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    pub fn app_state(&self) -> Result<AppState> {
        Ok(self.get_value(APP_STATE_KEY)?.unwrap_or_default())
    }

    /// Record that the application opened the store now.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_opened(&self) -> Result<AppState> {
        let mut state = self.app_state()?;
        state.last_opened_at = Some(Utc::now());
        self.set_value(APP_STATE_KEY, &state)?;
        Ok(state)
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        let total_meetings = count("SELECT COUNT(*) FROM meetings")?;
        let total_blocks = count("SELECT COUNT(*) FROM note_blocks")?;
        let total_tasks = count("SELECT COUNT(*) FROM tasks")?;
        let open_tasks = count("SELECT COUNT(*) FROM tasks WHERE status = 'open'")?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM meetings ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last_updated = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.as_os_str() == MEMORY_PATH {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_meetings,
            total_blocks,
            total_tasks,
            open_tasks,
            last_updated,
            db_size_bytes,
        })
    }

    // === Row mapping ===

    fn row_to_meeting(row: &rusqlite::Row) -> rusqlite::Result<Meeting> {
        let agenda_json: String = row.get(2)?;
        let agenda = serde_json::from_str(&agenda_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        Ok(Meeting {
            id: row.get(0)?,
            title: row.get(1)?,
            agenda,
            created_at: parse_timestamp(&row.get::<_, String>(3)?),
            updated_at: parse_timestamp(&row.get::<_, String>(4)?),
        })
    }

    fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<Block> {
        let kind_str: String = row.get(1)?;
        let kind = BlockKind::from_name(&kind_str).unwrap_or_else(|| {
            warn!("Unknown block kind: {}, defaulting to paragraph", kind_str);
            BlockKind::Paragraph
        });

        let content_json: String = row.get(2)?;
        let content: BlockContent = serde_json::from_str(&content_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        Ok(Block {
            id: row.get(0)?,
            kind,
            content,
            timestamp: parse_timestamp(&row.get::<_, String>(3)?),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let status_str: String = row.get(3)?;
        let status = TaskStatus::from_name(&status_str).unwrap_or_else(|| {
            warn!("Unknown task status: {}, defaulting to open", status_str);
            TaskStatus::Open
        });

        let source_str: String = row.get(4)?;
        let source = TaskSource::from_name(&source_str).unwrap_or_else(|| {
            warn!("Unknown task source: {}, defaulting to manual", source_str);
            TaskSource::Manual
        });

        Ok(Task {
            id: Some(row.get(0)?),
            meeting_id: row.get(1)?,
            title: row.get(2)?,
            status,
            source,
            created_at: parse_timestamp(&row.get::<_, String>(5)?),
            content_hash: row.get(6)?,
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn get_json<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    raw.map(|value| serde_json::from_str(&value))
        .transpose()
        .map_err(Error::from)
}

fn set_json<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn remove_key(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM metadata WHERE key = ?1", [key])?;
    Ok(())
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of meetings.
    pub total_meetings: i64,
    /// Number of stored note blocks across all meetings.
    pub total_blocks: i64,
    /// Number of tasks across all meetings.
    pub total_tasks: i64,
    /// Number of tasks still open.
    pub open_tasks: i64,
    /// When any meeting last changed.
    pub last_updated: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn create_meeting(storage: &Storage, title: &str) -> Meeting {
        let meeting = Meeting::new(title);
        storage.create_meeting(&meeting).unwrap();
        meeting
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path(), Path::new(":memory:"));
        assert!(storage.list_meetings().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_get_meeting() {
        let storage = create_test_storage();
        let meeting = Meeting::new("Planning").with_agenda(vec!["Budget".into(), "Hiring".into()]);
        storage.create_meeting(&meeting).unwrap();

        let loaded = storage.get_meeting(&meeting.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Planning");
        assert_eq!(loaded.agenda, vec!["Budget", "Hiring"]);
        assert_eq!(loaded.created_at, meeting.created_at);
    }

    #[test]
    fn test_get_missing_meeting() {
        let storage = create_test_storage();
        assert!(storage.get_meeting("nope").unwrap().is_none());
        assert!(storage.require_meeting("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_meeting_counts_in_app_state() {
        let storage = create_test_storage();
        create_meeting(&storage, "a");
        create_meeting(&storage, "b");
        assert_eq!(storage.app_state().unwrap().meetings_created, 2);
    }

    #[test]
    fn test_list_meetings_newest_first() {
        let storage = create_test_storage();
        let first = create_meeting(&storage, "first");
        let second = create_meeting(&storage, "second");

        let ids: Vec<String> = storage
            .list_meetings()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_update_agenda() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "sync");

        storage
            .update_agenda(&meeting.id, &["Roadmap".to_string()])
            .unwrap();

        let loaded = storage.require_meeting(&meeting.id).unwrap();
        assert_eq!(loaded.agenda, vec!["Roadmap"]);
        assert!(loaded.updated_at >= meeting.updated_at);
        assert!(storage.update_agenda("nope", &[]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_meeting_cascades() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "doomed");
        storage
            .save_blocks(&meeting.id, &[Block::paragraph("note")])
            .unwrap();
        storage
            .insert_task(&Task::new(&meeting.id, "task", TaskSource::Manual))
            .unwrap();
        storage.set_current_meeting(Some(meeting.id.as_str())).unwrap();

        assert!(storage.delete_meeting(&meeting.id).unwrap());

        assert!(storage.get_meeting(&meeting.id).unwrap().is_none());
        assert!(storage.load_blocks(&meeting.id).unwrap().is_empty());
        assert!(storage.list_tasks(&meeting.id).unwrap().is_empty());
        assert!(storage.current_meeting().unwrap().is_none());
        assert!(!storage.delete_meeting(&meeting.id).unwrap());
    }

    #[test]
    fn test_delete_meeting_keeps_other_current() {
        let storage = create_test_storage();
        let keep = create_meeting(&storage, "keep");
        let drop_me = create_meeting(&storage, "drop");
        storage.set_current_meeting(Some(keep.id.as_str())).unwrap();

        storage.delete_meeting(&drop_me.id).unwrap();
        assert_eq!(storage.current_meeting().unwrap(), Some(keep.id));
    }

    #[test]
    fn test_save_and_load_blocks_in_order() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "notes");
        let blocks = vec![
            Block::heading(2, "Agenda"),
            Block::paragraph("Talked"),
            Block::checklist("Follow up", true),
        ];

        storage.save_blocks(&meeting.id, &blocks).unwrap();
        let loaded = storage.load_blocks(&meeting.id).unwrap();

        assert_eq!(loaded.len(), 3);
        for (stored, original) in loaded.iter().zip(&blocks) {
            assert_eq!(stored.id, original.id);
            assert!(stored.same_content(original));
        }
    }

    #[test]
    fn test_save_blocks_replaces_sequence() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "notes");
        storage
            .save_blocks(&meeting.id, &[Block::paragraph("a"), Block::paragraph("b")])
            .unwrap();

        let replacement = vec![Block::paragraph("c")];
        storage.save_blocks(&meeting.id, &replacement).unwrap();

        let loaded = storage.load_blocks(&meeting.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content.text, "c");
    }

    #[test]
    fn test_save_blocks_unknown_meeting() {
        let storage = create_test_storage();
        let err = storage
            .save_blocks("nope", &[Block::paragraph("x")])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_block_shifts_later_blocks() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "notes");
        let blocks = vec![
            Block::paragraph("a"),
            Block::paragraph("b"),
            Block::paragraph("c"),
        ];
        storage.save_blocks(&meeting.id, &blocks).unwrap();

        assert!(storage.remove_block(&meeting.id, &blocks[1].id).unwrap());
        assert!(!storage.remove_block(&meeting.id, &blocks[1].id).unwrap());

        let texts: Vec<String> = storage
            .load_blocks(&meeting.id)
            .unwrap()
            .into_iter()
            .map(|b| b.content.text)
            .collect();
        assert_eq!(texts, vec!["a", "c"]);

        storage
            .save_blocks(&meeting.id, &storage.load_blocks(&meeting.id).unwrap())
            .unwrap();
        assert_eq!(storage.load_blocks(&meeting.id).unwrap().len(), 2);
    }

    #[test]
    fn test_insert_task_and_get() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");
        let task = Task::new(&meeting.id, "Send invite", TaskSource::Suggestion);

        let id = storage.insert_task(&task).unwrap().unwrap();
        let loaded = storage.get_task(id).unwrap().unwrap();

        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.title, "Send invite");
        assert_eq!(loaded.status, TaskStatus::Open);
        assert_eq!(loaded.source, TaskSource::Suggestion);
        assert_eq!(loaded.content_hash, task.content_hash);
    }

    #[test]
    fn test_insert_task_deduplication() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");

        let first = storage
            .insert_task(&Task::new(&meeting.id, "Same", TaskSource::Manual))
            .unwrap();
        let second = storage
            .insert_task(&Task::completed(&meeting.id, "Same", TaskSource::Notes))
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(storage.list_tasks(&meeting.id).unwrap().len(), 1);
    }

    #[test]
    fn test_find_task_by_hash() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");
        let task = Task::new(&meeting.id, "Book room", TaskSource::Manual);
        let id = storage.insert_task(&task).unwrap();

        let found = storage.find_task_by_hash(&task.content_hash).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.title, "Book room");
        assert!(storage
            .find_task_by_hash(&Task::compute_hash(&meeting.id, "other"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_same_title_in_different_meetings() {
        let storage = create_test_storage();
        let a = create_meeting(&storage, "a");
        let b = create_meeting(&storage, "b");

        assert!(storage
            .insert_task(&Task::new(&a.id, "Same", TaskSource::Manual))
            .unwrap()
            .is_some());
        assert!(storage
            .insert_task(&Task::new(&b.id, "Same", TaskSource::Manual))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_insert_task_unknown_meeting() {
        let storage = create_test_storage();
        let err = storage
            .insert_task(&Task::new("nope", "x", TaskSource::Manual))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_task_status() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");
        let id = storage
            .insert_task(&Task::new(&meeting.id, "Do it", TaskSource::Manual))
            .unwrap()
            .unwrap();

        storage.set_task_status(id, TaskStatus::Completed).unwrap();
        assert!(storage.get_task(id).unwrap().unwrap().is_completed());

        let err = storage
            .set_task_status(9_999, TaskStatus::Open)
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound { id: 9_999 }));
    }

    #[test]
    fn test_list_tasks_in_creation_order() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");
        for title in ["one", "two", "three"] {
            storage
                .insert_task(&Task::new(&meeting.id, title, TaskSource::Manual))
                .unwrap();
        }

        let titles: Vec<String> = storage
            .list_tasks(&meeting.id)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_settings_default_and_roundtrip() {
        let storage = create_test_storage();
        assert_eq!(storage.settings().unwrap(), Settings::default());

        let settings = Settings {
            celebrate: false,
            suggestions: true,
        };
        storage.set_settings(&settings).unwrap();
        assert_eq!(storage.settings().unwrap(), settings);
    }

    #[test]
    fn test_theme() {
        let storage = create_test_storage();
        assert_eq!(storage.theme().unwrap(), Theme::System);

        storage.set_theme(Theme::Dark).unwrap();
        assert_eq!(storage.theme().unwrap(), Theme::Dark);
    }

    #[test]
    fn test_current_meeting() {
        let storage = create_test_storage();
        let meeting = create_meeting(&storage, "m");

        assert!(storage.current_meeting().unwrap().is_none());
        storage.set_current_meeting(Some(meeting.id.as_str())).unwrap();
        assert_eq!(storage.current_meeting().unwrap(), Some(meeting.id.clone()));

        assert!(storage
            .set_current_meeting(Some("nope"))
            .unwrap_err()
            .is_not_found());

        storage.set_current_meeting(None).unwrap();
        assert!(storage.current_meeting().unwrap().is_none());
    }

    #[test]
    fn test_record_opened() {
        let storage = create_test_storage();
        let state = storage.record_opened().unwrap();
        assert!(state.last_opened_at.is_some());
        assert_eq!(storage.app_state().unwrap(), state);
    }

    #[test]
    fn test_get_value_bad_json() {
        let storage = create_test_storage();
        storage
            .conn
            .execute(
                "INSERT INTO metadata (key, value) VALUES ('theme', 'not json')",
                [],
            )
            .unwrap();
        assert!(matches!(storage.theme(), Err(Error::Json(_))));
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let empty = storage.stats().unwrap();
        assert_eq!(empty.total_meetings, 0);
        assert!(empty.last_updated.is_none());
        assert_eq!(empty.db_size_bytes, 0);

        let meeting = create_meeting(&storage, "m");
        storage
            .save_blocks(&meeting.id, &[Block::paragraph("a"), Block::paragraph("b")])
            .unwrap();
        let id = storage
            .insert_task(&Task::new(&meeting.id, "one", TaskSource::Manual))
            .unwrap()
            .unwrap();
        storage
            .insert_task(&Task::new(&meeting.id, "two", TaskSource::Manual))
            .unwrap();
        storage.set_task_status(id, TaskStatus::Completed).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_meetings, 1);
        assert_eq!(stats.total_blocks, 2);
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.open_tasks, 1);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_open_file_based_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("meetings.db");

        let meeting = Meeting::new("durable");
        {
            let storage = Storage::open(&db_path).unwrap();
            assert_eq!(storage.path(), db_path);
            storage.create_meeting(&meeting).unwrap();
            storage
                .save_blocks(&meeting.id, &[Block::paragraph("kept")])
                .unwrap();
        }

        let reopened = Storage::open(&db_path).unwrap();
        assert_eq!(reopened.require_meeting(&meeting.id).unwrap().title, "durable");
        assert_eq!(reopened.load_blocks(&meeting.id).unwrap()[0].content.text, "kept");
        assert!(reopened.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn test_shared_lock() {
        let shared = create_test_storage().into_shared();
        let guard = lock(&shared).unwrap();
        assert!(guard.list_meetings().unwrap().is_empty());
    }
}
