//! `SQLite` schema definitions for meetkeeper.
//!
//! These statements create the version 1 schema. Later changes live in
//! [`super::migrations`].

/// SQL statement to create the meetings table.
///
/// `agenda` holds a JSON array of strings.
pub const CREATE_MEETINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS meetings (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    agenda TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the note blocks table.
///
/// `content` holds the JSON-encoded block payload.
pub const CREATE_NOTE_BLOCKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS note_blocks (
    id TEXT PRIMARY KEY,
    meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create the tasks table.
pub const CREATE_TASKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    meeting_id TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL,
    content_hash TEXT NOT NULL
)
";

/// SQL statement to create an index on `meeting_id` for block loads.
pub const CREATE_BLOCKS_MEETING_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_note_blocks_meeting ON note_blocks(meeting_id, position)
";

/// SQL statement to create an index on `content_hash` for deduplication.
pub const CREATE_TASKS_HASH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tasks_hash ON tasks(content_hash)
";

/// SQL statement to create the metadata table.
///
/// Holds the schema version and the fixed-key application values.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_MEETINGS_TABLE,
    CREATE_NOTE_BLOCKS_TABLE,
    CREATE_TASKS_TABLE,
    CREATE_BLOCKS_MEETING_INDEX,
    CREATE_TASKS_HASH_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_child_tables_cascade() {
        assert!(CREATE_NOTE_BLOCKS_TABLE.contains("ON DELETE CASCADE"));
        assert!(CREATE_TASKS_TABLE.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_tasks_table_has_hash() {
        assert!(CREATE_TASKS_TABLE.contains("content_hash TEXT NOT NULL"));
    }
}
