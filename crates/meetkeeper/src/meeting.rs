//! Core record types for meetkeeper.
//!
//! Meetings own note blocks (see [`crate::content`]) and tasks. The
//! remaining types are the values kept in the fixed-key area of the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key/value key for [`Settings`].
pub const SETTINGS_KEY: &str = "settings";

/// Key/value key for the id of the currently selected meeting.
pub const CURRENT_MEETING_KEY: &str = "current_meeting";

/// Key/value key for the [`Theme`].
pub const THEME_KEY: &str = "theme";

/// Key/value key for [`AppState`].
pub const APP_STATE_KEY: &str = "app_state";

/// A meeting with its agenda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Meeting title.
    pub title: String,

    /// Agenda items, in order.
    #[serde(default)]
    pub agenda: Vec<String>,

    /// When the meeting was created.
    pub created_at: DateTime<Utc>,

    /// When the meeting or its notes last changed.
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    /// Create a new meeting with a fresh id.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            agenda: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the agenda.
    #[must_use]
    pub fn with_agenda(mut self, agenda: Vec<String>) -> Self {
        self.agenda = agenda;
        self
    }
}

/// Whether a task is still to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not done yet.
    Open,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Parse the storage name of a status.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "open" => Some(Self::Open),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// How a task came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Added directly by the user.
    Manual,
    /// A checklist item ticked in the notes.
    Notes,
    /// An accepted extraction suggestion.
    Suggestion,
}

impl TaskSource {
    /// Parse the storage name of a source.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "manual" => Some(Self::Manual),
            "notes" => Some(Self::Notes),
            "suggestion" => Some(Self::Suggestion),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Notes => write!(f, "notes"),
            Self::Suggestion => write!(f, "suggestion"),
        }
    }
}

/// A task attached to a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The meeting this task belongs to.
    pub meeting_id: String,

    /// What needs doing.
    pub title: String,

    /// Current status.
    pub status: TaskStatus,

    /// Where the task came from.
    pub source: TaskSource,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// BLAKE3 hash of meeting id and title, for deduplication.
    pub content_hash: String,
}

impl Task {
    /// Create an open task.
    #[must_use]
    pub fn new(meeting_id: impl Into<String>, title: impl Into<String>, source: TaskSource) -> Self {
        let meeting_id = meeting_id.into();
        let title = title.into();
        let content_hash = Self::compute_hash(&meeting_id, &title);
        Self {
            id: None,
            meeting_id,
            title,
            status: TaskStatus::Open,
            source,
            created_at: Utc::now(),
            content_hash,
        }
    }

    /// Create a task that is already completed.
    #[must_use]
    pub fn completed(
        meeting_id: impl Into<String>,
        title: impl Into<String>,
        source: TaskSource,
    ) -> Self {
        Self {
            status: TaskStatus::Completed,
            ..Self::new(meeting_id, title, source)
        }
    }

    /// Compute the BLAKE3 hash identifying a task title within a meeting.
    #[must_use]
    pub fn compute_hash(meeting_id: &str, title: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(meeting_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(title.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Check if the task is done.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Display theme preference.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Light colors.
    Light,
    /// Dark colors.
    Dark,
    /// Follow the operating system.
    #[default]
    System,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
            Self::System => write!(f, "system"),
        }
    }
}

/// User-facing behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Publish a celebration when a checklist item completes a task.
    pub celebrate: bool,
    /// Run task extraction after notes are saved.
    pub suggestions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            celebrate: true,
            suggestions: true,
        }
    }
}

/// Bookkeeping about application use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    /// When the store was last opened by the application.
    pub last_opened_at: Option<DateTime<Utc>>,
    /// How many meetings have ever been created.
    pub meetings_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_new() {
        let meeting = Meeting::new("Planning").with_agenda(vec!["Budget".to_string()]);

        assert_eq!(meeting.title, "Planning");
        assert_eq!(meeting.agenda, vec!["Budget"]);
        assert_eq!(meeting.created_at, meeting.updated_at);
        assert!(Uuid::parse_str(&meeting.id).is_ok());
    }

    #[test]
    fn test_meeting_ids_are_unique() {
        assert_ne!(Meeting::new("a").id, Meeting::new("a").id);
    }

    #[test]
    fn test_task_new() {
        let task = Task::new("m1", "Send invite", TaskSource::Manual);

        assert!(task.id.is_none());
        assert_eq!(task.status, TaskStatus::Open);
        assert!(!task.is_completed());
        assert_eq!(task.content_hash, Task::compute_hash("m1", "Send invite"));
    }

    #[test]
    fn test_task_completed() {
        let task = Task::completed("m1", "Book room", TaskSource::Notes);
        assert!(task.is_completed());
        assert_eq!(task.source, TaskSource::Notes);
    }

    #[test]
    fn test_compute_hash_scopes_by_meeting() {
        let a = Task::compute_hash("m1", "Send invite");
        let b = Task::compute_hash("m2", "Send invite");

        assert_ne!(a, b);
        assert_eq!(a, Task::compute_hash("m1", "Send invite"));
        assert_eq!(a.len(), 64);
        // The separator keeps "ab"+"c" distinct from "a"+"bc".
        assert_ne!(Task::compute_hash("ab", "c"), Task::compute_hash("a", "bc"));
    }

    #[test]
    fn test_status_and_source_names() {
        for status in [TaskStatus::Open, TaskStatus::Completed] {
            assert_eq!(TaskStatus::from_name(&status.to_string()), Some(status));
        }
        for source in [TaskSource::Manual, TaskSource::Notes, TaskSource::Suggestion] {
            assert_eq!(TaskSource::from_name(&source.to_string()), Some(source));
        }
        assert_eq!(TaskStatus::from_name("blocked"), None);
    }

    #[test]
    fn test_theme_serialization() {
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
        let theme: Theme = serde_json::from_str("\"light\"").unwrap();
        assert_eq!(theme, Theme::Light);
        assert_eq!(Theme::default(), Theme::System);
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"celebrate": false}"#).unwrap();
        assert!(!settings.celebrate);
        assert!(settings.suggestions);
    }

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert!(state.last_opened_at.is_none());
        assert_eq!(state.meetings_created, 0);
    }
}
