//! `meetkeeper` - Meeting notes that keep themselves saved
//!
//! This library provides a local meeting store with agendas, Markdown notes
//! and tasks, an auto-save coordinator that persists edits without flooding
//! the store, and an advisory pass that suggests action items from notes.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod autosave;
pub mod cli;
pub mod config;
pub mod content;
pub mod debounce;
pub mod error;
pub mod extract;
pub mod logging;
pub mod meeting;
pub mod notify;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use autosave::{AutoSave, AutoSaveStatus, Persist, SaveTarget};
pub use config::{AutoSaveConfig, Config};
pub use content::{Block, BlockContent, BlockKind};
pub use debounce::{debounce, Debounced, Debouncer};
pub use error::{Error, Result};
pub use extract::{Suggestion, TaskExtractor};
pub use logging::init_logging;
pub use meeting::{AppState, Meeting, Settings, Task, TaskSource, TaskStatus, Theme};
pub use notify::{Notification, NotificationBus, Subscription};
pub use session::{NoteSession, SessionSettings};
pub use storage::{SharedStorage, Storage, StorageStats};
