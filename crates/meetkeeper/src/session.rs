//! Note-taking session for one meeting.
//!
//! A [`NoteSession`] owns the live editor snapshot of a meeting's notes and
//! an [`AutoSave`] coordinator bound to it. Every save runs the notes
//! pipeline:
//!
//! 1. blank content is skipped;
//! 2. the Markdown is parsed into blocks and reconciled with the stored
//!    sequence, which is written back when anything changed;
//! 3. checklist items that became ticked are stored as completed tasks;
//! 4. notifications go out on the bus, and task extraction is scheduled
//!    behind its own debounce.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::autosave::{AutoSave, AutoSaveStatus, Persist, SaveTarget};
use crate::config::{AutoSaveConfig, Config, ExtractionConfig};
use crate::content::{self, Block};
use crate::debounce::{debounce, Debounced};
use crate::error::Result;
use crate::extract::TaskExtractor;
use crate::meeting::{Settings, Task, TaskSource, TaskStatus};
use crate::notify::{Notification, NotificationBus};
use crate::storage::{self, SharedStorage};

/// Everything a session needs to know about how to behave.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    /// Coordinator configuration.
    pub autosave: AutoSaveConfig,
    /// Extraction patterns, bounds and delay.
    pub extraction: ExtractionConfig,
    /// User-facing switches.
    pub behavior: Settings,
}

impl SessionSettings {
    /// Combine file configuration with stored user settings.
    #[must_use]
    pub fn from_config(config: &Config, behavior: Settings) -> Self {
        Self {
            autosave: config.autosave,
            extraction: config.extraction.clone(),
            behavior,
        }
    }
}

/// The save function behind a session's coordinator.
struct NotesPipeline {
    meeting_id: String,
    storage: SharedStorage,
    bus: NotificationBus,
    behavior: Settings,
    suggest: bool,
    extraction: Debounced<Vec<Block>>,
}

impl NotesPipeline {
    fn new(
        meeting_id: &str,
        storage: SharedStorage,
        bus: NotificationBus,
        settings: SessionSettings,
    ) -> Self {
        let extractor = TaskExtractor::with_config(settings.extraction.clone());
        let delay = settings.extraction.delay();
        let extraction_bus = bus.clone();
        let extraction_meeting = meeting_id.to_string();

        let extraction = debounce(
            move |blocks: Vec<Block>| {
                let suggestions = extractor.extract(&content::plain_text(&blocks));
                debug!(
                    meeting_id = %extraction_meeting,
                    count = suggestions.len(),
                    "extraction finished"
                );
                if !suggestions.is_empty() {
                    extraction_bus.publish(Notification::SuggestionsReady {
                        meeting_id: extraction_meeting.clone(),
                        suggestions,
                    });
                }
            },
            delay,
        );

        Self {
            meeting_id: meeting_id.to_string(),
            storage,
            bus,
            behavior: settings.behavior,
            suggest: settings.extraction.enabled && settings.behavior.suggestions,
            extraction,
        }
    }
}

impl Persist<String> for NotesPipeline {
    fn persist(&self, markup: &String) -> Result<()> {
        let incoming = content::parse_blocks(markup);
        if incoming.is_empty() {
            trace!(meeting_id = %self.meeting_id, "notes blank, nothing to save");
            return Ok(());
        }

        let storage = storage::lock(&self.storage)?;
        let previous = storage.load_blocks(&self.meeting_id)?;
        let checked = content::newly_checked(&previous, &incoming);
        let merged = content::reconcile(&previous, incoming);

        if merged.is_unchanged() {
            trace!(meeting_id = %self.meeting_id, "notes unchanged");
            return Ok(());
        }

        storage.save_blocks(&self.meeting_id, &merged.blocks)?;
        debug!(
            meeting_id = %self.meeting_id,
            updated = merged.updated,
            appended = merged.appended,
            "notes saved"
        );

        let mut completed = Vec::new();
        for title in checked {
            let mut task = Task::completed(&self.meeting_id, title, TaskSource::Notes);
            if let Some(id) = storage.insert_task(&task)? {
                task.id = Some(id);
                completed.push((task.title.clone(), Notification::TaskCreated { task }));
                continue;
            }
            // Same title already tracked: complete it instead of adding a second task
            let Some(mut existing) = storage.find_task_by_hash(&task.content_hash)? else {
                continue;
            };
            if let (Some(id), false) = (existing.id, existing.is_completed()) {
                storage.set_task_status(id, TaskStatus::Completed)?;
                existing.status = TaskStatus::Completed;
                completed.push((
                    existing.title.clone(),
                    Notification::TaskCompleted { task: existing },
                ));
            }
        }
        drop(storage);

        for (title, notification) in completed {
            info!(meeting_id = %self.meeting_id, %title, "task completed from notes");
            self.bus.publish(notification);
            if self.behavior.celebrate {
                self.bus.publish(Notification::Celebrate {
                    meeting_id: self.meeting_id.clone(),
                    title,
                });
            }
        }

        self.bus.publish(Notification::NotesSaved {
            meeting_id: self.meeting_id.clone(),
            blocks: merged.blocks.len(),
        });

        if self.suggest {
            self.extraction.call(merged.blocks);
        }
        Ok(())
    }
}

/// A meeting's notes being edited, kept saved in the background.
///
/// Opening and editing require a tokio runtime. Dropping the session stops
/// its timers without a final save; call [`NoteSession::close`] to save.
pub struct NoteSession {
    meeting_id: String,
    storage: SharedStorage,
    bus: NotificationBus,
    target: SaveTarget<String>,
    pipeline: Arc<NotesPipeline>,
    autosave: AutoSave<String>,
}

impl NoteSession {
    /// Open a session on a stored meeting.
    ///
    /// The editor snapshot starts as the stored blocks rendered to Markdown.
    /// When auto-save is enabled that snapshot is saved before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MeetingNotFound`] for an unknown meeting, or the
    /// error of the initial save.
    pub fn open(
        storage: SharedStorage,
        bus: NotificationBus,
        meeting_id: &str,
        settings: SessionSettings,
    ) -> Result<Self> {
        let stored = {
            let guard = storage::lock(&storage)?;
            guard.require_meeting(meeting_id)?;
            guard.load_blocks(meeting_id)?
        };

        let autosave_config = settings.autosave;
        let pipeline = Arc::new(NotesPipeline::new(
            meeting_id,
            Arc::clone(&storage),
            bus.clone(),
            settings,
        ));

        let target = SaveTarget::new(content::render_blocks(&stored));
        let persist: Arc<dyn Persist<String>> = pipeline.clone();
        let autosave = AutoSave::start(&target, persist, autosave_config)?;

        info!(%meeting_id, blocks = stored.len(), "note session opened");
        Ok(Self {
            meeting_id: meeting_id.to_string(),
            storage,
            bus,
            target,
            pipeline,
            autosave,
        })
    }

    /// The meeting being edited.
    #[must_use]
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// The current editor snapshot.
    #[must_use]
    pub fn markup(&self) -> String {
        self.target.snapshot()
    }

    /// Replace the editor snapshot.
    pub fn edit(&self, markup: impl Into<String>) {
        self.target.set(markup.into());
    }

    /// The blocks currently in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn blocks(&self) -> Result<Vec<Block>> {
        storage::lock(&self.storage)?.load_blocks(&self.meeting_id)
    }

    /// Save the current snapshot now.
    ///
    /// # Errors
    ///
    /// Returns the error of the save.
    pub fn save_now(&self) -> Result<()> {
        self.autosave.save_now()
    }

    /// Change the auto-save configuration.
    ///
    /// # Errors
    ///
    /// Returns the error of the immediate save performed on (re)enabling.
    pub fn set_autosave(&mut self, config: AutoSaveConfig) -> Result<()> {
        self.autosave.reconfigure(config)
    }

    /// The coordinator's counters.
    #[must_use]
    pub fn autosave_status(&self) -> AutoSaveStatus {
        self.autosave.status()
    }

    /// Turn a suggestion into an open task.
    ///
    /// Returns `None` when the meeting already has a task with this title.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be stored.
    pub fn accept_suggestion(&self, text: &str) -> Result<Option<Task>> {
        let mut task = Task::new(&self.meeting_id, text.trim(), TaskSource::Suggestion);
        let id = storage::lock(&self.storage)?.insert_task(&task)?;
        let Some(id) = id else {
            debug!(meeting_id = %self.meeting_id, title = %task.title, "suggestion already a task");
            return Ok(None);
        };
        task.id = Some(id);
        self.bus.publish(Notification::TaskCreated { task: task.clone() });
        Ok(Some(task))
    }

    /// Save one last time and stop every timer.
    ///
    /// # Errors
    ///
    /// Returns the error of the final save. The timers are stopped either way.
    pub fn close(mut self) -> Result<()> {
        self.autosave.stop();
        let result = self.autosave.save_now();
        self.pipeline.extraction.cancel();
        info!(meeting_id = %self.meeting_id, "note session closed");
        result
    }
}

impl std::fmt::Debug for NoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteSession")
            .field("meeting_id", &self.meeting_id)
            .field("autosave", &self.autosave)
            .finish_non_exhaustive()
    }
}
