//! `meetkeeper` - CLI for meetkeeper
//!
//! This binary provides the command-line interface for managing meetings,
//! their notes and tasks.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use meetkeeper::cli::{
    Cli, Command, ConfigCommand, MeetingArg, MeetingCommand, NotesCommand, NotesFormat,
    TasksCommand, ThemeCommand,
};
use meetkeeper::content::{self, Block};
use meetkeeper::storage::{self, SharedStorage};
use meetkeeper::{
    init_logging, Config, Error, Meeting, NoteSession, Notification, NotificationBus,
    SessionSettings, Storage, Task, TaskExtractor, TaskSource, TaskStatus,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Meeting(meeting_cmd) => handle_meeting(&open_storage(&config)?, meeting_cmd),
        Command::Notes(notes_cmd) => handle_notes(&config, open_storage(&config)?, notes_cmd),
        Command::Tasks(tasks_cmd) => handle_tasks(&config, &open_storage(&config)?, tasks_cmd),
        Command::Theme(theme_cmd) => handle_theme(&open_storage(&config)?, &theme_cmd),
        Command::Status(status_cmd) => {
            handle_status(&config, &open_storage(&config)?, status_cmd.json)
        }
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::open(config.database_path())?;
    storage.record_opened()?;
    Ok(storage)
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Resolve `--meeting`, falling back to the current meeting.
fn resolve_meeting(storage: &Storage, target: &MeetingArg) -> Result<Meeting> {
    if let Some(id) = &target.meeting {
        return find_meeting(storage, id);
    }
    let id = storage.current_meeting()?.ok_or(Error::NoCurrentMeeting)?;
    Ok(storage.require_meeting(&id)?)
}

/// Find a meeting by full id or unique id prefix.
fn find_meeting(storage: &Storage, id: &str) -> Result<Meeting> {
    if let Some(meeting) = storage.get_meeting(id)? {
        return Ok(meeting);
    }
    let mut matches: Vec<Meeting> = storage
        .list_meetings()?
        .into_iter()
        .filter(|m| m.id.starts_with(id))
        .collect();
    match matches.len() {
        0 => Err(Error::meeting_not_found(id).into()),
        1 => Ok(matches.remove(0)),
        n => bail!("meeting id prefix '{id}' is ambiguous ({n} matches)"),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn session_settings(config: &Config, storage: &SharedStorage) -> Result<SessionSettings> {
    let behavior = storage::lock(storage)?.settings()?;
    Ok(SessionSettings::from_config(config, behavior))
}

fn handle_meeting(storage: &Storage, cmd: MeetingCommand) -> Result<()> {
    match cmd {
        MeetingCommand::New {
            title,
            agenda,
            no_select,
        } => {
            let meeting = Meeting::new(title).with_agenda(agenda);
            storage.create_meeting(&meeting)?;
            if !no_select {
                storage.set_current_meeting(Some(&meeting.id))?;
            }
            println!("Created meeting {} ({})", meeting.id, meeting.title);
        }
        MeetingCommand::List { json } => {
            let meetings = storage.list_meetings()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&meetings)?);
                return Ok(());
            }
            if meetings.is_empty() {
                println!("No meetings yet. Create one with `meetkeeper meeting new <title>`.");
                return Ok(());
            }
            let current = storage.current_meeting()?;
            for meeting in &meetings {
                let marker = if current.as_deref() == Some(meeting.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{marker} {}  {}  {}",
                    short_id(&meeting.id),
                    meeting.created_at.format("%Y-%m-%d %H:%M"),
                    meeting.title
                );
            }
        }
        MeetingCommand::Show { target, json } => {
            let meeting = resolve_meeting(storage, &target)?;
            let blocks = storage.load_blocks(&meeting.id)?;
            let tasks = storage.list_tasks(&meeting.id)?;
            if json {
                let value = serde_json::json!({
                    "meeting": meeting,
                    "blocks": blocks.len(),
                    "tasks": tasks,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            println!("{}", meeting.title);
            println!("{}", "=".repeat(meeting.title.chars().count().max(3)));
            println!("Id:       {}", meeting.id);
            println!("Created:  {}", meeting.created_at.format("%Y-%m-%d %H:%M"));
            println!("Updated:  {}", meeting.updated_at.format("%Y-%m-%d %H:%M"));
            println!("Blocks:   {}", blocks.len());
            println!();
            print_agenda(&meeting);
            println!();
            print_tasks(&tasks);
        }
        MeetingCommand::Use { id } => {
            let meeting = find_meeting(storage, &id)?;
            storage.set_current_meeting(Some(&meeting.id))?;
            println!("Now using meeting {} ({})", short_id(&meeting.id), meeting.title);
        }
        MeetingCommand::Delete { id, yes } => {
            let meeting = find_meeting(storage, &id)?;
            if !yes {
                println!(
                    "This will delete meeting '{}' with its notes and tasks.",
                    meeting.title
                );
                println!("Use --yes to confirm.");
                return Ok(());
            }
            storage.delete_meeting(&meeting.id)?;
            println!("Deleted meeting {} ({})", short_id(&meeting.id), meeting.title);
        }
        MeetingCommand::Agenda { items, target } => {
            let meeting = resolve_meeting(storage, &target)?;
            if items.is_empty() {
                print_agenda(&meeting);
            } else {
                storage.update_agenda(&meeting.id, &items)?;
                println!("Agenda updated ({} items)", items.len());
            }
        }
    }
    Ok(())
}

fn print_agenda(meeting: &Meeting) {
    if meeting.agenda.is_empty() {
        println!("No agenda.");
        return;
    }
    println!("Agenda:");
    for (i, item) in meeting.agenda.iter().enumerate() {
        println!("  {}. {item}", i + 1);
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    println!("Tasks:");
    for task in tasks {
        let mark = if task.is_completed() { 'x' } else { ' ' };
        println!(
            "  #{:<4} [{mark}] {} ({})",
            task.id.unwrap_or_default(),
            task.title,
            task.source
        );
    }
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::TaskCreated { task } => {
            println!("+ task #{}: {}", task.id.unwrap_or_default(), task.title);
        }
        Notification::TaskCompleted { task } => {
            println!("* task #{} done: {}", task.id.unwrap_or_default(), task.title);
        }
        Notification::Celebrate { title, .. } => println!("Completed: {title}"),
        Notification::SuggestionsReady { suggestions, .. } => {
            println!("Suggested tasks:");
            for suggestion in suggestions {
                println!("  - {}", suggestion.text);
            }
        }
        Notification::NotesSaved { blocks, .. } => println!("Saved notes ({blocks} blocks)"),
    }
}

fn handle_notes(config: &Config, storage: Storage, cmd: NotesCommand) -> Result<()> {
    match cmd {
        NotesCommand::Show { target, format } => {
            let meeting = resolve_meeting(&storage, &target)?;
            let blocks = storage.load_blocks(&meeting.id)?;
            print_notes(&blocks, format)?;
        }
        NotesCommand::Import { file, target } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            if content::is_blank(&text) {
                bail!("{} has no notes to import", file.display());
            }
            let meeting = resolve_meeting(&storage, &target)?;
            import_notes(config, storage.into_shared(), &meeting, text)?;
        }
        NotesCommand::Watch { file, target } => {
            let meeting = resolve_meeting(&storage, &target)?;
            let runtime = current_thread_runtime()?;
            runtime.block_on(watch_notes(config, storage.into_shared(), &meeting, &file))?;
        }
    }
    Ok(())
}

fn print_notes(blocks: &[Block], format: NotesFormat) -> Result<()> {
    match format {
        NotesFormat::Markdown => {
            if blocks.is_empty() {
                println!("No notes yet.");
            } else {
                print!("{}", content::render_blocks(blocks));
            }
        }
        NotesFormat::Blocks => {
            for (i, block) in blocks.iter().enumerate() {
                let first_line = block.content.text.lines().next().unwrap_or_default();
                println!("{:>3}  {:<9}  {first_line}", i + 1, block.kind.to_string());
            }
        }
        NotesFormat::Json => println!("{}", serde_json::to_string_pretty(blocks)?),
    }
    Ok(())
}

fn import_notes(config: &Config, storage: SharedStorage, meeting: &Meeting, text: String) -> Result<()> {
    let mut settings = session_settings(config, &storage)?;
    settings.autosave = settings.autosave.disabled();
    let suggest = settings.behavior.suggestions;

    let bus = NotificationBus::new();
    let mut notifications = bus.subscribe();
    let runtime = current_thread_runtime()?;
    runtime.block_on(async {
        let session = NoteSession::open(storage, bus, &meeting.id, settings)?;
        session.edit(text.as_str());
        session.close()
    })?;

    for notification in notifications.drain() {
        print_notification(&notification);
    }

    if suggest {
        let extractor = TaskExtractor::with_config(config.extraction.clone());
        let suggestions = extractor.extract(&content::plain_text(&content::parse_blocks(&text)));
        if !suggestions.is_empty() {
            print_notification(&Notification::SuggestionsReady {
                meeting_id: meeting.id.clone(),
                suggestions,
            });
        }
    }
    Ok(())
}

async fn watch_notes(
    config: &Config,
    storage: SharedStorage,
    meeting: &Meeting,
    file: &Path,
) -> Result<()> {
    let settings = session_settings(config, &storage)?;
    let bus = NotificationBus::new();
    let mut notifications = bus.subscribe();
    let session = NoteSession::open(storage, bus, &meeting.id, settings)?;

    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_seen: Option<String> = None;

    println!(
        "Watching {} for meeting '{}' (Ctrl-C to stop)",
        file.display(),
        meeting.title
    );

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
            _ = poll.tick() => {
                match tokio::fs::read_to_string(file).await {
                    Ok(text) if last_seen.as_deref() != Some(text.as_str()) => {
                        debug!(bytes = text.len(), "notes file changed");
                        session.edit(text.as_str());
                        last_seen = Some(text);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(path = %file.display(), error = %e, "failed to read notes file"),
                }
            }
            Some(notification) = notifications.recv() => print_notification(&notification),
        }
    }

    session.close()?;
    for notification in notifications.drain() {
        print_notification(&notification);
    }
    println!("Stopped watching.");
    Ok(())
}

fn handle_tasks(config: &Config, storage: &Storage, cmd: TasksCommand) -> Result<()> {
    match cmd {
        TasksCommand::List { target, open, json } => {
            let meeting = resolve_meeting(storage, &target)?;
            let tasks: Vec<Task> = storage
                .list_tasks(&meeting.id)?
                .into_iter()
                .filter(|t| !open || !t.is_completed())
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }
        TasksCommand::Add { title, target } => {
            let meeting = resolve_meeting(storage, &target)?;
            let task = Task::new(&meeting.id, title.trim(), TaskSource::Manual);
            report_insert(storage, &task)?;
        }
        TasksCommand::Done { id, reopen } => {
            let status = if reopen {
                TaskStatus::Open
            } else {
                TaskStatus::Completed
            };
            storage.set_task_status(id, status)?;
            println!("Task #{id} is now {status}");
        }
        TasksCommand::Extract { target, file, json } => {
            let text = match file {
                Some(path) => {
                    let markup = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    content::plain_text(&content::parse_blocks(&markup))
                }
                None => {
                    let meeting = resolve_meeting(storage, &target)?;
                    content::plain_text(&storage.load_blocks(&meeting.id)?)
                }
            };
            let suggestions = TaskExtractor::with_config(config.extraction.clone()).extract(&text);
            if json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else if suggestions.is_empty() {
                println!("No suggestions.");
            } else {
                for (i, suggestion) in suggestions.iter().enumerate() {
                    println!("{:>3}. {}  [{}]", i + 1, suggestion.text, suggestion.pattern);
                }
                println!();
                println!("Accept one with `meetkeeper tasks accept \"<text>\"`.");
            }
        }
        TasksCommand::Accept { text, target } => {
            let meeting = resolve_meeting(storage, &target)?;
            let task = Task::new(&meeting.id, text.trim(), TaskSource::Suggestion);
            report_insert(storage, &task)?;
        }
    }
    Ok(())
}

fn report_insert(storage: &Storage, task: &Task) -> Result<()> {
    if task.title.is_empty() {
        bail!("task title cannot be empty");
    }
    match storage.insert_task(task)? {
        Some(id) => println!("Added task #{id}: {}", task.title),
        None => println!("Task already exists: {}", task.title),
    }
    Ok(())
}

fn handle_theme(storage: &Storage, cmd: &ThemeCommand) -> Result<()> {
    match cmd.value {
        Some(theme) => {
            storage.set_theme(theme)?;
            println!("Theme set to {theme}");
        }
        None => println!("{}", storage.theme()?),
    }
    Ok(())
}

fn handle_status(config: &Config, storage: &Storage, json: bool) -> Result<()> {
    let stats = storage.stats()?;
    let current = match storage.current_meeting()? {
        Some(id) => storage.get_meeting(&id)?,
        None => None,
    };
    let theme = storage.theme()?;
    let app_state = storage.app_state()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
            "current_meeting": current,
            "theme": theme,
            "app_state": app_state,
            "autosave": config.autosave,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("meetkeeper status");
    println!("-----------------");
    println!("Database:        {}", storage.path().display());
    println!("Size:            {} bytes", stats.db_size_bytes);
    println!("Meetings:        {}", stats.total_meetings);
    println!("Note blocks:     {}", stats.total_blocks);
    println!(
        "Tasks:           {} ({} open)",
        stats.total_tasks, stats.open_tasks
    );
    match &current {
        Some(meeting) => println!(
            "Current meeting: {} ({})",
            meeting.title,
            short_id(&meeting.id)
        ),
        None => println!("Current meeting: none"),
    }
    println!("Theme:           {theme}");
    println!(
        "Auto-save:       {} every {} ms",
        if config.autosave.enabled { "on" } else { "off" },
        config.autosave.interval_ms
    );
    if let Some(updated) = stats.last_updated {
        println!("Last change:     {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Auto-save]");
                println!("  Enabled:            {}", config.autosave.enabled);
                println!("  Interval (ms):      {}", config.autosave.interval_ms);
                println!();
                println!("[Extraction]");
                println!("  Enabled:            {}", config.extraction.enabled);
                println!("  Delay (ms):         {}", config.extraction.delay_ms);
                println!(
                    "  Length bounds:      {}..={}",
                    config.extraction.min_length, config.extraction.max_length
                );
                println!(
                    "  Custom patterns:    {}",
                    config.extraction.custom_patterns.len()
                );
                println!();
                println!("[Watch]");
                println!("  Poll interval (ms): {}", config.watch.poll_interval_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
