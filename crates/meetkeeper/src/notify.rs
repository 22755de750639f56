//! Notification bus.
//!
//! An explicit publish/subscribe channel handed to the components that
//! publish. Each [`Subscription`] is tied to its owner's scope: dropping it
//! unsubscribes. There is no process-wide registry.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError, error::RecvError};
use tracing::{trace, warn};

use crate::extract::Suggestion;
use crate::meeting::Task;

/// Default number of undelivered notifications kept per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A task was stored.
    TaskCreated {
        /// The stored task.
        task: Task,
    },
    /// An existing open task was completed by a checklist item.
    TaskCompleted {
        /// The task, now completed.
        task: Task,
    },
    /// A checklist item completed a task.
    Celebrate {
        /// The meeting the task belongs to.
        meeting_id: String,
        /// The completed task's title.
        title: String,
    },
    /// Extraction found candidate tasks in saved notes.
    SuggestionsReady {
        /// The meeting whose notes were scanned.
        meeting_id: String,
        /// Candidates in extraction order.
        suggestions: Vec<Suggestion>,
    },
    /// Notes were written to the store.
    NotesSaved {
        /// The meeting whose notes were saved.
        meeting_id: String,
        /// Number of stored blocks after the save.
        blocks: usize,
    },
}

/// A cloneable handle for publishing notifications.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Create a bus with the default per-subscriber backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus keeping up to `capacity` undelivered notifications.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber, returning how many there were.
    ///
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, notification: Notification) -> usize {
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("notification published with no subscribers");
                0
            }
        }
    }

    /// Start receiving notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription to a [`NotificationBus`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
    /// Wait for the next notification.
    ///
    /// Returns `None` once every bus handle is gone. A subscriber that falls
    /// behind skips the notifications it missed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next notification if one is waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "notification subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Take every notification currently waiting.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
