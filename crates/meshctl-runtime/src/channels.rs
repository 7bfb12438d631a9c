//! Backend inbox
//!
//! UI commands and collaborator events share one ordered, unbounded inbox so
//! that every input is serialized through the backend task. Commands carry a
//! oneshot reply channel.

use crate::logic::BackendStats;
use crate::notifier::Subscription;
use meshctl_core::{ConnectionState, Event, EventSink, MeshResult, Prefs, PrefsEdit, ProfileId};
use tokio::sync::{mpsc, oneshot};

/// Reply channel of a fallible command
pub type Reply<T> = oneshot::Sender<MeshResult<T>>;

// ----------------------------------------------------------------------------
// Command: UI → Backend
// ----------------------------------------------------------------------------

/// Commands sent from user interfaces to the backend task
#[derive(Debug)]
pub enum Command {
    Start { reply: Reply<()> },
    EditPrefs { edit: PrefsEdit, reply: Reply<Prefs> },
    StartLoginInteractive { reply: Reply<()> },
    Logout { reply: Reply<()> },
    NewProfile { reply: Reply<ProfileId> },
    SwitchProfile { id: ProfileId, reply: Reply<()> },
    Subscribe { reply: oneshot::Sender<Subscription> },
    Unsubscribe,
    GetState { reply: oneshot::Sender<ConnectionState> },
    /// Current preferences, redacted
    GetPrefs { reply: oneshot::Sender<Prefs> },
    GetEngineBlocked { reply: oneshot::Sender<bool> },
    GetStats { reply: oneshot::Sender<BackendStats> },
    Shutdown { reply: oneshot::Sender<()> },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::EditPrefs { .. } => "edit-prefs",
            Command::StartLoginInteractive { .. } => "start-login-interactive",
            Command::Logout { .. } => "logout",
            Command::NewProfile { .. } => "new-profile",
            Command::SwitchProfile { .. } => "switch-profile",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe => "unsubscribe",
            Command::GetState { .. } => "get-state",
            Command::GetPrefs { .. } => "get-prefs",
            Command::GetEngineBlocked { .. } => "get-engine-blocked",
            Command::GetStats { .. } => "get-stats",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}

/// Anything the backend task receives
#[derive(Debug)]
pub enum Inbound {
    Command(Command),
    Event(Event),
}

pub type InboxSender = mpsc::UnboundedSender<Inbound>;
pub type InboxReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Create the backend inbox
pub fn create_inbox() -> (InboxSender, InboxReceiver) {
    mpsc::unbounded_channel()
}

/// Event sink posting into the inbox without keeping it open
///
/// Once every handle is dropped the inbox closes and the task ends, even if
/// a collaborator still holds the sink.
pub fn inbox_event_sink(inbox: &InboxSender) -> EventSink {
    let weak = inbox.downgrade();
    EventSink::new(move |event| {
        if let Some(inbox) = weak.upgrade() {
            let _ = inbox.send(Inbound::Event(event));
        }
    })
}
