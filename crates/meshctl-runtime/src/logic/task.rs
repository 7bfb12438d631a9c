//! Backend Task Implementation
//!
//! Contains the main BackendTask struct and its coordination logic.

use super::handlers::CommandHandlers;
use super::state::BackendState;
use crate::channels::{Command, InboxReceiver, Inbound};
use crate::notifier::Notifier;
use meshctl_core::{Event, MeshResult, Notify};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Backend Task
// ----------------------------------------------------------------------------

/// The task that owns all backend state and processes every input in order
pub struct BackendTask {
    state: BackendState,
    inbox: InboxReceiver,
    notifier: Notifier,
    /// Whether the task should continue running
    running: bool,
}

impl BackendTask {
    pub fn new(state: BackendState, inbox: InboxReceiver) -> Self {
        let notifier = Notifier::new(state.config.channels.notify_buffer_size);
        Self {
            state,
            inbox,
            notifier,
            running: true,
        }
    }

    /// Run until shut down or until every handle is gone
    pub async fn run(&mut self) -> MeshResult<()> {
        info!("Backend task starting");

        while self.running {
            tokio::select! {
                inbound = self.inbox.recv() => match inbound {
                    Some(Inbound::Command(command)) => {
                        debug!("Received command: {}", command.kind());
                        self.process_command(command).await;
                    }
                    Some(Inbound::Event(event)) => {
                        debug!("Received event: {}", event.kind());
                        self.process_event(event);
                    }
                    None => {
                        info!("All backend handles dropped, shutting down");
                        break;
                    }
                },

                // Only ready while notifications wait for subscriber queue space.
                _ = self.notifier.deliver_pending() => {}
            }
        }

        if self.notifier.pending() > 0 {
            debug!("Dropping {} undelivered notification(s)", self.notifier.pending());
        }
        self.state.discard_session();
        info!("Backend task stopped");
        Ok(())
    }

    async fn process_command(&mut self, command: Command) {
        self.state.stats.commands_processed += 1;
        let mut notes = Vec::new();

        match command {
            Command::Start { reply } => {
                let result = CommandHandlers::handle_start(&mut self.state, &mut notes);
                self.finish(notes, reply, result);
            }
            Command::EditPrefs { edit, reply } => {
                let result = CommandHandlers::handle_edit_prefs(&mut self.state, edit, &mut notes);
                self.finish(notes, reply, result);
            }
            Command::StartLoginInteractive { reply } => {
                let result = CommandHandlers::handle_start_login_interactive(&mut self.state, &mut notes);
                self.finish(notes, reply, result);
            }
            Command::Logout { reply } => {
                let result = CommandHandlers::handle_logout(&mut self.state, &mut notes).await;
                self.finish(notes, reply, result);
            }
            Command::NewProfile { reply } => {
                let result = CommandHandlers::handle_new_profile(&mut self.state, &mut notes);
                self.finish(notes, reply, result);
            }
            Command::SwitchProfile { id, reply } => {
                let result = CommandHandlers::handle_switch_profile(&mut self.state, id, &mut notes);
                self.finish(notes, reply, result);
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.notifier.subscribe());
            }
            Command::Unsubscribe => self.notifier.unsubscribe(),
            Command::GetState { reply } => {
                let _ = reply.send(self.state.state);
            }
            Command::GetPrefs { reply } => {
                let _ = reply.send(self.state.prefs().redacted());
            }
            Command::GetEngineBlocked { reply } => {
                let _ = reply.send(self.state.engine_blocked);
            }
            Command::GetStats { reply } => {
                let _ = reply.send(self.state.stats.clone());
            }
            Command::Shutdown { reply } => {
                info!("Shutdown requested");
                self.running = false;
                let _ = reply.send(());
            }
        }
    }

    fn process_event(&mut self, event: Event) {
        self.state.stats.events_processed += 1;
        let mut notes = Vec::new();

        let result = match event {
            Event::ControlStatus { generation, status } => {
                CommandHandlers::handle_control_status(&mut self.state, generation, status, &mut notes)
            }
            Event::EngineStatus(status) => {
                CommandHandlers::handle_engine_status(&mut self.state, status, &mut notes);
                Ok(())
            }
            Event::NetInfo(netinfo) => {
                CommandHandlers::handle_netinfo(&mut self.state, netinfo);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Error processing event: {}", e);
            notes.push(Notify::error(e.to_string()));
        }
        self.flush(notes);
    }

    /// Queue notifications, then send the command's reply
    fn finish<T>(&mut self, notes: Vec<Notify>, reply: oneshot::Sender<MeshResult<T>>, result: MeshResult<T>) {
        if let Err(e) = &result {
            if e.is_caller_error() {
                debug!("Command rejected: {}", e);
            } else {
                warn!("Command failed: {}", e);
            }
        }
        self.flush(notes);
        if reply.send(result).is_err() {
            debug!("Command caller went away before the reply");
        }
    }

    /// Queue notifications for the subscriber without waiting on it
    fn flush(&mut self, notes: Vec<Notify>) {
        for note in notes {
            debug!("Notify: {}", note.kind());
            if self.notifier.emit(note) {
                self.state.stats.notifications_emitted += 1;
            }
        }
    }
}
