//! Backend Logic Module
//!
//! The backend task implementation split into focused components:
//! - `state`: backend state, session lifecycle and statistics
//! - `handlers`: command and event handlers
//! - `task`: the `BackendTask` loop that serializes every input
//!
//! All backend state is owned by a single task. UI commands and collaborator
//! events arrive on one inbox and are handled one at a time, so each input
//! observes the effects of every earlier one and notifications come out in
//! the order they were produced.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::CommandHandlers;
pub use state::{BackendState, BackendStats, Collaborators, SessionHandle};
pub use task::BackendTask;
