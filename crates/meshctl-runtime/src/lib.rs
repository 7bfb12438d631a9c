//! meshctl Backend Runtime
//!
//! This crate contains the backend orchestrator of a mesh-VPN client:
//! - `BackendTask`: the single task that owns all backend state
//! - `BackendBuilder` / `BackendHandle`: wiring and the UI command surface
//! - `ProfileManager`: per-profile preferences in the state store
//! - `Notifier`: the ordered notification stream to one subscriber
//!
//! `meshctl-core` provides the types, the state function and the network-map
//! translator; this crate drives them.

pub mod builder;
pub mod channels;
pub mod logic;
pub mod notifier;
pub mod profiles;

pub use builder::{BackendBuilder, BackendHandle};
pub use channels::{Command, Inbound};
pub use logic::{BackendStats, BackendTask};
pub use notifier::{Notifier, Subscription};
pub use profiles::ProfileManager;

// Re-export core types for convenience
pub use meshctl_core::{
    BackendConfig, CompatPolicy, ConnectionState, LoginFinishedPolicy, MeshError, MeshResult, Notify,
    Prefs, PrefsEdit, ProfileId,
};
