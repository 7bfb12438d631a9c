//! meshctl Core
//!
//! Domain model of the mesh-VPN control-plane client: preferences, network
//! maps, the derived connection state, the network-map translator, and the
//! interfaces of the collaborators the backend orchestrates (control
//! session, data-plane engine, preferences storage).

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod netmap;
pub mod notify;
pub mod prefs;
pub mod state;
pub mod store;
pub mod translate;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{Event, EventSink};
pub use config::{
    BackendConfig, ChannelConfig, CompatPolicy, LoginFinishedPolicy, AUTH_URL_VALIDITY,
    DEFAULT_CONTROL_URL, DEFAULT_TUNNEL_NAME, LOGOUT_TIMEOUT,
};
pub use control::{
    ControlObserver, ControlSession, ControlSessionFactory, Hostinfo, LoginFlags, NetInfo,
    SessionOptions, Status,
};
pub use engine::{Engine, EngineStatus, EngineStatusSink};
pub use errors::{ControlError, EngineError, MeshError, MeshResult, ParseError, StoreError};
pub use netmap::{NetworkMap, Node, RelayMap, RelayNode, RelayRegion, UserProfile};
pub use notify::Notify;
pub use prefs::{Persist, Prefs, PrefsEdit};
pub use state::{next_state, should_pause, ConnectionState, StateInputs};
pub use store::{MemStore, StateStore};
pub use translate::{
    translate, DataPlaneConfig, DnsConfig, RouterConfig, TranslateOptions, WireGuardConfig,
};
pub use types::{
    DiscoPublicKey, NetworkLockKey, NodeId, NodePrivateKey, NodePublicKey, PrivateLogId,
    ProfileId, StableNodeId, SystemTimeSource, TimeSource, Timestamp, UserId,
};
