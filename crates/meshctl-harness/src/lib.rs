#![doc = "meshctl Harness\n\nDeterministic collaborators for driving the backend orchestrator in tests:\na scripted control session, a recording engine, a manual clock and\nnetwork-map builders."]

#[cfg(feature = "testing")]
pub mod control;
#[cfg(feature = "testing")]
pub mod engine;
pub mod netmap;
pub mod time;

#[cfg(feature = "testing")]
pub use control::{MockControl, MockControlFactory};
#[cfg(feature = "testing")]
pub use engine::MockEngine;
pub use netmap::{expiring_netmap, test_netmap, test_node, test_user, unauthorized_netmap};
pub use time::MockTimeSource;
