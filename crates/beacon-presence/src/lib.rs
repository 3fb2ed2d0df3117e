//! Session and presence tracking on top of a realtime JSON store.
//!
//! While a user is signed in and this client is connected, the engine keeps
//! exactly one open session record for them and a `true` flag under the
//! presence path. Both are cleaned up either explicitly on sign-out or, if
//! the client simply vanishes, by disconnect-triggered mutations the store
//! applies on its own.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use beacon_common::SystemClock;
//! use beacon_config::BeaconConfig;
//! use beacon_presence::{AuthEvent, MemoryStore, PresenceEngine};
//!
//! # async fn demo() -> beacon_common::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let store = MemoryStore::new(clock.clone());
//! let engine = PresenceEngine::new(Arc::new(store.clone()), clock, &BeaconConfig::default());
//!
//! let mut coordinator = engine.coordinator();
//! coordinator.handle(AuthEvent::signed_in("alice")).await?;
//! store.connect();
//! // ...
//! coordinator.handle(AuthEvent::signed_out("alice")).await?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod auth;
pub mod engine;
pub mod layout;
pub mod presence_index;
pub mod recorder;
pub mod session;
pub mod store;
pub mod watcher;
pub mod worker;

pub use analytics::SessionAnalytics;
pub use auth::{AuthBindingCoordinator, AuthEvent};
pub use engine::PresenceEngine;
pub use layout::StoreLayout;
pub use presence_index::PresenceIndex;
pub use recorder::{SessionHandle, SessionRecorder};
pub use session::Session;
pub use store::{
    server_timestamp, Connectivity, DisconnectGuard, DisconnectId, MemoryStore, Mutation,
    StoreClient, StorePath,
};
pub use watcher::ConnectivityWatcher;
pub use worker::UidWorker;
