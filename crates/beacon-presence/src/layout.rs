//! Where the engine's records live in the store tree.

use beacon_common::RecordId;
use beacon_config::StoreConfig;

use crate::store::StorePath;

/// Child of a session record holding the commit time of its creation.
pub const BEGAN: &str = "began";
/// Child of a session record holding the commit time of its close.
pub const ENDED: &str = "ended";
/// Child of a session record naming its owner.
pub const OWNER: &str = "user";
/// Child of a user node pointing at that user's open session.
pub const CURRENT_SESSION: &str = "current_session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    sessions: StorePath,
    presence: StorePath,
    users: StorePath,
}

impl StoreLayout {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            sessions: StorePath::parse(&config.sessions_path),
            presence: StorePath::parse(&config.presence_path),
            users: StorePath::parse(&config.users_path),
        }
    }

    pub fn sessions(&self) -> &StorePath {
        &self.sessions
    }

    pub fn session(&self, id: &RecordId) -> StorePath {
        self.sessions.record(id)
    }

    pub fn session_ended(&self, id: &RecordId) -> StorePath {
        self.session(id).child(ENDED)
    }

    pub fn presence(&self) -> &StorePath {
        &self.presence
    }

    pub fn presence_entry(&self, uid: &str) -> StorePath {
        self.presence.child(uid)
    }

    pub fn current_session(&self, uid: &str) -> StorePath {
        self.users.child(uid).child(CURRENT_SESSION)
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}
