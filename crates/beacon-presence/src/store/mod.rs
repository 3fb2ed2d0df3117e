//! Contract between the engine and the backing realtime store.
//!
//! The engine never talks to a concrete database. It needs a JSON tree with
//! ordered pushes, server-resolved timestamps, a connectivity signal and
//! mutations the server applies on its own once it notices the connection is
//! gone. [`MemoryStore`] provides all of that in-process.

mod memory;
mod path;


use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_common::{RecordId, StoreError};
use serde_json::Value;
use tokio::sync::watch;

pub use memory::MemoryStore;
pub use path::StorePath;

/// Key of the placeholder object the store swaps for its commit time.
pub const SERVER_VALUE_KEY: &str = ".sv";

/// Placeholder resolved to the store's clock when the write commits.
pub fn server_timestamp() -> Value {
    let mut placeholder = serde_json::Map::new();
    placeholder.insert(SERVER_VALUE_KEY.to_string(), Value::from("timestamp"));
    Value::Object(placeholder)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.len() == 1 && obj.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some("timestamp")
    })
}

/// Latest connectivity state of this client.
///
/// `generation` increments every time a new connection is established, so a
/// watcher that only sees the newest value can still tell a reconnect apart
/// from an unchanged connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
    pub connected: bool,
    pub generation: u64,
}

/// A write the store applies by itself once the connection is lost.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set { path: StorePath, value: Value },
    Remove { path: StorePath },
}

impl Mutation {
    pub fn path(&self) -> &StorePath {
        match self {
            Mutation::Set { path, .. } | Mutation::Remove { path } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisconnectId(pub u64);

impl fmt::Display for DisconnectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "od-{}", self.0)
    }
}

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Subscribe to this client's connectivity.
    fn connectivity(&self) -> watch::Receiver<Connectivity>;

    /// Append `value` under `parent` with a fresh time-ordered key.
    async fn push(&self, parent: &StorePath, value: Value) -> Result<RecordId, StoreError>;

    /// Replace the value at `path`. `Null` removes it.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Delete the value (or subtree) at `path`. Missing paths are not an error.
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Direct children of `parent`, ordered by key.
    async fn children(&self, parent: &StorePath) -> Result<Vec<(String, Value)>, StoreError>;

    /// Children of `parent` whose numeric `child` field lies in `[start, end]`,
    /// ordered by that field and then by key.
    async fn query_range(
        &self,
        parent: &StorePath,
        child: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Children of `parent` whose `child` field equals `value`, ordered by key.
    async fn query_equal(
        &self,
        parent: &StorePath,
        child: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Register `mutation` to run when the store detects this connection is gone.
    async fn on_disconnect(&self, mutation: Mutation) -> Result<DisconnectId, StoreError>;

    /// Cancel a registration. Returns `false` when it already ran or was
    /// never known to the store.
    async fn cancel_on_disconnect(&self, id: DisconnectId) -> Result<bool, StoreError>;
}

/// A registered disconnect-triggered mutation the caller can still cancel.
///
/// Dropping the guard leaves the registration in place, which is what a
/// crashed client looks like to the store.
pub struct DisconnectGuard {
    store: Arc<dyn StoreClient>,
    id: DisconnectId,
    path: StorePath,
}

impl DisconnectGuard {
    pub async fn register(
        store: &Arc<dyn StoreClient>,
        mutation: Mutation,
    ) -> Result<Self, StoreError> {
        let path = mutation.path().clone();
        let id = store.on_disconnect(mutation).await?;
        Ok(Self {
            store: Arc::clone(store),
            id,
            path,
        })
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// `true` if the mutation was still pending and will now never run.
    pub async fn cancel(self) -> Result<bool, StoreError> {
        self.store.cancel_on_disconnect(self.id).await
    }
}

impl fmt::Debug for DisconnectGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectGuard")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
