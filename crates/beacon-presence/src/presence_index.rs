//! Per-user online flags, removed by the store if this client vanishes.

use std::sync::Arc;

use beacon_common::{Event, EventBus, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::layout::StoreLayout;
use crate::store::{DisconnectGuard, Mutation, StoreClient};

/// Reads and writes presence entries. The disconnect removal armed by
/// [`mark_online`](Self::mark_online) is returned to the caller, which holds
/// it for as long as the user's session is open.
pub struct PresenceIndex {
    store: Arc<dyn StoreClient>,
    layout: StoreLayout,
    events: EventBus,
}

impl PresenceIndex {
    pub fn new(store: Arc<dyn StoreClient>, layout: StoreLayout, events: EventBus) -> Self {
        Self {
            store,
            layout,
            events,
        }
    }

    /// Arm the removal of the user's flag on disconnect, then set it.
    pub async fn mark_online(&self, uid: &str) -> Result<DisconnectGuard> {
        let path = self.layout.presence_entry(uid);
        let guard = DisconnectGuard::register(&self.store, Mutation::Remove { path: path.clone() })
            .await?;
        if let Err(e) = self.store.set(&path, Value::Bool(true)).await {
            if let Err(cancel_err) = guard.cancel().await {
                warn!(uid = %uid, error = %cancel_err, "failed to disarm presence removal");
            }
            return Err(e.into());
        }

        debug!(uid = %uid, "marked online");
        self.events.publish(Event::PresenceChanged {
            uid: uid.to_string(),
            online: true,
        });
        Ok(guard)
    }

    /// Disarm `guard` if one is given, then remove the flag.
    pub async fn mark_offline(&self, uid: &str, guard: Option<DisconnectGuard>) -> Result<()> {
        if let Some(guard) = guard {
            if !guard.cancel().await? {
                debug!(uid = %uid, "presence removal already applied by the store");
            }
        }

        self.store.remove(&self.layout.presence_entry(uid)).await?;

        debug!(uid = %uid, "marked offline");
        self.events.publish(Event::PresenceChanged {
            uid: uid.to_string(),
            online: false,
        });
        Ok(())
    }

    /// Number of presence entries currently in the store.
    pub async fn count_online(&self) -> Result<usize> {
        let count = self.store.children(self.layout.presence()).await?.len();
        debug!(count, "users currently online");
        Ok(count)
    }

    pub async fn is_online(&self, uid: &str) -> Result<bool> {
        let entry = self.store.get(&self.layout.presence_entry(uid)).await?;
        Ok(entry == Some(Value::Bool(true)))
    }

    /// Uids with a presence entry, in key order.
    pub async fn online_users(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .children(self.layout.presence())
            .await?
            .into_iter()
            .map(|(uid, _)| uid)
            .collect())
    }
}
