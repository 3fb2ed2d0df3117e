//! Wiring of the engine's components around one store client.

use std::sync::Arc;

use beacon_common::{Clock, EventBus};
use beacon_config::BeaconConfig;

use crate::analytics::SessionAnalytics;
use crate::auth::AuthBindingCoordinator;
use crate::layout::StoreLayout;
use crate::presence_index::PresenceIndex;
use crate::recorder::SessionRecorder;
use crate::store::StoreClient;
use crate::watcher::ConnectivityWatcher;
use crate::worker::UidWorker;

/// Shared handles to every component. Cloning is cheap.
#[derive(Clone)]
pub struct PresenceEngine {
    store: Arc<dyn StoreClient>,
    layout: StoreLayout,
    events: EventBus,
    presence: Arc<PresenceIndex>,
    recorder: Arc<SessionRecorder>,
    analytics: Arc<SessionAnalytics>,
    command_buffer: usize,
}

impl PresenceEngine {
    pub fn new(store: Arc<dyn StoreClient>, clock: Arc<dyn Clock>, config: &BeaconConfig) -> Self {
        let layout = StoreLayout::from_config(&config.store);
        let events = EventBus::new(config.tracker.event_capacity as usize);
        let presence = Arc::new(PresenceIndex::new(
            Arc::clone(&store),
            layout.clone(),
            events.clone(),
        ));
        let recorder = Arc::new(SessionRecorder::new(
            Arc::clone(&store),
            layout.clone(),
            Arc::clone(&presence),
            events.clone(),
        ));
        let analytics = Arc::new(SessionAnalytics::new(
            Arc::clone(&store),
            layout.clone(),
            clock,
        ));
        Self {
            store,
            layout,
            events,
            presence,
            recorder,
            analytics,
            command_buffer: config.tracker.command_buffer as usize,
        }
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn presence(&self) -> &PresenceIndex {
        &self.presence
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn analytics(&self) -> &SessionAnalytics {
        &self.analytics
    }

    pub fn watch_connectivity(&self) -> ConnectivityWatcher {
        ConnectivityWatcher::new(self.store.connectivity())
    }

    /// Start tracking `uid`: its session follows the store connection until
    /// [`UidWorker::sign_out`].
    pub fn spawn_worker(&self, uid: &str) -> UidWorker {
        UidWorker::spawn(
            uid,
            Arc::clone(&self.recorder),
            self.watch_connectivity(),
            self.events.clone(),
            self.command_buffer,
        )
    }

    pub fn coordinator(&self) -> AuthBindingCoordinator {
        AuthBindingCoordinator::new(self)
    }
}
