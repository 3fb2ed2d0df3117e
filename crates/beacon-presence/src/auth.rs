//! Binding authentication state to per-user workers.

use std::collections::HashMap;

use beacon_common::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::PresenceEngine;
use crate::worker::UidWorker;

/// A change in a user's authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub uid: String,
    pub signed_in: bool,
}

impl AuthEvent {
    pub fn signed_in(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            signed_in: true,
        }
    }

    pub fn signed_out(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            signed_in: false,
        }
    }
}

/// Starts a worker when a user signs in and stops it when they sign out.
///
/// Each user gets their own worker, so one user's store calls never wait on
/// another's.
pub struct AuthBindingCoordinator {
    engine: PresenceEngine,
    workers: HashMap<String, UidWorker>,
}

impl AuthBindingCoordinator {
    pub fn new(engine: &PresenceEngine) -> Self {
        Self {
            engine: engine.clone(),
            workers: HashMap::new(),
        }
    }

    pub async fn handle(&mut self, event: AuthEvent) -> Result<()> {
        if event.signed_in {
            self.sign_in(event.uid);
            Ok(())
        } else {
            self.sign_out(&event.uid).await
        }
    }

    fn sign_in(&mut self, uid: String) {
        if let Some(worker) = self.workers.get(&uid) {
            if !worker.is_finished() {
                debug!(uid = %uid, "already tracked");
                return;
            }
            debug!(uid = %uid, "previous worker has stopped; replacing it");
        }
        info!(uid = %uid, "signed in");
        let worker = self.engine.spawn_worker(&uid);
        self.workers.insert(uid, worker);
    }

    /// Close the user's session synchronously with the sign-out.
    async fn sign_out(&mut self, uid: &str) -> Result<()> {
        let Some(worker) = self.workers.remove(uid) else {
            debug!(uid = %uid, "sign-out for untracked user");
            return Ok(());
        };
        info!(uid = %uid, "signing out");
        worker.sign_out().await
    }

    /// Apply auth events until the channel closes, then sign everyone out.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AuthEvent>) {
        while let Some(event) = rx.recv().await {
            let uid = event.uid.clone();
            if let Err(e) = self.handle(event).await {
                warn!(uid = %uid, error = %e, "auth event failed");
            }
        }
        self.shutdown().await;
    }

    pub fn is_tracked(&self, uid: &str) -> bool {
        self.workers.contains_key(uid)
    }

    pub fn tracked_uids(&self) -> Vec<String> {
        let mut uids: Vec<String> = self.workers.keys().cloned().collect();
        uids.sort();
        uids
    }

    /// Sign out every tracked user.
    pub async fn shutdown(&mut self) {
        for (uid, worker) in self.workers.drain() {
            if let Err(e) = worker.sign_out().await {
                warn!(uid = %uid, error = %e, "sign-out during shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::store::MemoryStore;
    use beacon_common::{Event, ManualClock, Timestamp};
    use beacon_config::BeaconConfig;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    fn engine() -> (MemoryStore, PresenceEngine) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
        let store = MemoryStore::new(clock.clone());
        let engine = PresenceEngine::new(Arc::new(store.clone()), clock, &BeaconConfig::default());
        (store, engine)
    }

    async fn opened_count(rx: &mut broadcast::Receiver<Event>, want: usize) -> usize {
        let mut seen = 0;
        let wait = async {
            while seen < want {
                match rx.recv().await {
                    Ok(Event::SessionOpened { .. }) => seen += 1,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };
        let _ = timeout(Duration::from_secs(2), wait).await;
        seen
    }

    #[test]
    fn auth_event_constructors() {
        assert!(AuthEvent::signed_in("a").signed_in);
        assert_eq!(AuthEvent::signed_out("a").uid, "a");
        assert!(!AuthEvent::signed_out("a").signed_in);
    }

    #[tokio::test]
    async fn sign_in_is_idempotent() {
        let (store, engine) = engine();
        let mut rx = engine.events().subscribe();
        let mut coordinator = engine.coordinator();
        store.connect();

        coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
        coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
        assert_eq!(opened_count(&mut rx, 1).await, 1);
        assert_eq!(coordinator.tracked_uids(), vec!["alice"]);

        coordinator.handle(AuthEvent::signed_out("alice")).await.unwrap();
        assert!(!coordinator.is_tracked("alice"));
        assert_eq!(engine.analytics().total_sessions().await.unwrap(), 1);
        assert_eq!(engine.presence().count_online().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sign_out_of_untracked_user_is_ok() {
        let (_, engine) = engine();
        let mut coordinator = engine.coordinator();
        coordinator.handle(AuthEvent::signed_out("ghost")).await.unwrap();
    }

    #[tokio::test]
    async fn run_signs_everyone_out_when_channel_closes() {
        let (store, engine) = engine();
        let mut events = engine.events().subscribe();
        store.connect();

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(engine.coordinator().run(rx));
        tx.send(AuthEvent::signed_in("alice")).await.unwrap();
        tx.send(AuthEvent::signed_in("bob")).await.unwrap();
        assert_eq!(opened_count(&mut events, 2).await, 2);

        drop(tx);
        task.await.unwrap();

        assert_eq!(engine.presence().count_online().await.unwrap(), 0);
        let sessions = engine.analytics().sessions_for_user("bob").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].is_open());
    }
}
