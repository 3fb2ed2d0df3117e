//! End-to-end session lifecycle against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use beacon_common::{CloseReason, Event, ManualClock, Timestamp};
use beacon_config::BeaconConfig;
use beacon_presence::{AuthEvent, MemoryStore, PresenceEngine, Session};
use tokio::sync::broadcast;
use tokio::time::timeout;

const MINUTE: Duration = Duration::from_secs(60);

struct Harness {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    engine: PresenceEngine,
    events: broadcast::Receiver<Event>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
    let store = MemoryStore::new(clock.clone());
    let engine = PresenceEngine::new(
        Arc::new(store.clone()),
        clock.clone(),
        &BeaconConfig::default(),
    );
    let events = engine.events().subscribe();
    Harness {
        store,
        clock,
        engine,
        events,
    }
}

impl Harness {
    /// Wait for the first event matching `pred`.
    async fn expect(&mut self, what: &str, pred: impl Fn(&Event) -> bool) -> Event {
        let events = &mut self.events;
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return Some(event),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        match timeout(Duration::from_secs(2), wait).await {
            Ok(Some(event)) => event,
            _ => panic!("timed out waiting for {what}"),
        }
    }

    async fn opened(&mut self, uid: &str) -> Event {
        self.expect("session opened", |e| {
            matches!(e, Event::SessionOpened { uid: u, .. } if u == uid)
        })
        .await
    }

    async fn sessions(&self, uid: &str) -> Vec<Session> {
        self.engine.analytics().sessions_for_user(uid).await.unwrap()
    }
}

#[tokio::test]
async fn sign_in_then_connect_opens_session() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();

    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    assert!(h.sessions("alice").await.is_empty());

    h.store.connect();
    h.opened("alice").await;

    let sessions = h.sessions("alice").await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is_open());
    assert!(h.engine.presence().is_online("alice").await.unwrap());
    assert_eq!(
        h.engine.recorder().current_session("alice").await.unwrap(),
        Some(sessions[0].id.clone())
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn connection_loss_lets_store_close_session() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();
    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;

    h.clock.advance(10 * MINUTE);
    h.store.drop_connection().await;

    let sessions = h.sessions("alice").await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].length_minutes(), Some(10.0));
    assert!(!h.engine.presence().is_online("alice").await.unwrap());
    assert_eq!(h.engine.recorder().current_session("alice").await.unwrap(), None);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn reconnect_opens_new_session() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();
    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;

    h.clock.advance(5 * MINUTE);
    h.store.drop_connection().await;
    h.clock.advance(MINUTE);
    h.store.connect();

    let closed = h
        .expect("stale session closed", |e| matches!(e, Event::SessionClosed { .. }))
        .await;
    assert!(matches!(
        closed,
        Event::SessionClosed { reason: CloseReason::ConnectionLost, .. }
    ));
    h.opened("alice").await;

    let sessions = h.sessions("alice").await;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);
    assert!(h.engine.presence().is_online("alice").await.unwrap());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn sign_out_closes_session_before_returning() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();
    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;

    h.clock.advance(3 * MINUTE);
    coordinator.handle(AuthEvent::signed_out("alice")).await.unwrap();

    let sessions = h.sessions("alice").await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].length_minutes(), Some(3.0));
    assert_eq!(h.engine.presence().count_online().await.unwrap(), 0);
    assert_eq!(h.store.pending_disconnects().await, 0);

    // The cancelled cleanup must not stamp a later end time.
    h.clock.advance(30 * MINUTE);
    h.store.drop_connection().await;
    assert_eq!(h.sessions("alice").await[0].length_minutes(), Some(3.0));
}

#[tokio::test]
async fn users_are_tracked_independently() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();
    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;
    coordinator.handle(AuthEvent::signed_in("bob")).await.unwrap();
    h.opened("bob").await;
    assert_eq!(h.engine.presence().count_online().await.unwrap(), 2);

    h.clock.advance(4 * MINUTE);
    coordinator.handle(AuthEvent::signed_out("alice")).await.unwrap();

    assert!(!h.engine.presence().is_online("alice").await.unwrap());
    assert!(h.engine.presence().is_online("bob").await.unwrap());
    assert!(h.sessions("bob").await[0].is_open());
    assert_eq!(h.engine.presence().online_users().await.unwrap(), vec!["bob"]);

    h.clock.advance(4 * MINUTE);
    coordinator.handle(AuthEvent::signed_out("bob")).await.unwrap();

    let analytics = h.engine.analytics();
    assert_eq!(analytics.total_sessions().await.unwrap(), 2);
    assert_eq!(analytics.average_length().await.unwrap(), Some(6));
    assert_eq!(
        analytics
            .count_since(Timestamp::from_millis(1_700_000_000_000))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn sign_in_after_sign_out_starts_fresh() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();

    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;
    coordinator.handle(AuthEvent::signed_out("alice")).await.unwrap();

    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;
    assert_eq!(h.sessions("alice").await.len(), 2);
    assert!(coordinator.is_tracked("alice"));

    coordinator.shutdown().await;
    assert!(h.sessions("alice").await.iter().all(|s| !s.is_open()));
}

#[tokio::test]
async fn removing_history_keeps_live_presence() {
    let mut h = harness();
    let mut coordinator = h.engine.coordinator();
    h.store.connect();
    coordinator.handle(AuthEvent::signed_in("alice")).await.unwrap();
    h.opened("alice").await;

    let removed = h.engine.analytics().remove_all_for_user("alice").await.unwrap();
    assert_eq!(removed, 1);
    assert!(h.engine.presence().is_online("alice").await.unwrap());

    coordinator.handle(AuthEvent::signed_out("alice")).await.unwrap();
    assert!(h.sessions("alice").await.is_empty());
    assert_eq!(h.engine.analytics().total_sessions().await.unwrap(), 0);
}
