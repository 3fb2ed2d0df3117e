//! One background task per signed-in user.
//!
//! The task owns the user's open session and reacts to connectivity
//! transitions and to sign-out, one at a time. Sign-out is checked before
//! connectivity on every turn, so a pending sign-out is never overtaken by a
//! reconnect.

use std::sync::Arc;

use beacon_common::{BeaconError, Event, EventBus, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::recorder::{SessionHandle, SessionRecorder};
use crate::watcher::ConnectivityWatcher;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum WorkerCommand {
    /// Close the open session, reply, and stop.
    SignOut { done: oneshot::Sender<Result<()>> },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running per-user task.
#[derive(Debug)]
pub struct UidWorker {
    uid: String,
    tx: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

impl UidWorker {
    pub fn spawn(
        uid: impl Into<String>,
        recorder: Arc<SessionRecorder>,
        watcher: ConnectivityWatcher,
        events: EventBus,
        buffer: usize,
    ) -> Self {
        let uid = uid.into();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(run(uid.clone(), recorder, watcher, events, rx));
        debug!(uid = %uid, "worker started");
        Self { uid, tx, task }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Close the user's session (if any) and wait for the task to stop.
    pub async fn sign_out(self) -> Result<()> {
        let (done, reply) = oneshot::channel();
        if self.tx.send(WorkerCommand::SignOut { done }).await.is_err() {
            return Err(BeaconError::Other(format!(
                "worker for {} is not running",
                self.uid
            )));
        }
        let Ok(result) = reply.await else {
            return Err(BeaconError::Other(format!(
                "worker for {} stopped before replying",
                self.uid
            )));
        };
        if let Err(e) = self.task.await {
            warn!(uid = %self.uid, error = %e, "worker task did not finish cleanly");
        }
        result
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task without closing its session. The store's disconnect
    /// cleanup is left to close it.
    pub fn abort(&self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Task loop
// ---------------------------------------------------------------------------

async fn run(
    uid: String,
    recorder: Arc<SessionRecorder>,
    mut watcher: ConnectivityWatcher,
    events: EventBus,
    mut rx: mpsc::Receiver<WorkerCommand>,
) {
    let mut current: Option<SessionHandle> = None;

    loop {
        tokio::select! {
            biased;

            cmd = rx.recv() => match cmd {
                Some(WorkerCommand::SignOut { done }) => {
                    let result = close_session(&uid, current.take()).await;
                    if done.send(result).is_err() {
                        debug!(uid = %uid, "sign-out caller went away");
                    }
                    break;
                }
                None => {
                    debug!(uid = %uid, "worker handle dropped");
                    break;
                }
            },

            state = watcher.next() => match state {
                Some(state) if state.connected => {
                    debug!(uid = %uid, generation = state.generation, "connected");
                    if let Err(e) = close_session(&uid, current.take()).await {
                        warn!(uid = %uid, error = %e, "failed to close stale session");
                    }
                    match recorder.open(&uid).await {
                        Ok(handle) => current = Some(handle),
                        Err(e) => {
                            error!(uid = %uid, error = %e, "failed to open session");
                            events.publish(Event::Error {
                                uid: uid.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
                Some(_) => {
                    debug!(uid = %uid, "connection lost; leaving session to store cleanup");
                }
                None => {
                    debug!(uid = %uid, "connectivity signal closed");
                    break;
                }
            },
        }
    }

    info!(uid = %uid, "worker stopped");
}

async fn close_session(uid: &str, handle: Option<SessionHandle>) -> Result<()> {
    match handle {
        Some(handle) => handle.close().await,
        None => {
            debug!(uid = %uid, "no open session to close");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::layout::StoreLayout;
    use crate::presence_index::PresenceIndex;
    use crate::store::{MemoryStore, StoreClient};
    use beacon_common::{ManualClock, Timestamp};
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    fn spawn(store: &MemoryStore, events: &EventBus) -> UidWorker {
        let client: Arc<dyn StoreClient> = Arc::new(store.clone());
        let layout = StoreLayout::default();
        let presence = Arc::new(PresenceIndex::new(
            Arc::clone(&client),
            layout.clone(),
            events.clone(),
        ));
        let recorder = Arc::new(SessionRecorder::new(
            Arc::clone(&client),
            layout,
            presence,
            events.clone(),
        ));
        let watcher = ConnectivityWatcher::new(client.connectivity());
        UidWorker::spawn("alice", recorder, watcher, events.clone(), 4)
    }

    async fn next_opened(rx: &mut broadcast::Receiver<Event>) -> bool {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(Event::SessionOpened { .. }) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        };
        timeout(Duration::from_secs(2), wait).await.unwrap_or(false)
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(ManualClock::new(Timestamp::from_millis(0))))
    }

    #[tokio::test]
    async fn opens_when_connected_and_closes_on_sign_out() {
        let store = store();
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let worker = spawn(&store, &events);

        store.connect();
        assert!(next_opened(&mut rx).await);

        worker.sign_out().await.unwrap();
        let sessions = store.snapshot().await;
        let record = sessions["sessions"].as_object().unwrap().values().next().unwrap();
        assert!(record.get("ended").is_some());
        assert_eq!(store.pending_disconnects().await, 0);
    }

    #[tokio::test]
    async fn sign_out_without_session_is_ok() {
        let store = store();
        let events = EventBus::new(64);
        let worker = spawn(&store, &events);
        worker.sign_out().await.unwrap();
        assert_eq!(store.snapshot().await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn reconnect_opens_fresh_session() {
        let store = store();
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let worker = spawn(&store, &events);

        store.connect();
        assert!(next_opened(&mut rx).await);
        store.drop_connection().await;
        store.connect();
        assert!(next_opened(&mut rx).await);

        worker.sign_out().await.unwrap();
        let sessions = store.snapshot().await;
        let records = sessions["sessions"].as_object().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.values().all(|r| r.get("ended").is_some()));
    }

    #[tokio::test]
    async fn aborted_worker_rejects_sign_out() {
        let store = store();
        let events = EventBus::new(64);
        let worker = spawn(&store, &events);
        worker.abort();
        tokio::task::yield_now().await;

        let err = worker.sign_out().await.unwrap_err();
        assert!(matches!(err, BeaconError::Other(_)));
    }
}
