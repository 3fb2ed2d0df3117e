//! Opening and closing session records.
//!
//! A session is armed with two disconnect mutations: one stamping `ended`
//! and one removing the user's current-session pointer. Closing cancels both
//! before touching either path, so an explicit close and the store's own
//! cleanup never both write the same record.

use std::sync::Arc;

use beacon_common::{BeaconError, CloseReason, Event, EventBus, RecordId, Result, StoreError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::layout::StoreLayout;
use crate::presence_index::PresenceIndex;
use crate::session::new_record;
use crate::store::{server_timestamp, DisconnectGuard, Mutation, StoreClient};

pub struct SessionRecorder {
    store: Arc<dyn StoreClient>,
    layout: StoreLayout,
    presence: Arc<PresenceIndex>,
    events: EventBus,
}

impl SessionRecorder {
    pub fn new(
        store: Arc<dyn StoreClient>,
        layout: StoreLayout,
        presence: Arc<PresenceIndex>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            layout,
            presence,
            events,
        }
    }

    /// Create a session record for `uid` and arm its disconnect cleanup.
    ///
    /// If creating the record fails nothing is registered. If a later step
    /// fails, whatever was already armed is closed again before the error is
    /// returned.
    pub async fn open(&self, uid: &str) -> Result<SessionHandle> {
        if let Some(existing) = self.current_session(uid).await? {
            let detail = format!("open requested while session {existing} is still current");
            warn!(uid = %uid, session_id = %existing, "{detail}");
            self.events.publish(Event::ConsistencyViolation {
                uid: uid.to_string(),
                detail,
            });
        }

        let session_id = self
            .store
            .push(self.layout.sessions(), new_record(uid))
            .await?;

        let mut pending = Pending::default();
        if let Err(e) = self.arm(uid, &session_id, &mut pending).await {
            warn!(
                uid = %uid,
                session_id = %session_id,
                error = %e,
                "session open failed; rolling back"
            );
            let handle = self.handle(uid, session_id, pending);
            if let Err(close_err) = handle.close().await {
                warn!(uid = %uid, error = %close_err, "rollback after failed open also failed");
            }
            return Err(e);
        }

        info!(uid = %uid, session_id = %session_id, "session opened");
        self.events.publish(Event::SessionOpened {
            uid: uid.to_string(),
            session_id: session_id.clone(),
        });
        Ok(self.handle(uid, session_id, pending))
    }

    /// The session the user's pointer currently names.
    pub async fn current_session(&self, uid: &str) -> Result<Option<RecordId>> {
        let path = self.layout.current_session(uid);
        match self.store.get(&path).await? {
            None => Ok(None),
            Some(Value::String(id)) => Ok(Some(RecordId::from_key(id))),
            Some(other) => Err(StoreError::Malformed(format!(
                "{path}: expected a session id, got {other}"
            ))
            .into()),
        }
    }

    async fn arm(&self, uid: &str, session_id: &RecordId, pending: &mut Pending) -> Result<()> {
        pending.ended = Some(
            DisconnectGuard::register(
                &self.store,
                Mutation::Set {
                    path: self.layout.session_ended(session_id),
                    value: server_timestamp(),
                },
            )
            .await?,
        );

        let pointer = self.layout.current_session(uid);
        pending.pointer = Some(
            DisconnectGuard::register(&self.store, Mutation::Remove { path: pointer.clone() })
                .await?,
        );
        self.store
            .set(&pointer, Value::from(session_id.as_str()))
            .await?;

        pending.presence = Some(self.presence.mark_online(uid).await?);
        Ok(())
    }

    fn handle(&self, uid: &str, session_id: RecordId, pending: Pending) -> SessionHandle {
        SessionHandle {
            uid: uid.to_string(),
            session_id,
            store: Arc::clone(&self.store),
            layout: self.layout.clone(),
            presence: Arc::clone(&self.presence),
            events: self.events.clone(),
            pending: Mutex::new(Some(pending)),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    ended: Option<DisconnectGuard>,
    pointer: Option<DisconnectGuard>,
    presence: Option<DisconnectGuard>,
}

/// Outcome of cancelling one disconnect registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disarm {
    NeverArmed,
    Cancelled,
    AlreadyApplied,
    Failed,
}

async fn disarm(guard: Option<DisconnectGuard>, first_error: &mut Option<BeaconError>) -> Disarm {
    let Some(guard) = guard else {
        return Disarm::NeverArmed;
    };
    match guard.cancel().await {
        Ok(true) => Disarm::Cancelled,
        Ok(false) => Disarm::AlreadyApplied,
        Err(e) => {
            first_error.get_or_insert(e.into());
            Disarm::Failed
        }
    }
}

fn keep_first(first_error: &mut Option<BeaconError>, result: Result<()>) {
    if let Err(e) = result {
        first_error.get_or_insert(e);
    }
}

/// An open session owned by whoever opened it.
///
/// Dropping the handle without calling [`close`](Self::close) leaves the
/// disconnect cleanup armed, so the store still closes the session when the
/// connection goes away.
pub struct SessionHandle {
    uid: String,
    session_id: RecordId,
    store: Arc<dyn StoreClient>,
    layout: StoreLayout,
    presence: Arc<PresenceIndex>,
    events: EventBus,
    pending: Mutex<Option<Pending>>,
}

impl SessionHandle {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn session_id(&self) -> &RecordId {
        &self.session_id
    }

    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.is_none()
    }

    /// Close the session. Calling it again is a no-op.
    ///
    /// Both disconnect registrations are cancelled first. `ended` is written
    /// only if its registration was still pending; otherwise the store
    /// already closed the session and the close is reported as
    /// [`CloseReason::ConnectionLost`]. Every step is attempted and the first
    /// error is returned.
    pub async fn close(&self) -> Result<()> {
        let taken = self.pending.lock().await.take();
        let Some(Pending {
            ended,
            pointer,
            presence,
        }) = taken
        else {
            debug!(uid = %self.uid, session_id = %self.session_id, "session already closed");
            return Ok(());
        };

        let mut first_error = None;
        let ended_state = disarm(ended, &mut first_error).await;
        let pointer_state = disarm(pointer, &mut first_error).await;

        let mut reason = CloseReason::Explicit;
        match ended_state {
            Disarm::NeverArmed | Disarm::Cancelled => {
                keep_first(&mut first_error, self.write_ended().await);
            }
            Disarm::AlreadyApplied => reason = CloseReason::ConnectionLost,
            Disarm::Failed => {}
        }

        if matches!(pointer_state, Disarm::Cancelled | Disarm::AlreadyApplied) {
            keep_first(&mut first_error, self.release_pointer().await);
        }

        keep_first(
            &mut first_error,
            self.presence.mark_offline(&self.uid, presence).await,
        );

        match first_error {
            None => {
                info!(uid = %self.uid, session_id = %self.session_id, ?reason, "session closed");
                self.events.publish(Event::SessionClosed {
                    uid: self.uid.clone(),
                    session_id: self.session_id.clone(),
                    reason,
                });
                Ok(())
            }
            Some(e) => {
                warn!(
                    uid = %self.uid,
                    session_id = %self.session_id,
                    error = %e,
                    "session close incomplete"
                );
                self.events.publish(Event::Error {
                    uid: self.uid.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn write_ended(&self) -> Result<()> {
        if self
            .store
            .get(&self.layout.session(&self.session_id))
            .await?
            .is_none()
        {
            warn!(session_id = %self.session_id, "session record is gone; not stamping end time");
            return Ok(());
        }
        self.store
            .set(&self.layout.session_ended(&self.session_id), server_timestamp())
            .await?;
        Ok(())
    }

    /// Remove the user's pointer if it still names this session.
    async fn release_pointer(&self) -> Result<()> {
        let path = self.layout.current_session(&self.uid);
        let current = self.store.get(&path).await?;
        match current.as_ref().and_then(Value::as_str) {
            Some(id) if id == self.session_id.as_str() => self.store.remove(&path).await?,
            Some(other) => {
                warn!(uid = %self.uid, pointer = %other, "pointer names another session; leaving it");
            }
            None => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("uid", &self.uid)
            .field("session_id", &self.session_id)
            .finish()
    }
}
