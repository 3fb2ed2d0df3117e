//! In-process store implementing the full [`StoreClient`] contract.
//!
//! Used by the tests and the simulator. Writes are accepted while the
//! connection is down (the realtime client would queue them locally); only
//! [`MemoryStore::set_available`] and [`MemoryStore::deny_writes`] make them fail.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_common::{Clock, RecordId, RecordIdGenerator, StoreError};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::path::StorePath;
use super::{is_server_timestamp, Connectivity, DisconnectId, Mutation, StoreClient};

struct PendingMutation {
    /// Connection the registration belongs to.
    generation: u64,
    mutation: Mutation,
}

struct State {
    root: Value,
    /// Keyed by registration order.
    pending: BTreeMap<DisconnectId, PendingMutation>,
    next_disconnect: u64,
    denied: Vec<StorePath>,
    available: bool,
}

struct Inner {
    clock: Arc<dyn Clock>,
    ids: RecordIdGenerator,
    detection_delay: Duration,
    connectivity: watch::Sender<Connectivity>,
    state: Mutex<State>,
}

/// JSON-tree store living in this process.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// A disconnected store whose failure detector reacts instantly.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_detection_delay(clock, Duration::ZERO)
    }

    /// A disconnected store that applies disconnect mutations `delay` after
    /// the connection drops.
    pub fn with_detection_delay(clock: Arc<dyn Clock>, delay: Duration) -> Self {
        let (connectivity, _) = watch::channel(Connectivity::default());
        Self {
            inner: Arc::new(Inner {
                clock,
                ids: RecordIdGenerator::new(),
                detection_delay: delay,
                connectivity,
                state: Mutex::new(State {
                    root: Value::Object(Map::new()),
                    pending: BTreeMap::new(),
                    next_disconnect: 1,
                    denied: Vec::new(),
                    available: true,
                }),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connectivity.borrow().connected
    }

    /// Establish a new connection. No-op when already connected.
    pub fn connect(&self) -> Connectivity {
        let changed = self.inner.connectivity.send_if_modified(|state| {
            if state.connected {
                return false;
            }
            state.connected = true;
            state.generation += 1;
            true
        });
        let state = *self.inner.connectivity.borrow();
        if changed {
            info!(generation = state.generation, "store connection established");
        }
        state
    }

    /// Lose the current connection. The store then applies every mutation
    /// registered on it, in registration order, after the detection delay.
    pub async fn drop_connection(&self) {
        let mut lost = None;
        self.inner.connectivity.send_if_modified(|state| {
            if !state.connected {
                return false;
            }
            state.connected = false;
            lost = Some(state.generation);
            true
        });
        let Some(generation) = lost else {
            return;
        };
        info!(generation, "store connection lost");

        if self.inner.detection_delay.is_zero() {
            self.inner.fire_pending(generation).await;
        } else {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.detection_delay).await;
                inner.fire_pending(generation).await;
            });
        }
    }

    /// Reject writes under `prefix` with a permission error.
    pub async fn deny_writes(&self, prefix: StorePath) {
        self.inner.state.lock().await.denied.push(prefix);
    }

    pub async fn allow_writes(&self, prefix: &StorePath) {
        self.inner.state.lock().await.denied.retain(|p| p != prefix);
    }

    /// While unavailable every operation fails with a transient error.
    pub async fn set_available(&self, available: bool) {
        self.inner.state.lock().await.available = available;
    }

    /// Copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.inner.state.lock().await.root.clone()
    }

    pub async fn pending_disconnects(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }
}

impl Inner {
    fn now_millis(&self) -> i64 {
        self.clock.now().as_millis()
    }

    fn check_available(state: &State, path: &StorePath) -> Result<(), StoreError> {
        if state.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{path}: store unreachable")))
        }
    }

    fn check_write(state: &State, path: &StorePath) -> Result<(), StoreError> {
        path.validate()?;
        if path.is_root() {
            return Err(StoreError::InvalidPath("cannot write the root".into()));
        }
        Self::check_available(state, path)?;
        if state.denied.iter().any(|prefix| path.starts_with(prefix)) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn check_read(state: &State, path: &StorePath) -> Result<(), StoreError> {
        path.validate()?;
        Self::check_available(state, path)
    }

    async fn fire_pending(&self, generation: u64) {
        let mut state = self.state.lock().await;
        let due: Vec<DisconnectId> = state
            .pending
            .iter()
            .filter(|(_, p)| p.generation == generation)
            .map(|(id, _)| *id)
            .collect();
        let now = self.now_millis();
        for id in due {
            if let Some(pending) = state.pending.remove(&id) {
                debug!(id = %id, path = %pending.mutation.path(), "applying disconnect mutation");
                apply(&mut state.root, pending.mutation, now);
            }
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.inner.connectivity.subscribe()
    }

    async fn push(&self, parent: &StorePath, value: Value) -> Result<RecordId, StoreError> {
        let mut state = self.inner.state.lock().await;
        Inner::check_write(&state, parent)?;
        let id = self.inner.ids.next(self.inner.clock.now());
        let path = parent.record(&id);
        write_value(&mut state.root, &path, resolve(value, self.inner.now_millis()));
        debug!(path = %path, "push");
        Ok(id)
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        Inner::check_write(&state, path)?;
        write_value(&mut state.root, path, resolve(value, self.inner.now_millis()));
        debug!(path = %path, "set");
        Ok(())
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let state = self.inner.state.lock().await;
        Inner::check_read(&state, path)?;
        Ok(read_at(&state.root, path)
            .filter(|v| !is_empty(v))
            .cloned())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        Inner::check_write(&state, path)?;
        remove_value(&mut state.root, path);
        debug!(path = %path, "remove");
        Ok(())
    }

    async fn children(&self, parent: &StorePath) -> Result<Vec<(String, Value)>, StoreError> {
        let state = self.inner.state.lock().await;
        Inner::check_read(&state, parent)?;
        Ok(children_of(&state.root, parent))
    }

    async fn query_range(
        &self,
        parent: &StorePath,
        child: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let state = self.inner.state.lock().await;
        Inner::check_read(&state, parent)?;
        let mut rows: Vec<(i64, String, Value)> = children_of(&state.root, parent)
            .into_iter()
            .filter_map(|(key, value)| {
                let n = value.get(child).and_then(Value::as_i64)?;
                (start..=end).contains(&n).then_some((n, key, value))
            })
            .collect();
        rows.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        Ok(rows.into_iter().map(|(_, key, value)| (key, value)).collect())
    }

    async fn query_equal(
        &self,
        parent: &StorePath,
        child: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let state = self.inner.state.lock().await;
        Inner::check_read(&state, parent)?;
        Ok(children_of(&state.root, parent)
            .into_iter()
            .filter(|(_, v)| v.get(child) == Some(value))
            .collect())
    }

    async fn on_disconnect(&self, mutation: Mutation) -> Result<DisconnectId, StoreError> {
        let mut state = self.inner.state.lock().await;
        Inner::check_write(&state, mutation.path())?;
        let connectivity = *self.inner.connectivity.borrow();
        // Registered while offline: attached to the next connection.
        let generation = if connectivity.connected {
            connectivity.generation
        } else {
            connectivity.generation + 1
        };
        let id = DisconnectId(state.next_disconnect);
        state.next_disconnect += 1;
        debug!(id = %id, path = %mutation.path(), generation, "registered disconnect mutation");
        state.pending.insert(
            id,
            PendingMutation {
                generation,
                mutation,
            },
        );
        Ok(id)
    }

    async fn cancel_on_disconnect(&self, id: DisconnectId) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock().await;
        if !state.available {
            return Err(StoreError::Unavailable(format!("cancel {id}: store unreachable")));
        }
        let cancelled = state.pending.remove(&id).is_some();
        debug!(id = %id, cancelled, "cancel disconnect mutation");
        Ok(cancelled)
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Swap every server-timestamp placeholder for `now`.
fn resolve(value: Value, now: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| (key, resolve(v, now)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| resolve(v, now)).collect()),
        other => other,
    }
}

fn apply(root: &mut Value, mutation: Mutation, now: i64) {
    match mutation {
        Mutation::Set { path, value } => write_value(root, &path, resolve(value, now)),
        Mutation::Remove { path } => remove_value(root, &path),
    }
}

fn read_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| node.get(seg.as_str()))
}

fn children_of(root: &Value, parent: &StorePath) -> Vec<(String, Value)> {
    let mut rows: Vec<(String, Value)> = read_at(root, parent)
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn write_value(root: &mut Value, path: &StorePath, value: Value) {
    if is_empty(&value) {
        remove_value(root, path);
    } else {
        write_at(root, path.segments(), value);
    }
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_at(child, rest, value);
    }
}

/// Remove the value at `path` and prune parents left empty.
fn remove_value(root: &mut Value, path: &StorePath) {
    if path.is_root() {
        *root = Value::Object(Map::new());
    } else {
        remove_at(root, path.segments());
    }
}

fn remove_at(node: &mut Value, segments: &[String]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = node else {
        return;
    };
    if rest.is_empty() {
        map.remove(head);
        return;
    }
    let now_empty = match map.get_mut(head) {
        Some(child) => {
            remove_at(child, rest);
            is_empty(child)
        }
        None => false,
    };
    if now_empty {
        map.remove(head);
    }
}
