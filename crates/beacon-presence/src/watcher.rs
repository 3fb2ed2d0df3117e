//! Transition-level view of the store's connectivity signal.

use tokio::sync::watch;

use crate::store::Connectivity;

/// Yields the connectivity state once on subscribe and then on every
/// transition. Only the newest state is kept; a reconnect is still reported
/// when the intermediate drop was never observed, because the connection
/// generation changed.
pub struct ConnectivityWatcher {
    rx: watch::Receiver<Connectivity>,
    last: Option<Connectivity>,
}

impl ConnectivityWatcher {
    pub fn new(rx: watch::Receiver<Connectivity>) -> Self {
        Self { rx, last: None }
    }

    /// Next state to act on, or `None` once the signal is gone.
    ///
    /// Cancel-safe: nothing is consumed across an await point.
    pub async fn next(&mut self) -> Option<Connectivity> {
        if self.last.is_none() {
            let state = *self.rx.borrow_and_update();
            self.last = Some(state);
            return Some(state);
        }
        loop {
            self.rx.changed().await.ok()?;
            let state = *self.rx.borrow_and_update();
            if self.is_transition(state) {
                self.last = Some(state);
                return Some(state);
            }
        }
    }

    fn is_transition(&self, state: Connectivity) -> bool {
        match self.last {
            None => true,
            Some(prev) => {
                prev.connected != state.connected
                    || (state.connected && prev.generation != state.generation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state(connected: bool, generation: u64) -> Connectivity {
        Connectivity {
            connected,
            generation,
        }
    }

    #[tokio::test]
    async fn yields_current_value_immediately() {
        let (_tx, rx) = watch::channel(state(true, 3));
        let mut watcher = ConnectivityWatcher::new(rx);
        assert_eq!(watcher.next().await, Some(state(true, 3)));
    }

    #[tokio::test]
    async fn yields_each_transition() {
        let (tx, rx) = watch::channel(state(false, 0));
        let mut watcher = ConnectivityWatcher::new(rx);
        assert_eq!(watcher.next().await, Some(state(false, 0)));

        tx.send(state(true, 1)).unwrap();
        assert_eq!(watcher.next().await, Some(state(true, 1)));

        tx.send(state(false, 1)).unwrap();
        assert_eq!(watcher.next().await, Some(state(false, 1)));
    }

    #[tokio::test]
    async fn coalesced_reconnect_is_still_reported() {
        let (tx, rx) = watch::channel(state(true, 1));
        let mut watcher = ConnectivityWatcher::new(rx);
        watcher.next().await;

        tx.send(state(false, 1)).unwrap();
        tx.send(state(true, 2)).unwrap();
        assert_eq!(watcher.next().await, Some(state(true, 2)));
    }

    #[tokio::test]
    async fn identical_values_are_not_transitions() {
        let (tx, rx) = watch::channel(state(true, 1));
        let mut watcher = ConnectivityWatcher::new(rx);
        watcher.next().await;

        tx.send(state(true, 1)).unwrap();
        let next = tokio::time::timeout(Duration::from_millis(50), watcher.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(state(false, 0));
        let mut watcher = ConnectivityWatcher::new(rx);
        watcher.next().await;
        drop(tx);
        assert_eq!(watcher.next().await, None);
    }
}
