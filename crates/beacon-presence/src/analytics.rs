//! Read-side queries over session records.

use std::sync::Arc;

use beacon_common::{Clock, Result, Timestamp};
use serde_json::Value;
use tracing::{debug, info};

use crate::layout::{StoreLayout, ENDED, OWNER};
use crate::session::Session;
use crate::store::StoreClient;

pub struct SessionAnalytics {
    store: Arc<dyn StoreClient>,
    layout: StoreLayout,
    clock: Arc<dyn Clock>,
}

impl SessionAnalytics {
    pub fn new(store: Arc<dyn StoreClient>, layout: StoreLayout, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            layout,
            clock,
        }
    }

    /// Sessions that ended within `[start, end]`, both bounds inclusive.
    pub async fn count_between(&self, start: Timestamp, end: Timestamp) -> Result<usize> {
        let rows = self
            .store
            .query_range(
                self.layout.sessions(),
                ENDED,
                start.as_millis(),
                end.as_millis(),
            )
            .await?;
        debug!(%start, %end, count = rows.len(), "sessions ended in range");
        Ok(rows.len())
    }

    /// Sessions that ended between `since` and now.
    pub async fn count_since(&self, since: Timestamp) -> Result<usize> {
        self.count_between(since, self.clock.now()).await
    }

    /// Mean length of closed sessions in whole minutes, rounded down.
    ///
    /// `None` when no session has both ends recorded.
    pub async fn average_length(&self) -> Result<Option<i64>> {
        let lengths: Vec<f64> = self
            .all_sessions()
            .await?
            .iter()
            .filter_map(Session::length_minutes)
            .collect();
        if lengths.is_empty() {
            return Ok(None);
        }
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        Ok(Some(mean.floor() as i64))
    }

    /// Delete every session record owned by `uid`. Presence and the
    /// current-session pointer are not touched.
    pub async fn remove_all_for_user(&self, uid: &str) -> Result<usize> {
        let rows = self.owned_by(uid).await?;
        for (key, _) in &rows {
            self.store.remove(&self.layout.sessions().child(key)).await?;
        }
        info!(uid = %uid, removed = rows.len(), "removed sessions for user");
        Ok(rows.len())
    }

    /// Parsed sessions owned by `uid`, oldest first.
    pub async fn sessions_for_user(&self, uid: &str) -> Result<Vec<Session>> {
        Ok(parse_all(self.owned_by(uid).await?))
    }

    /// Number of session records, including malformed ones.
    pub async fn total_sessions(&self) -> Result<usize> {
        Ok(self.store.children(self.layout.sessions()).await?.len())
    }

    async fn all_sessions(&self) -> Result<Vec<Session>> {
        Ok(parse_all(self.store.children(self.layout.sessions()).await?))
    }

    async fn owned_by(&self, uid: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .store
            .query_equal(self.layout.sessions(), OWNER, &Value::from(uid))
            .await?)
    }
}

fn parse_all(rows: Vec<(String, Value)>) -> Vec<Session> {
    rows.into_iter()
        .filter_map(|(key, value)| {
            let session = Session::from_record(&key, &value);
            if session.is_none() {
                debug!(key = %key, "skipping malformed session record");
            }
            session
        })
        .collect()
}
