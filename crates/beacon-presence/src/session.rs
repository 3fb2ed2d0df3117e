//! Session records as stored under the sessions path.

use beacon_common::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layout::{BEGAN, OWNER};
use crate::store::server_timestamp;

/// One bounded interval of connectivity for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: RecordId,
    /// `None` for records written without an owner.
    pub owner_uid: Option<String>,
    pub began: Option<Timestamp>,
    pub ended: Option<Timestamp>,
}

/// Wire shape of a session record.
#[derive(Debug, Deserialize)]
struct SessionRecord {
    began: Option<Timestamp>,
    ended: Option<Timestamp>,
    user: Option<String>,
}

impl Session {
    /// Parse a stored record. `None` when it is not an object or a field has
    /// the wrong type. Missing fields are allowed.
    pub fn from_record(key: &str, value: &Value) -> Option<Self> {
        let record: SessionRecord = serde_json::from_value(value.clone()).ok()?;
        Some(Self {
            id: RecordId::from_key(key),
            owner_uid: record.user,
            began: record.began,
            ended: record.ended,
        })
    }

    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }

    /// Length in fractional minutes, when both ends are known.
    pub fn length_minutes(&self) -> Option<f64> {
        Some(self.ended?.minutes_since(self.began?))
    }
}

/// Body written when a session opens.
pub(crate) fn new_record(uid: &str) -> Value {
    let mut record = serde_json::Map::new();
    record.insert(BEGAN.to_string(), server_timestamp());
    record.insert(OWNER.to_string(), Value::from(uid));
    Value::Object(record)
}
