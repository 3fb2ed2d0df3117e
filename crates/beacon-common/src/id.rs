use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::time::Timestamp;

/// The v7 layout keeps 12 bits of `rand_a` for the counter; the top nibble of
/// the first counter byte is overwritten by the version.
const MAX_SEQ: u16 = 0x0FFF;

/// Identifier of a pushed store record.
///
/// Ids are UUIDv7 strings: the leading 48 bits are the store clock's
/// milliseconds, so comparing two ids as strings orders them by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a key read back from the store.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces time-ordered record ids.
///
/// Within one millisecond the v7 counter bytes carry a sequence number, so ids
/// minted by the same generator are strictly increasing even when the clock
/// stands still.
#[derive(Debug, Default)]
pub struct RecordIdGenerator {
    last: Mutex<(u64, u16)>,
}

impl RecordIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now: Timestamp) -> RecordId {
        let millis = u64::try_from(now.as_millis()).unwrap_or(0);
        let (millis, seq) = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            let next = if millis > last.0 {
                (millis, 0)
            } else if last.1 >= MAX_SEQ {
                (last.0 + 1, 0)
            } else {
                (last.0, last.1 + 1)
            };
            *last = next;
            next
        };

        let random = uuid::Uuid::new_v4();
        let mut counter_random = [0u8; 10];
        counter_random[..2].copy_from_slice(&seq.to_be_bytes());
        counter_random[2..].copy_from_slice(&random.as_bytes()[..8]);

        let id = uuid::Builder::from_unix_timestamp_millis(millis, &counter_random).into_uuid();
        RecordId(id.hyphenated().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_v7() {
        let id = RecordIdGenerator::new().next(Timestamp::from_millis(1_700_000_000_000));
        let parsed = uuid::Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn ids_order_by_time() {
        let generator = RecordIdGenerator::new();
        let a = generator.next(Timestamp::from_millis(1_000));
        let b = generator.next(Timestamp::from_millis(2_000));
        assert!(a < b);
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn ids_within_one_millisecond_still_increase() {
        let generator = RecordIdGenerator::new();
        let now = Timestamp::from_millis(5_000);
        let ids: Vec<RecordId> = (0..5_000).map(|_| generator.next(now)).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn clock_going_backwards_does_not_reorder() {
        let generator = RecordIdGenerator::new();
        let a = generator.next(Timestamp::from_millis(9_000));
        let b = generator.next(Timestamp::from_millis(8_000));
        assert!(a < b);
    }

    #[test]
    fn record_id_display_and_key() {
        let id = RecordId::from_key("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn record_id_serialization() {
        let id = RecordIdGenerator::new().next(Timestamp::from_millis(1));
        let json = serde_json::to_string(&id).unwrap();
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
