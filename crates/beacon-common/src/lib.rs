pub mod errors;
pub mod events;
pub mod id;
pub mod time;

pub use errors::{BeaconError, ConfigError, StoreError};
pub use events::{CloseReason, Event, EventBus};
pub use id::{RecordId, RecordIdGenerator};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};

pub type Result<T> = std::result::Result<T, BeaconError>;
