pub mod atomic;
pub mod entity_store;
pub mod errors;
pub mod event_log;
pub mod locks;

pub use atomic::{atomic_write_json, read_json, recover_orphans};
pub use entity_store::StateStore;
pub use errors::{LockHeld, PersistenceError};
pub use event_log::{EventLog, EventRecord};
pub use locks::{LockGuard, LockManager};
