//! Composer Cache
//!
//! The cache store shared by every run of an application. Records are keyed
//! by `(channel, entry)` and carry the time they were written; freshness is
//! decided by readers, entries are never evicted.
//!
//! Besides keyed map channels the store holds queue channels: FIFO lists of
//! values that producers append to and handlers drain.

mod clock;
mod entry;
mod memory;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use memory::InMemoryCacheStore;
pub use store::{CacheStore, QUEUE_POLL_INTERVAL};
