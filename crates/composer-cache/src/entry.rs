use serde::{Deserialize, Serialize};

/// A cached value and the time (ms since the Unix epoch) it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub value: serde_json::Value,
  pub timestamp: u64,
}

impl CacheEntry {
  pub fn new(value: serde_json::Value, timestamp: u64) -> Self {
    Self { value, timestamp }
  }

  /// Milliseconds elapsed since the write. Zero if `now` is before it.
  pub fn age(&self, now: u64) -> u64 {
    now.saturating_sub(self.timestamp)
  }

  /// Whether the entry is at most `max_age` ms old (inclusive).
  pub fn is_fresh(&self, now: u64, max_age: u64) -> bool {
    self.age(now) <= max_age
  }
}
