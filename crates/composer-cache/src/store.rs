use std::time::Duration;

use async_trait::async_trait;

use crate::entry::CacheEntry;

/// Upper bound between two polls in the default [`CacheStore::wait_dequeue`].
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cache storage shared by all runs.
///
/// Operations on a single `(channel, entry)` key must be linearizable: a
/// reader sees either the old or the new entry, never a mix. Nothing is
/// required across keys.
///
/// This trait is async to support networked backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Read an entry regardless of its age.
  async fn get(&self, channel: &str, entry: &str) -> Option<CacheEntry>;

  /// Create or overwrite an entry.
  async fn put(&self, channel: &str, entry: &str, value: serde_json::Value, timestamp: u64);

  /// Append a value to a queue channel.
  async fn enqueue(&self, channel: &str, value: serde_json::Value);

  /// Remove and return the head of a queue channel.
  async fn dequeue(&self, channel: &str) -> Option<serde_json::Value>;

  /// Return the head of a queue channel without removing it.
  async fn peek(&self, channel: &str) -> Option<serde_json::Value>;

  /// Dequeue, waiting at most `timeout` for a value to show up.
  ///
  /// The default implementation polls every [`QUEUE_POLL_INTERVAL`]; stores
  /// that can signal arrivals should override it.
  async fn wait_dequeue(&self, channel: &str, timeout: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      if let Some(value) = self.dequeue(channel).await {
        return Some(value);
      }
      let now = tokio::time::Instant::now();
      if now >= deadline {
        return None;
      }
      tokio::time::sleep(QUEUE_POLL_INTERVAL.min(deadline - now)).await;
    }
  }
}
