use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::trace;

use crate::entry::CacheEntry;
use crate::store::CacheStore;

type EntryKey = (String, String);

/// In-memory cache store.
///
/// Map entries sit behind one `RwLock`, which makes every single-key
/// operation linearizable. Queue channels are woken through a `Notify` so
/// waiting handlers return as soon as a value arrives.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
  entries: RwLock<HashMap<EntryKey, CacheEntry>>,
  queues: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
  queued: Notify,
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of map entries across all channels.
  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of values waiting in a queue channel.
  pub fn queue_len(&self, channel: &str) -> usize {
    self
      .queues
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(channel)
      .map_or(0, VecDeque::len)
  }

  fn pop(&self, channel: &str) -> Option<serde_json::Value> {
    self
      .queues
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get_mut(channel)
      .and_then(VecDeque::pop_front)
  }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
  async fn get(&self, channel: &str, entry: &str) -> Option<CacheEntry> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&(channel.to_string(), entry.to_string()))
      .cloned()
  }

  async fn put(&self, channel: &str, entry: &str, value: serde_json::Value, timestamp: u64) {
    trace!(channel, entry, timestamp, "cache_put");
    self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(
        (channel.to_string(), entry.to_string()),
        CacheEntry::new(value, timestamp),
      );
  }

  async fn enqueue(&self, channel: &str, value: serde_json::Value) {
    trace!(channel, "cache_enqueue");
    self
      .queues
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(channel.to_string())
      .or_default()
      .push_back(value);
    self.queued.notify_waiters();
  }

  async fn dequeue(&self, channel: &str) -> Option<serde_json::Value> {
    self.pop(channel)
  }

  async fn peek(&self, channel: &str) -> Option<serde_json::Value> {
    self
      .queues
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(channel)
      .and_then(|queue| queue.front().cloned())
  }

  async fn wait_dequeue(&self, channel: &str, timeout: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      // Register interest before checking so an enqueue between the check
      // and the wait is not missed.
      let notified = self.queued.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      if let Some(value) = self.pop(channel) {
        return Some(value);
      }
      if tokio::time::timeout_at(deadline, notified).await.is_err() {
        return self.pop(channel);
      }
    }
  }
}
