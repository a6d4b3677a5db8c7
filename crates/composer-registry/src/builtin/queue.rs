use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use composer_cache::CacheStore;
use composer_graph::{Component, PropertyError};

use crate::behavior::{Behavior, Branches};
use crate::context::ExecutionContext;
use crate::outcome::{FailureCause, Outcome};
use crate::registry::Services;

use super::invalid_property;

const CACHE_CHANNEL: &str = "cacheChannel";
const CART_ID_KEY: &str = "cartIdKey";
const CART_LINES_KEY: &str = "cartLinesKey";
const TIMEOUT: &str = "timeout";

struct Settings<'a> {
  channel: &'a str,
  id_key: &'a str,
  lines_key: &'a str,
  timeout_ms: u64,
}

impl<'a> Settings<'a> {
  fn of(component: &'a Component) -> Result<Self, PropertyError> {
    Ok(Self {
      channel: component.require_str(CACHE_CHANNEL)?,
      id_key: component.require_str(CART_ID_KEY)?,
      lines_key: component.require_str(CART_LINES_KEY)?,
      timeout_ms: component.require_u64(TIMEOUT)?,
    })
  }

  /// Rebuild a cart from a queued entry: `{idKey: id, linesKey: lines}`.
  /// Entries that are not objects or have no id do not match.
  fn cart_from(&self, entry: &serde_json::Value) -> Option<serde_json::Value> {
    let fields = entry.as_object()?;
    let id = fields.get(self.id_key).filter(|id| !id.is_null())?;
    let lines = fields
      .get(self.lines_key)
      .cloned()
      .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

    let mut cart = serde_json::Map::new();
    cart.insert(self.id_key.to_string(), id.clone());
    cart.insert(self.lines_key.to_string(), lines);
    Some(serde_json::Value::Object(cart))
  }
}

/// Takes the next cart queued on `cacheChannel` and forwards it, giving up
/// with `Timeout` after `timeout` ms.
pub struct CacheQueueHandler {
  cache: Arc<dyn CacheStore>,
}

impl CacheQueueHandler {
  pub const TYPE: &'static str = "cache-queue-handler";

  pub fn new(services: &Services) -> Self {
    Self {
      cache: services.cache.clone(),
    }
  }
}

#[async_trait]
impl Behavior for CacheQueueHandler {
  fn validate(&self, component: &Component) -> Result<(), String> {
    Settings::of(component)
      .map(|_| ())
      .map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let settings = match Settings::of(component) {
      Ok(s) => s,
      Err(e) => return invalid_property(component, e),
    };
    let cancel = ctx.cancellation().clone();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(settings.timeout_ms);
    let timed_out = || {
      Outcome::Fail(FailureCause::Timeout {
        component: component.reference.to_string(),
        after_ms: settings.timeout_ms,
      })
    };

    loop {
      let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
      if remaining.is_zero() {
        return timed_out();
      }

      let queued = tokio::select! {
        queued = self.cache.wait_dequeue(settings.channel, remaining) => queued,
        _ = cancel.cancelled() => return Outcome::Fail(FailureCause::Cancelled),
      };

      let Some(entry) = queued else {
        debug!(run_id = %ctx.run_id(), channel = settings.channel, "queue_wait_expired");
        return timed_out();
      };

      match settings.cart_from(&entry) {
        Some(cart) => return Outcome::next(cart),
        None => warn!(
          run_id = %ctx.run_id(),
          component = %component.reference,
          channel = settings.channel,
          "discarding queued entry without cart id"
        ),
      }
    }
  }
}
