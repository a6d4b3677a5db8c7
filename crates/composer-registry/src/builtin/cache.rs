use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use composer_cache::{CacheStore, Clock};
use composer_graph::{Component, PropertyError, SECOND};

use crate::behavior::{Behavior, Branches};
use crate::context::ExecutionContext;
use crate::outcome::{FailureCause, Outcome};
use crate::registry::Services;

use super::invalid_property;

const CHANNEL_NAME: &str = "channelName";
const CHANNEL_TYPE: &str = "channelType";
const CHANNEL_ENTRY_NAME: &str = "channelEntryName";
const MAX_CACHE_AGE: &str = "maxCacheAge";

/// Kind of cache channel a component talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
  /// Keyed entries (the default).
  Map,
  /// FIFO queue; entry names are not used.
  Queue,
}

impl ChannelType {
  fn of(component: &Component) -> Result<Self, PropertyError> {
    match component.str_property(CHANNEL_TYPE)? {
      None => Ok(Self::Map),
      Some(t) if t.is_empty() || t.eq_ignore_ascii_case("map") => Ok(Self::Map),
      Some(t) if t.eq_ignore_ascii_case("queue") => Ok(Self::Queue),
      Some(_) => Err(PropertyError::InvalidType {
        key: CHANNEL_TYPE.to_string(),
        expected: "\"map\" or \"queue\"",
      }),
    }
  }
}

/// Channel coordinates read from a component's properties.
struct Target<'a> {
  channel: &'a str,
  entry: &'a str,
  channel_type: ChannelType,
}

impl<'a> Target<'a> {
  fn of(component: &'a Component) -> Result<Self, PropertyError> {
    let channel = component.require_str(CHANNEL_NAME)?;
    let channel_type = ChannelType::of(component)?;
    let entry = match channel_type {
      ChannelType::Map => component.require_str(CHANNEL_ENTRY_NAME)?,
      ChannelType::Queue => component.str_property(CHANNEL_ENTRY_NAME)?.unwrap_or_default(),
    };
    Ok(Self {
      channel,
      entry,
      channel_type,
    })
  }
}

/// Reads a cache entry, whatever its age.
pub struct GetCache {
  cache: Arc<dyn CacheStore>,
}

impl GetCache {
  pub const TYPE: &'static str = "get-cache";

  pub fn new(services: &Services) -> Self {
    Self {
      cache: services.cache.clone(),
    }
  }
}

#[async_trait]
impl Behavior for GetCache {
  fn validate(&self, component: &Component) -> Result<(), String> {
    Target::of(component).map(|_| ()).map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    _ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let target = match Target::of(component) {
      Ok(t) => t,
      Err(e) => return invalid_property(component, e),
    };

    let found = match target.channel_type {
      ChannelType::Map => self
        .cache
        .get(target.channel, target.entry)
        .await
        .map(|entry| entry.value),
      ChannelType::Queue => self.cache.peek(target.channel).await,
    };

    match found {
      Some(value) => Outcome::next(value),
      None => {
        debug!(channel = target.channel, entry = target.entry, "cache_miss");
        Outcome::Fail(FailureCause::CacheMiss {
          channel: target.channel.to_string(),
          entry: target.entry.to_string(),
        })
      }
    }
  }
}

/// Reads a cache entry only if it is at most `maxCacheAge` ms old.
///
/// Stale or missing entries fail with `CacheStaleOrMissing` so an enclosing
/// fall-back can take over. A component that declares its own `second` wire
/// continues there instead, with its input value.
pub struct GetCacheIfRecent {
  cache: Arc<dyn CacheStore>,
  clock: Arc<dyn Clock>,
}

impl GetCacheIfRecent {
  pub const TYPE: &'static str = "get-cache-if-recent";

  pub fn new(services: &Services) -> Self {
    Self {
      cache: services.cache.clone(),
      clock: services.clock.clone(),
    }
  }
}

#[async_trait]
impl Behavior for GetCacheIfRecent {
  fn validate(&self, component: &Component) -> Result<(), String> {
    let check = || -> Result<(), PropertyError> {
      component.require_str(CHANNEL_NAME)?;
      component.require_str(CHANNEL_ENTRY_NAME)?;
      component.require_u64(MAX_CACHE_AGE)?;
      Ok(())
    };
    check().map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let (channel, entry, max_age) = match (
      component.require_str(CHANNEL_NAME),
      component.require_str(CHANNEL_ENTRY_NAME),
      component.require_u64(MAX_CACHE_AGE),
    ) {
      (Ok(c), Ok(e), Ok(m)) => (c, e, m),
      (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return invalid_property(component, e),
    };

    let now = self.clock.now_millis();
    let cached = self.cache.get(channel, entry).await;

    if let Some(cached) = &cached {
      if cached.is_fresh(now, max_age) {
        return Outcome::next(cached.value.clone());
      }
    }

    let age_ms = cached.as_ref().map(|c| c.age(now));
    debug!(
      run_id = %ctx.run_id(),
      channel,
      entry,
      age_ms = ?age_ms,
      max_age,
      "cache_stale_or_missing"
    );

    if component.has_wire(SECOND) {
      return Outcome::Continue(SECOND.to_string(), ctx.value().clone());
    }

    Outcome::Fail(FailureCause::CacheStaleOrMissing {
      channel: channel.to_string(),
      entry: entry.to_string(),
      age_ms,
    })
  }
}

/// Writes the current value to the cache and passes it through.
pub struct StoreCache {
  cache: Arc<dyn CacheStore>,
  clock: Arc<dyn Clock>,
}

impl StoreCache {
  pub const TYPE: &'static str = "store-cache";

  pub fn new(services: &Services) -> Self {
    Self {
      cache: services.cache.clone(),
      clock: services.clock.clone(),
    }
  }
}

#[async_trait]
impl Behavior for StoreCache {
  fn validate(&self, component: &Component) -> Result<(), String> {
    Target::of(component).map(|_| ()).map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let target = match Target::of(component) {
      Ok(t) => t,
      Err(e) => return invalid_property(component, e),
    };
    let value = ctx.value().clone();

    match target.channel_type {
      ChannelType::Map => {
        let now = self.clock.now_millis();
        self
          .cache
          .put(target.channel, target.entry, value.clone(), now)
          .await;
      }
      ChannelType::Queue => self.cache.enqueue(target.channel, value.clone()).await,
    }

    Outcome::next(value)
  }
}
