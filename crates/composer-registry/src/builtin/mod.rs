//! Built-in component types.

mod cache;
mod erp;
mod flow;
mod queue;
mod testing;

use std::sync::Arc;

use composer_graph::{Component, PropertyError};

use crate::outcome::{FailureCause, Outcome};
use crate::registry::{ComponentTypeRegistry, Services};

pub use cache::{ChannelType, GetCache, GetCacheIfRecent, StoreCache};
pub use erp::ErpCaller;
pub use flow::{ExceptionCatcher, FallBack};
pub use queue::CacheQueueHandler;
pub use testing::{TestEnd, TestEntry};

pub(crate) fn register_all(registry: &mut ComponentTypeRegistry, services: &Services) {
  registry.register(TestEntry::TYPE, Arc::new(TestEntry));
  registry.register(TestEnd::TYPE, Arc::new(TestEnd));
  registry.register(GetCache::TYPE, Arc::new(GetCache::new(services)));
  registry.register(GetCacheIfRecent::TYPE, Arc::new(GetCacheIfRecent::new(services)));
  registry.register(StoreCache::TYPE, Arc::new(StoreCache::new(services)));
  registry.register(FallBack::TYPE, Arc::new(FallBack));
  registry.register(ExceptionCatcher::TYPE, Arc::new(ExceptionCatcher));
  registry.register(CacheQueueHandler::TYPE, Arc::new(CacheQueueHandler::new(services)));
  registry.register(ErpCaller::TYPE, Arc::new(ErpCaller::new(services)));
}

/// Properties are checked at load time, so this only fires for components
/// that bypassed validation.
fn invalid_property(component: &Component, err: PropertyError) -> Outcome {
  Outcome::Fail(FailureCause::InvalidProperty {
    component: component.reference.to_string(),
    message: err.to_string(),
  })
}

fn require_wire(component: &Component, label: &str) -> Result<(), String> {
  if component.has_wire(label) {
    Ok(())
  } else {
    Err(format!("missing wire '{}'", label))
  }
}
