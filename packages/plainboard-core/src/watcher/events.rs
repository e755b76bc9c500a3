/// Publish/subscribe for classified domain events.
///
/// Listeners are registered per entity type (or for everything) and invoked in
/// registration order. Each call is isolated: an `Err` or a panic from one
/// listener is logged and the remaining listeners still receive the event.
/// Every event is also sent on a broadcast channel for async consumers.
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use super::types::{DomainEvent, EntityType};

const CHANNEL_CAPACITY: usize = 256;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type Listener = Arc<dyn Fn(&DomainEvent) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    All,
    Entity(EntityType),
}

pub struct EventBus {
    listeners: RwLock<HashMap<EventFilter, BTreeMap<ListenerHandle, Listener>>>,
    next_handle: AtomicU64,
    channel: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            channel,
        }
    }

    pub fn subscribe<F>(&self, filter: EventFilter, listener: F) -> ListenerHandle
    where
        F: Fn(&DomainEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(filter)
            .or_default()
            .insert(handle, Arc::new(listener));
        handle
    }

    /// Returns false when the handle was not registered.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        listeners.retain(|_, set| {
            removed |= set.remove(&handle).is_some();
            !set.is_empty()
        });
        removed
    }

    pub fn subscribe_channel(&self) -> broadcast::Receiver<DomainEvent> {
        self.channel.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Deliver `event` to every matching listener. Returns how many
    /// listeners accepted it without error.
    pub fn publish(&self, event: &DomainEvent) -> usize {
        // Snapshot under the lock so listeners may (un)subscribe while running.
        let targets: Vec<(ListenerHandle, Listener)> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            let mut targets: Vec<_> = [EventFilter::All, EventFilter::Entity(event.entity_type)]
                .iter()
                .filter_map(|f| listeners.get(f))
                .flat_map(|set| set.iter().map(|(h, l)| (*h, l.clone())))
                .collect();
            targets.sort_by_key(|(h, _)| *h);
            targets
        };

        let mut delivered = 0;
        for (handle, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    log::warn!(
                        "[plainboard.events.listener] Listener {:?} failed: {}",
                        handle,
                        e
                    );
                }
                Err(_) => {
                    log::error!("[plainboard.events.listener] Listener {:?} panicked", handle);
                }
            }
        }

        if self.channel.send(event.clone()).is_err() {
            log::trace!("[plainboard.events.send] No channel receivers");
        }
        delivered
    }
}
