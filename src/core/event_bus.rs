//! Pub/sub event bus carrying the engine's outbound notifications.
//!
//! - `subscribe()` registers a callback that runs synchronously inside `emit()`
//! - `emit()` also queues the event so a host loop can drain it with `poll()`
//!
//! Everything is emitted from the control thread, so subscribers observe
//! events in the order the engine produced them. Callbacks for one event
//! type run in subscription order.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Queue cap; beyond it the oldest half is dropped
const MAX_QUEUE_SIZE: usize = 4096;

/// Anything `Send + Sync + 'static` can travel on the bus.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;
type Queue = Arc<Mutex<Vec<BoxedEvent>>>;

pub type BoxedEvent = Box<dyn Event>;

#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    queue: Queue,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a callback for events of type `E`.
    ///
    /// ```ignore
    /// engine.events().subscribe::<PositionChangedEvent, _>(|e| {
    ///     println!("now at {} ms", e.position_ms);
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Run subscribers for `E`, then queue the event for `poll()`.
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, Box::new(event));
    }

    /// Drain everything emitted since the last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Cloneable handle that emits into this bus
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            subscribers: Arc::clone(&self.subscribers),
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Emit-only handle, handed to components that publish but never poll
#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Subscribers,
    queue: Queue,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, Box::new(event));
    }
}

fn dispatch(subscribers: &Subscribers, queue: &Queue, event: BoxedEvent) {
    // Deref to `dyn Event` so the vtable call yields the concrete type id,
    // not the id of `Box<dyn Event>` (which also satisfies the blanket impl).
    let type_id = (*event).as_any().type_id();

    // Clone the callback list so a subscriber may subscribe without deadlocking
    let callbacks: Vec<Callback> = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&type_id)
        .cloned()
        .unwrap_or_default();
    for cb in &callbacks {
        cb((*event).as_any());
    }

    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict = queue.len() / 2;
        warn!("Event queue full ({} events), dropping oldest {}", queue.len(), evict);
        queue.drain(0..evict);
    }
    queue.push(event);
}

/// Downcast a polled event to a concrete type.
///
/// Must go through `**event` for the same reason as in `dispatch`.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Clone, Debug)]
    struct Moved(i64);

    #[derive(Clone, Debug)]
    struct Other;

    #[test]
    fn test_subscribe_runs_immediately() {
        let bus = EventBus::new();
        let total = Arc::new(AtomicI64::new(0));
        let t = Arc::clone(&total);
        bus.subscribe::<Moved, _>(move |e| {
            t.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emit(Moved(40));
        bus.emit(Moved(2));
        assert_eq!(total.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_poll_drains_in_order() {
        let bus = EventBus::new();
        bus.emit(Moved(1));
        bus.emit(Other);
        bus.emitter().emit(Moved(2));

        let events = bus.poll();
        assert_eq!(events.len(), 3);
        assert_eq!(downcast_event::<Moved>(&events[0]).map(|m| m.0), Some(1));
        assert!(downcast_event::<Other>(&events[1]).is_some());
        assert!(downcast_event::<Moved>(&events[1]).is_none());
        assert_eq!(downcast_event::<Moved>(&events[2]).map(|m| m.0), Some(2));
        assert!(bus.poll().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let total = Arc::new(AtomicI64::new(0));
        let t = Arc::clone(&total);
        bus.subscribe::<Moved, _>(move |e| {
            t.fetch_add(e.0, Ordering::SeqCst);
        });
        assert!(bus.has_subscribers::<Moved>());

        bus.unsubscribe_all::<Moved>();
        bus.emit(Moved(5));
        assert_eq!(total.load(Ordering::SeqCst), 0);
        assert!(!bus.has_subscribers::<Moved>());
        assert_eq!(bus.queue_len(), 1);
    }

    #[test]
    fn test_queue_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_QUEUE_SIZE as i64 + 1) {
            bus.emit(Moved(i));
        }
        let events = bus.poll();
        assert_eq!(events.len(), MAX_QUEUE_SIZE / 2 + 1);
        assert_eq!(downcast_event::<Moved>(events.last().unwrap()).map(|m| m.0), Some(MAX_QUEUE_SIZE as i64));
    }
}
