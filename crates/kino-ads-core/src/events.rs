//! Typed event subscriptions
//!
//! Collaborators (ad engine, video surface, stream loader, gesture source) expose
//! their notifications through an [`EventRegistry`] keyed by an event-kind enum.
//! Subscribing returns a [`Subscription`] guard; dropping the guard removes the
//! handler, so a mount releases everything it registered by dropping its guards.
//!
//! Handlers are invoked in registration order, outside the registry lock, so a
//! handler may subscribe or unsubscribe (including itself) while being dispatched.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

/// Shared handler type
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<K, E> {
    id: u64,
    kind: K,
    handler: Handler<E>,
}

struct Inner<K, E> {
    next_id: u64,
    entries: Vec<Entry<K, E>>,
}

/// Registry of handlers keyed by event kind
pub struct EventRegistry<K, E> {
    inner: Arc<Mutex<Inner<K, E>>>,
}

impl<K, E> EventRegistry<K, E>
where
    K: Copy + PartialEq + fmt::Debug + Send + Sync + 'static,
    E: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a handler for one event kind
    pub fn subscribe(&self, kind: K, handler: Handler<E>) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push(Entry { id, kind, handler });
            id
        };
        trace!(?kind, id, "Handler subscribed");

        let weak: Weak<Mutex<Inner<K, E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).entries.retain(|entry| entry.id != id);
                trace!(?kind, id, "Handler unsubscribed");
            }
        })
    }

    /// Dispatch an event to every handler registered for `kind`
    pub fn emit(&self, kind: K, event: &E) -> usize {
        let handlers: Vec<Handler<E>> = lock(&self.inner)
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.handler.clone())
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of live handlers for `kind`
    pub fn handler_count(&self, kind: K) -> usize {
        lock(&self.inner)
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Number of live handlers across all kinds
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, E> Default for EventRegistry<K, E>
where
    K: Copy + PartialEq + fmt::Debug + Send + Sync + 'static,
    E: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scoped handler registration, released on drop
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the handler now
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
