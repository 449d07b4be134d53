//! Observer/subscription interface used for engine events.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler<E>)>>,
}

impl<E> Registry<E> {
    fn handlers(&self) -> MutexGuard<'_, Vec<(u64, Handler<E>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A set of event handlers. Cloning shares the same set.
pub struct Listeners<E> {
    registry: Arc<Registry<E>>,
}

impl<E: 'static> Listeners<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry { next_id: AtomicU64::new(0), handlers: Mutex::default() }),
        }
    }

    /// Registers `handler` until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers().push((id, Arc::new(handler)));

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(registry) = Weak::upgrade(&registry) {
                    registry.handlers().retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Calls every handler with `event`. Handlers run outside the internal
    /// lock, so they may subscribe or unsubscribe.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> =
            self.registry.handlers().iter().map(|(_, handler)| Arc::clone(handler)).collect();
        for handler in handlers {
            handler(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.handlers().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry) }
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").finish_non_exhaustive()
    }
}

/// Keeps a handler registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::Listeners;

    #[test]
    fn drop_unsubscribes() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let subscription = listeners.subscribe(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });

        listeners.emit(&2);
        assert_eq!(listeners.len(), 1);

        drop(subscription);
        listeners.emit(&5);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(listeners.is_empty());
    }

    #[test]
    fn clones_share_handlers() {
        let listeners = Listeners::<&'static str>::new();
        let shared = listeners.clone();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let _subscription = shared.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listeners.emit(&"click");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
