//! Store events
//!
//! Notifications published after a mutation has been flushed. Delivery is
//! fire-and-forget: observers are called synchronously, channel subscribers
//! get a copy on an unbounded channel.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

/// A completed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    Created { key: u32 },
    Updated { key: u32 },
    Deleted { key: u32 },
}

impl StoreEvent {
    /// Key affected by the mutation
    pub fn key(&self) -> u32 {
        match *self {
            StoreEvent::Created { key } | StoreEvent::Updated { key } | StoreEvent::Deleted { key } => key,
        }
    }
}

/// Callback invoked for every event
pub trait StoreObserver: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

/// Fan-out to observers and channel subscribers
#[derive(Default)]
pub(crate) struct EventBus {
    observers: RwLock<Vec<Arc<dyn StoreObserver>>>,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
}

impl EventBus {
    pub(crate) fn add_observer(&self, observer: Arc<dyn StoreObserver>) {
        self.observers.write().push(observer);
    }

    pub(crate) fn subscribe(&self) -> Receiver<StoreEvent> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        // Clone the list so observers may register more observers
        let observers: Vec<Arc<dyn StoreObserver>> = self.observers.read().clone();
        for observer in observers {
            observer.on_event(&event);
        }

        // Drop subscribers whose receiver is gone
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_observers_and_subscribers() {
        let bus = EventBus::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.add_observer(Arc::new(move |_: &StoreEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let receiver = bus.subscribe();

        bus.publish(StoreEvent::Created { key: 3 });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(receiver.try_recv().unwrap(), StoreEvent::Created { key: 3 });
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::default();
        drop(bus.subscribe());

        bus.publish(StoreEvent::Deleted { key: 1 });

        assert!(bus.subscribers.lock().is_empty());
    }
}
