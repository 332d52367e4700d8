use std::sync::{Arc, Mutex};

/// A small per-component subscriber registry with typed event variants,
/// favored over open-ended dynamic dispatch (see design notes on the
/// event-emitter pattern). Components own their registry; no back-reference
/// to subscribers is ever held beyond this bus.
pub struct EventBus<E: Clone + Send + 'static> {
    subscribers: Mutex<Vec<Arc<dyn Fn(E) + Send + Sync>>>,
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(E) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Arc::new(listener));
    }

    pub fn emit(&self, event: E) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribers_receive_emitted_events() {
        let bus: EventBus<i32> = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        bus.subscribe(move |value| {
            received_clone.fetch_add(value as usize, Ordering::SeqCst);
        });

        bus.emit(2);
        bus.emit(3);

        assert_eq!(received.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_subscriber_count() {
        let bus: EventBus<i32> = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.subscribe(|_| {});
        bus.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 2);
    }
}
