//! Change listener bus.
//!
//! Listeners are notified synchronously inside a committing transaction,
//! exactly when the transaction advanced the document clock. Delivery order
//! matches registration order. The store runs on a single-threaded host, so
//! the registry uses `Rc` rather than a lock.

use crate::{Clock, SourceTag};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Notification delivered to change listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Caller-supplied tag identifying the logical origin of the transaction.
    pub source: SourceTag,
    /// The document clock after the transaction committed.
    pub new_clock: Clock,
}

type Callback = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Rc<RefCell<Callback>>)>,
}

/// Fan-out of change notifications, in registration order.
pub(crate) struct ListenerBus {
    registry: Rc<RefCell<Registry>>,
}

impl ListenerBus {
    pub(crate) fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    pub(crate) fn subscribe(&self, callback: impl FnMut(&ChangeEvent) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .entries
            .push((id, Rc::new(RefCell::new(Box::new(callback) as Callback))));

        Subscription {
            registry: Rc::downgrade(&self.registry),
            id,
        }
    }

    /// Deliver `event` to every listener registered at the time of the call.
    ///
    /// The delivery set is fixed up front: an unsubscribe that happens while
    /// the event is being delivered takes effect for subsequent
    /// notifications, never the in-flight one.
    pub(crate) fn notify(&self, event: &ChangeEvent) {
        let delivery: Vec<Rc<RefCell<Callback>>> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();

        for callback in delivery {
            (callback.borrow_mut())(event);
        }
    }
}

/// Disposer returned by listener registration. Dropping it does not
/// unsubscribe; call [`Subscription::unsubscribe`], which tolerates being
/// called more than once.
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener from the bus. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(clock: Clock) -> ChangeEvent {
        ChangeEvent {
            source: "test".to_string(),
            new_clock: clock,
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = ListenerBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = Rc::clone(&seen);
        let _a = bus.subscribe(move |e| seen_a.borrow_mut().push(("a", e.new_clock)));
        let seen_b = Rc::clone(&seen);
        let _b = bus.subscribe(move |e| seen_b.borrow_mut().push(("b", e.new_clock)));

        bus.notify(&event(1));

        assert_eq!(*seen.borrow(), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = ListenerBus::new();
        let count = Rc::new(RefCell::new(0));

        let count_cb = Rc::clone(&count);
        let sub = bus.subscribe(move |_| *count_cb.borrow_mut() += 1);

        bus.notify(&event(1));
        sub.unsubscribe();
        sub.unsubscribe();
        bus.notify(&event(2));

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn unsubscribe_during_delivery_spares_the_in_flight_event() {
        let bus = ListenerBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_b = Rc::clone(&seen);
        let sub_b = Rc::new(RefCell::new(None::<Subscription>));

        let sub_b_handle = Rc::clone(&sub_b);
        let _a = bus.subscribe(move |_| {
            if let Some(sub) = sub_b_handle.borrow().as_ref() {
                sub.unsubscribe();
            }
        });
        *sub_b.borrow_mut() = Some(bus.subscribe(move |e| seen_b.borrow_mut().push(e.new_clock)));

        // Listener a unsubscribes b mid-delivery; b still sees this event.
        bus.notify(&event(1));
        assert_eq!(*seen.borrow(), vec![1]);

        // But not the next one.
        bus.notify(&event(2));
        assert_eq!(*seen.borrow(), vec![1]);
    }
}
