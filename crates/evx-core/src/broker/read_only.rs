#![forbid(unsafe_code)]

//! Subscribe-only view of a [`Broker`].
//!
//! Hand a `ReadOnlyBroker` to code that should observe events but never
//! dispatch, forward, or clear them.

use std::fmt;

use super::{AnyListener, Broker, EventMap, Listener};
use crate::error::ListenerResult;

/// Restricted handle exposing only listener registration and removal.
///
/// Registrations made through it act on the wrapped broker itself.
///
/// ```
/// use evx_core::{Broker, Event};
///
/// let broker: Broker<Event<i32>> = Broker::new();
/// let view = broker.read_only();
/// view.on("tick", |_| Ok(()));
/// assert_eq!(broker.listener_count("tick"), 1);
/// ```
///
/// The view cannot dispatch:
///
/// ```compile_fail
/// use evx_core::{Broker, Event};
///
/// let broker: Broker<Event<i32>> = Broker::new();
/// let view = broker.read_only();
/// let _ = view.dispatch(Event::new("tick", 1));
/// ```
///
/// Nor forward to another broker:
///
/// ```compile_fail
/// use evx_core::{Broker, Event};
///
/// let broker: Broker<Event<i32>> = Broker::new();
/// let other: Broker<Event<i32>> = Broker::new();
/// broker.read_only().pipe_to(&other);
/// ```
///
/// Nor drop the broker's registrations:
///
/// ```compile_fail
/// use evx_core::{Broker, Event};
///
/// let broker: Broker<Event<i32>> = Broker::new();
/// broker.read_only().clear();
/// ```
pub struct ReadOnlyBroker<E: EventMap> {
    broker: Broker<E>,
}

impl<E: EventMap> Clone for ReadOnlyBroker<E> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
        }
    }
}

impl<E: EventMap> fmt::Debug for ReadOnlyBroker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyBroker").field(&self.broker).finish()
    }
}

impl<E: EventMap> From<&Broker<E>> for ReadOnlyBroker<E> {
    fn from(broker: &Broker<E>) -> Self {
        broker.read_only()
    }
}

impl<E: EventMap> ReadOnlyBroker<E> {
    pub(crate) fn new(broker: Broker<E>) -> Self {
        Self { broker }
    }

    pub fn add_listener(&self, kind: E::Kind, listener: Listener<E>) -> Listener<E> {
        self.broker.add_listener(kind, listener)
    }

    pub fn on(
        &self,
        kind: E::Kind,
        callback: impl Fn(&E) -> ListenerResult + 'static,
    ) -> Listener<E> {
        self.broker.on(kind, callback)
    }

    pub fn remove_listener(&self, kind: E::Kind, listener: &Listener<E>) {
        self.broker.remove_listener(kind, listener);
    }

    pub fn listen(&self, listener: AnyListener<E>) -> AnyListener<E> {
        self.broker.listen(listener)
    }

    pub fn listen_filtered(
        &self,
        listener: AnyListener<E>,
        filter: impl Fn(E::Kind) -> bool + 'static,
    ) -> AnyListener<E> {
        self.broker.listen_filtered(listener, filter)
    }

    pub fn on_any(
        &self,
        callback: impl Fn(E::Kind, &E) -> ListenerResult + 'static,
    ) -> AnyListener<E> {
        self.broker.on_any(callback)
    }

    pub fn remove_any_listener(&self, listener: &AnyListener<E>) {
        self.broker.remove_any_listener(listener);
    }

    /// Whether this view wraps `broker`.
    #[must_use]
    pub fn is_view_of(&self, broker: &Broker<E>) -> bool {
        self.broker.ptr_eq(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::cell::Cell;
    use std::rc::Rc;

    type Ev = Event<i32>;

    #[test]
    fn registrations_act_on_underlying_broker() {
        let broker: Broker<Ev> = Broker::new();
        let view = broker.read_only();
        assert!(view.is_view_of(&broker));

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let listener = view.on("tick", move |event| {
            counter.set(counter.get() + event.payload().copied().unwrap_or(0));
            Ok(())
        });
        broker.dispatch_payload("tick", 3).unwrap();
        assert_eq!(hits.get(), 3);

        view.remove_listener("tick", &listener);
        broker.dispatch_payload("tick", 3).unwrap();
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn any_listener_through_view() {
        let broker: Broker<Ev> = Broker::new();
        let view = ReadOnlyBroker::from(&broker);
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let any = view.listen_filtered(
            AnyListener::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            }),
            |kind| kind != "ignored",
        );

        broker.dispatch_empty("ignored").unwrap();
        broker.dispatch_empty("counted").unwrap();
        assert_eq!(seen.get(), 1);

        view.remove_any_listener(&any);
        assert_eq!(broker.any_listener_count(), 0);
    }
}
