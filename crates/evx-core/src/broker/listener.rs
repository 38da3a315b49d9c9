#![forbid(unsafe_code)]

//! Listener handles.
//!
//! Closures have no identity of their own, so every listener is wrapped in a
//! handle carrying a process-unique [`ListenerId`]. Clones of a handle share
//! the id: registering a clone of an already-registered listener is a no-op,
//! and any clone can be used to remove it.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::EventMap;
use crate::error::ListenerResult;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Identity of a listener handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Listener for one event kind. Called with the dispatched event.
pub struct Listener<E> {
    id: ListenerId,
    callback: Rc<dyn Fn(&E) -> ListenerResult>,
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

impl<E> PartialEq for Listener<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Listener<E> {}

impl<E> Listener<E> {
    /// Wrap `callback` in a new listener with a fresh identity.
    pub fn new(callback: impl Fn(&E) -> ListenerResult + 'static) -> Self {
        Self {
            id: next_listener_id(),
            callback: Rc::new(callback),
        }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn call(&self, event: &E) -> ListenerResult {
        (self.callback)(event)
    }
}

/// Wildcard listener. Called with the kind and the event for every dispatch.
pub struct AnyListener<E: EventMap> {
    id: ListenerId,
    callback: Rc<dyn Fn(E::Kind, &E) -> ListenerResult>,
}

impl<E: EventMap> Clone for AnyListener<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<E: EventMap> fmt::Debug for AnyListener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyListener").field("id", &self.id).finish()
    }
}

impl<E: EventMap> PartialEq for AnyListener<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E: EventMap> Eq for AnyListener<E> {}

impl<E: EventMap> AnyListener<E> {
    /// Wrap `callback` in a new wildcard listener with a fresh identity.
    pub fn new(callback: impl Fn(E::Kind, &E) -> ListenerResult + 'static) -> Self {
        Self {
            id: next_listener_id(),
            callback: Rc::new(callback),
        }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn call(&self, kind: E::Kind, event: &E) -> ListenerResult {
        (self.callback)(kind, event)
    }
}
