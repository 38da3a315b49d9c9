#![forbid(unsafe_code)]

//! Event envelope with a preventable default action and a contribution log.
//!
//! An [`Event`] wraps an event type tag and an optional payload. Listeners get
//! two mutation channels:
//!
//! - [`Event::prevent_default`]: flags that the dispatcher should skip its
//!   default action.
//! - [`Event::contribute`]: appends `(data, contributor)` to an ordered log
//!   the dispatcher reads back with [`Event::contributions`] once every
//!   listener has run.
//!
//! # Sharing
//!
//! Cloning an `Event` creates a new handle to the **same** event, so the
//! dispatcher can keep one handle while listeners (including those reached
//! through pipe/consume forwarding) mutate it through theirs.
//!
//! # Example
//!
//! ```
//! use evx_core::event::Event;
//!
//! let event: Event<&str, u32> = Event::new("save", "notes.txt");
//! let seen_by_listener = event.clone();
//!
//! seen_by_listener.contribute(3, "spell-check");
//! seen_by_listener.prevent_default();
//!
//! assert!(event.default_prevented());
//! assert_eq!(event.contributions()[0].data, 3);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// One entry of an event's contribution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution<C> {
    /// Data attached by the participant.
    pub data: C,
    /// Free-form contributor id; empty when the participant did not name itself.
    pub contributor: String,
}

struct EventInner<P, C> {
    event_type: &'static str,
    payload: Option<P>,
    default_prevented: Cell<bool>,
    contributions: RefCell<Vec<Contribution<C>>>,
}

/// Shared event envelope. See the [module docs](self).
pub struct Event<P, C = ()> {
    inner: Rc<EventInner<P, C>>,
}

impl<P, C> Clone for Event<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: fmt::Debug, C: fmt::Debug> fmt::Debug for Event<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.inner.event_type)
            .field("payload", &self.inner.payload)
            .field("default_prevented", &self.inner.default_prevented.get())
            .field("contributions", &self.inner.contributions.borrow())
            .finish()
    }
}

impl<P, C> Event<P, C> {
    /// Create an event carrying `payload`.
    #[must_use]
    pub fn new(event_type: &'static str, payload: P) -> Self {
        Self::with_payload(event_type, Some(payload))
    }

    /// Create an event without a payload.
    #[must_use]
    pub fn empty(event_type: &'static str) -> Self {
        Self::with_payload(event_type, None)
    }

    fn with_payload(event_type: &'static str, payload: Option<P>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                event_type,
                payload,
                default_prevented: Cell::new(false),
                contributions: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.inner.event_type
    }

    #[must_use]
    pub fn payload(&self) -> Option<&P> {
        self.inner.payload.as_ref()
    }

    /// Flag the default action as prevented. Idempotent.
    pub fn prevent_default(&self) {
        self.inner.default_prevented.set(true);
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.get()
    }

    /// Append `data` to the contribution log. No deduplication.
    pub fn contribute(&self, data: C, contributor: impl Into<String>) {
        self.inner.contributions.borrow_mut().push(Contribution {
            data,
            contributor: contributor.into(),
        });
    }

    /// Append `data` with an empty contributor id.
    pub fn contribute_anonymous(&self, data: C) {
        self.contribute(data, String::new());
    }

    #[must_use]
    pub fn contribution_count(&self) -> usize {
        self.inner.contributions.borrow().len()
    }

    /// Whether `self` and `other` are handles to the same event.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<P, C: Clone> Event<P, C> {
    /// Copy of the contribution log, in call order.
    ///
    /// Each entry is cloned; mutating the returned vector never affects the
    /// event.
    #[must_use]
    pub fn contributions(&self) -> Vec<Contribution<C>> {
        self.inner.contributions.borrow().clone()
    }
}
