#![forbid(unsafe_code)]

//! Typed publish/subscribe broker.
//!
//! A [`Broker<E>`] routes events of one closed event set `E` (usually an
//! enum implementing [`EventMap`]) to:
//!
//! 1. listeners registered for the event's kind, in registration order;
//! 2. wildcard ("any") listeners, each optionally gated by a kind filter;
//! 3. every broker this one pipes to, recursively and depth-first.
//!
//! A broker can also *consume* another broker: it subscribes as that
//! broker's any-listener and re-dispatches everything it receives onto
//! itself.
//!
//! # Event envelopes
//!
//! `Broker<Event<P, C>>` carries [`Event`] envelopes keyed by their string
//! type. [`Broker::dispatch_payload`] wraps a payload into a fresh envelope,
//! dispatches it and hands it back so the caller can read contributions and
//! the default-prevented flag.
//!
//! # Architecture
//!
//! `Broker<E>` is a cheap `Rc` handle; clones share one registry. Consume
//! subscriptions hold the consumer weakly, so mutual consumption does not
//! leak. Pipe targets are held strongly.
//!
//! # Invariants
//!
//! 1. A listener handle is registered at most once per kind; adding it again
//!    is a no-op. Removing an unregistered listener is a no-op.
//! 2. Dispatch order is kind listeners, then any-listeners, then pipe
//!    targets, all within the caller's stack frame.
//! 3. Each stage works on a snapshot taken when the stage starts: listeners
//!    added during a stage are first called on the next dispatch.
//! 4. `end_consume(b)` removes exactly the subscription `consume(b)` made.
//!
//! # Failure Modes
//!
//! - **Listener error**: dispatch stops at the failing listener and returns
//!   [`BrokerError::Listener`]. Later listeners, any-listeners and pipe
//!   targets are not notified.
//! - **Dispatch depth**: every dispatch on a broker that starts while another
//!   is still running on it counts one level. Past
//!   [`BrokerConfig::max_dispatch_depth`] (default 256) dispatch fails with
//!   [`BrokerError::DispatchDepthExceeded`]. Pipe/consume loops always hit
//!   this, but so does deep re-entrancy without any loop, such as a listener
//!   re-dispatching on its own broker more than 256 levels deep. Raise the
//!   limit for such workloads.
//! - **Diamond topology**: a broker reachable through two pipe paths receives
//!   the event twice. This is not deduplicated.
//!
//! # Example
//!
//! ```
//! use evx_core::broker::{Broker, EventMap};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! #[derive(Debug)]
//! enum AppEvent {
//!     Saved(String),
//!     Closed,
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum AppEventKind {
//!     Saved,
//!     Closed,
//! }
//!
//! impl EventMap for AppEvent {
//!     type Kind = AppEventKind;
//!     fn kind(&self) -> AppEventKind {
//!         match self {
//!             AppEvent::Saved(_) => AppEventKind::Saved,
//!             AppEvent::Closed => AppEventKind::Closed,
//!         }
//!     }
//! }
//!
//! let broker = Broker::new();
//! let saves = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&saves);
//! broker.on(AppEventKind::Saved, move |_| {
//!     counter.set(counter.get() + 1);
//!     Ok(())
//! });
//!
//! broker.dispatch(AppEvent::Saved("notes.txt".into())).unwrap();
//! broker.dispatch(AppEvent::Closed).unwrap();
//! assert_eq!(saves.get(), 1);
//! ```

pub mod listener;
pub mod read_only;

pub use listener::{AnyListener, Listener, ListenerId};
pub use read_only::ReadOnlyBroker;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::error::{BrokerError, ListenerResult};
use crate::event::Event;
use crate::logging::{debug, trace, warn};

/// A closed set of event types a broker can carry.
///
/// Implemented by an enum of events (or a single event struct) together
/// with a `Kind` tag type that listeners register against.
pub trait EventMap: 'static {
    /// Tag identifying the type of an event.
    type Kind: Copy + Eq + Hash + fmt::Debug + 'static;

    /// Tag of this event.
    fn kind(&self) -> Self::Kind;

    /// Human-readable name of `kind`, used in errors and logs.
    fn kind_name(kind: Self::Kind) -> String {
        format!("{kind:?}")
    }
}

impl<P: 'static, C: 'static> EventMap for Event<P, C> {
    type Kind = &'static str;

    fn kind(&self) -> &'static str {
        self.event_type()
    }

    fn kind_name(kind: &'static str) -> String {
        kind.to_owned()
    }
}

/// Default nesting limit for re-entrant dispatch on one broker.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 256;

/// Environment variable overriding [`BrokerConfig::max_dispatch_depth`].
pub const MAX_DISPATCH_DEPTH_ENV: &str = "EVX_MAX_DISPATCH_DEPTH";

/// Limits for a [`Broker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// How many dispatches may be nested on one broker at once. Default: 256.
    pub max_dispatch_depth: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    /// Defaults overridden by `EVX_MAX_DISPATCH_DEPTH` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(MAX_DISPATCH_DEPTH_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(depth) = value.and_then(|v| v.trim().parse::<usize>().ok()) {
            config.max_dispatch_depth = depth;
        }
        config
    }
}

type KindFilter<K> = Rc<dyn Fn(K) -> bool>;

struct AnyEntry<E: EventMap> {
    listener: AnyListener<E>,
    filter: Option<KindFilter<E::Kind>>,
}

impl<E: EventMap> Clone for AnyEntry<E> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<E: EventMap> AnyEntry<E> {
    fn accepts(&self, kind: E::Kind) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(kind))
    }
}

struct Consumed<E: EventMap> {
    source: Broker<E>,
    listener: AnyListener<E>,
}

struct BrokerInner<E: EventMap> {
    listeners: RefCell<AHashMap<E::Kind, Vec<Listener<E>>>>,
    any_listeners: RefCell<Vec<AnyEntry<E>>>,
    pipes: RefCell<Vec<Broker<E>>>,
    consumed: RefCell<Vec<Consumed<E>>>,
    /// Dispatches currently in progress on this broker.
    depth: Cell<usize>,
    config: BrokerConfig,
}

/// Decrements the dispatch depth when a dispatch frame unwinds.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>, max: usize) -> Result<Self, BrokerError> {
        let next = depth.get() + 1;
        if next > max {
            return Err(BrokerError::DispatchDepthExceeded { depth: max });
        }
        depth.set(next);
        Ok(Self { depth })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Typed event hub. See the [module docs](self).
pub struct Broker<E: EventMap> {
    inner: Rc<BrokerInner<E>>,
}

impl<E: EventMap> Clone for Broker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: EventMap> Default for Broker<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventMap> fmt::Debug for Broker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("kinds", &self.inner.listeners.borrow().len())
            .field("any_listeners", &self.any_listener_count())
            .field("pipes", &self.pipe_count())
            .field("consumed", &self.consume_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<E: EventMap> Broker<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            inner: Rc::new(BrokerInner {
                listeners: RefCell::new(AHashMap::new()),
                any_listeners: RefCell::new(Vec::new()),
                pipes: RefCell::new(Vec::new()),
                consumed: RefCell::new(Vec::new()),
                depth: Cell::new(0),
                config,
            }),
        }
    }

    fn from_inner(inner: Rc<BrokerInner<E>>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Whether `self` and `other` are handles to the same broker.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register `listener` for `kind` and return it for later removal.
    ///
    /// Adding a listener already registered for `kind` is a no-op.
    pub fn add_listener(&self, kind: E::Kind, listener: Listener<E>) -> Listener<E> {
        let mut listeners = self.inner.listeners.borrow_mut();
        let registered = listeners.entry(kind).or_default();
        if !registered.contains(&listener) {
            registered.push(listener.clone());
        }
        listener
    }

    /// Register a closure for `kind`.
    pub fn on(
        &self,
        kind: E::Kind,
        callback: impl Fn(&E) -> ListenerResult + 'static,
    ) -> Listener<E> {
        self.add_listener(kind, Listener::new(callback))
    }

    /// Unregister `listener` from `kind`. No-op when it is not registered.
    pub fn remove_listener(&self, kind: E::Kind, listener: &Listener<E>) {
        let mut listeners = self.inner.listeners.borrow_mut();
        if let Some(registered) = listeners.get_mut(&kind) {
            registered.retain(|l| l != listener);
            if registered.is_empty() {
                listeners.remove(&kind);
            }
        }
    }

    /// Register a wildcard listener called for every dispatched kind.
    ///
    /// Re-registering an existing wildcard listener clears its filter and
    /// keeps its position.
    pub fn listen(&self, listener: AnyListener<E>) -> AnyListener<E> {
        self.register_any(listener, None)
    }

    /// Register a wildcard listener called only for kinds `filter` accepts.
    pub fn listen_filtered(
        &self,
        listener: AnyListener<E>,
        filter: impl Fn(E::Kind) -> bool + 'static,
    ) -> AnyListener<E> {
        self.register_any(listener, Some(Rc::new(filter)))
    }

    /// Register a wildcard closure.
    pub fn on_any(
        &self,
        callback: impl Fn(E::Kind, &E) -> ListenerResult + 'static,
    ) -> AnyListener<E> {
        self.listen(AnyListener::new(callback))
    }

    fn register_any(
        &self,
        listener: AnyListener<E>,
        filter: Option<KindFilter<E::Kind>>,
    ) -> AnyListener<E> {
        let mut any = self.inner.any_listeners.borrow_mut();
        if let Some(i) = any.iter().position(|entry| entry.listener == listener) {
            any[i].filter = filter;
        } else {
            any.push(AnyEntry {
                listener: listener.clone(),
                filter,
            });
        }
        listener
    }

    /// Unregister a wildcard listener. No-op when it is not registered.
    pub fn remove_any_listener(&self, listener: &AnyListener<E>) {
        self.inner
            .any_listeners
            .borrow_mut()
            .retain(|entry| entry.listener != *listener);
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Notify kind listeners, then any-listeners, then pipe targets.
    ///
    /// # Errors
    ///
    /// The first listener error, wrapped in [`BrokerError::Listener`];
    /// nothing after the failing listener runs. [`BrokerError::DispatchDepthExceeded`]
    /// when dispatches nest too deeply on one broker.
    pub fn dispatch(&self, event: E) -> Result<(), BrokerError> {
        self.dispatch_ref(&event)
    }

    /// [`dispatch`](Self::dispatch) for an event the caller keeps.
    pub fn dispatch_ref(&self, event: &E) -> Result<(), BrokerError> {
        let inner = &self.inner;
        let _guard = match DepthGuard::enter(&inner.depth, inner.config.max_dispatch_depth) {
            Ok(guard) => guard,
            Err(err) => {
                warn!(
                    message = "broker.dispatch_depth_exceeded",
                    kind = %E::kind_name(event.kind()),
                    max_depth = inner.config.max_dispatch_depth
                );
                return Err(err);
            }
        };
        let kind = event.kind();

        let listeners = inner
            .listeners
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        trace!(
            message = "broker.dispatch",
            kind = %E::kind_name(kind),
            listeners = listeners.len(),
            depth = inner.depth.get()
        );
        for listener in &listeners {
            if let Err(source) = listener.call(event) {
                return Err(Self::listener_failed(kind, source));
            }
        }

        let any = inner.any_listeners.borrow().clone();
        for entry in any.iter().filter(|entry| entry.accepts(kind)) {
            if let Err(source) = entry.listener.call(kind, event) {
                return Err(Self::listener_failed(kind, source));
            }
        }

        let pipes = inner.pipes.borrow().clone();
        for target in &pipes {
            target.dispatch_ref(event)?;
        }
        Ok(())
    }

    fn listener_failed(kind: E::Kind, source: crate::error::ListenerError) -> BrokerError {
        let event_type = E::kind_name(kind);
        debug!(
            message = "broker.listener_failed",
            kind = %event_type,
            error = %source
        );
        BrokerError::listener(event_type, source)
    }

    // ── Forwarding ───────────────────────────────────────────────────

    /// Forward every event dispatched here to `target` as well.
    ///
    /// Piping to the same target twice is a no-op.
    pub fn pipe_to(&self, target: &Broker<E>) {
        let mut pipes = self.inner.pipes.borrow_mut();
        if !pipes.iter().any(|p| p.ptr_eq(target)) {
            pipes.push(target.clone());
            debug!(message = "broker.pipe", targets = pipes.len());
        }
    }

    /// Stop forwarding to `target`. No-op when not piped.
    pub fn unpipe(&self, target: &Broker<E>) {
        self.inner.pipes.borrow_mut().retain(|p| !p.ptr_eq(target));
    }

    /// Re-dispatch onto `self` every event dispatched on `source`.
    ///
    /// Consuming a broker already being consumed is a no-op. The
    /// subscription holds `self` weakly: once every handle to `self` is
    /// dropped it forwards nothing.
    pub fn consume(&self, source: &Broker<E>) {
        if self.is_consuming(source) {
            return;
        }
        let consumer: Weak<BrokerInner<E>> = Rc::downgrade(&self.inner);
        let listener = source.listen(AnyListener::new(move |_kind, event: &E| {
            match consumer.upgrade() {
                Some(inner) => Broker::from_inner(inner)
                    .dispatch_ref(event)
                    .map_err(Into::into),
                None => Ok(()),
            }
        }));
        self.inner.consumed.borrow_mut().push(Consumed {
            source: source.clone(),
            listener,
        });
        debug!(message = "broker.consume", sources = self.consume_count());
    }

    /// Remove the subscription made by [`consume`](Self::consume). No-op when
    /// `source` is not being consumed.
    pub fn end_consume(&self, source: &Broker<E>) {
        let removed = {
            let mut consumed = self.inner.consumed.borrow_mut();
            consumed
                .iter()
                .position(|c| c.source.ptr_eq(source))
                .map(|i| consumed.remove(i))
        };
        if let Some(entry) = removed {
            entry.source.remove_any_listener(&entry.listener);
            debug!(message = "broker.end_consume", sources = self.consume_count());
        }
    }

    #[must_use]
    pub fn is_consuming(&self, source: &Broker<E>) -> bool {
        self.inner
            .consumed
            .borrow()
            .iter()
            .any(|c| c.source.ptr_eq(source))
    }

    #[must_use]
    pub fn is_piped_to(&self, target: &Broker<E>) -> bool {
        self.inner.pipes.borrow().iter().any(|p| p.ptr_eq(target))
    }

    /// Drop every listener, any-listener, pipe target and consume
    /// subscription owned by this broker.
    ///
    /// Brokers that pipe into this one keep doing so.
    pub fn clear(&self) {
        self.inner.listeners.borrow_mut().clear();
        self.inner.any_listeners.borrow_mut().clear();
        self.inner.pipes.borrow_mut().clear();
        let consumed = std::mem::take(&mut *self.inner.consumed.borrow_mut());
        for entry in consumed {
            entry.source.remove_any_listener(&entry.listener);
        }
        debug!(message = "broker.clear");
    }

    /// View exposing only listener registration and removal.
    #[must_use]
    pub fn read_only(&self) -> ReadOnlyBroker<E> {
        ReadOnlyBroker::new(self.clone())
    }

    // ── Inspection ───────────────────────────────────────────────────

    #[must_use]
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.inner.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn any_listener_count(&self) -> usize {
        self.inner.any_listeners.borrow().len()
    }

    #[must_use]
    pub fn pipe_count(&self) -> usize {
        self.inner.pipes.borrow().len()
    }

    #[must_use]
    pub fn consume_count(&self) -> usize {
        self.inner.consumed.borrow().len()
    }
}

impl<P: 'static, C: 'static> Broker<Event<P, C>> {
    /// Wrap `payload` in a new [`Event`], dispatch it, and return it so the
    /// caller can read contributions and the default-prevented flag.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub fn dispatch_payload(
        &self,
        event_type: &'static str,
        payload: P,
    ) -> Result<Event<P, C>, BrokerError> {
        let event = Event::new(event_type, payload);
        self.dispatch_ref(&event)?;
        Ok(event)
    }

    /// Dispatch a payload-less [`Event`] and return it.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub fn dispatch_empty(&self, event_type: &'static str) -> Result<Event<P, C>, BrokerError> {
        let event = Event::empty(event_type);
        self.dispatch_ref(&event)?;
        Ok(event)
    }
}
