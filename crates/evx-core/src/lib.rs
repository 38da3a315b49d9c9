#![forbid(unsafe_code)]

//! Core: reactive computed-property store, typed event broker, and event
//! envelopes.
//!
//! - [`reactive`]: [`Reactive`] store whose computed keys re-evaluate when any
//!   key they read changes.
//! - [`broker`]: [`Broker`] with per-kind listeners, wildcard listeners,
//!   pipe/consume forwarding and a [`ReadOnlyBroker`] capability view.
//! - [`event`]: [`Event`] envelope with preventable default and an
//!   accumulation channel for contributions.
//!
//! Everything here is single-threaded and synchronous: shared handles are
//! `Rc`-based and therefore neither `Send` nor `Sync`.
//!
//! # Example
//!
//! ```
//! use evx_core::reactive::{Reactive, ReactiveOptions};
//!
//! let mut store = Reactive::new(
//!     ReactiveOptions::new()
//!         .with_value("a", 1)
//!         .with_compute("b", |o| o.get_or("a", 0) * 2),
//! )
//! .unwrap();
//! assert_eq!(store.get("b"), Some(&2));
//!
//! store.set("a", 5).unwrap();
//! assert_eq!(store.get("b"), Some(&10));
//! ```

pub mod broker;
pub mod error;
pub mod event;
pub mod logging;
pub mod reactive;

pub use broker::{
    AnyListener, Broker, BrokerConfig, EventMap, Listener, ListenerId, ReadOnlyBroker,
};
pub use error::{BrokerError, ListenerError, ListenerResult, ReactiveError};
pub use event::{Contribution, Event};
pub use reactive::{Reactive, ReactiveConfig, ReactiveOptions, Snapshot, Tracked};
