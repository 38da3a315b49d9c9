#![forbid(unsafe_code)]

//! evx public facade crate.
//!
//! Re-exports the reactive store, broker and event envelope from `evx-core`
//! and, with the default `state` feature, the state container from
//! `evx-state`.

pub use evx_core as core;
#[cfg(feature = "state")]
pub use evx_state as state;

pub mod prelude {
    pub use evx_core::{
        AnyListener, Broker, BrokerConfig, BrokerError, Event, EventMap, Listener, ListenerResult,
        Reactive, ReactiveConfig, ReactiveError, ReactiveOptions, ReadOnlyBroker, Snapshot,
        Tracked,
    };
    #[cfg(feature = "state")]
    pub use evx_state::{
        MemoryStorage, RestorePolicy, State, StateChange, StateError, StateEventKind, StateInit,
        StateStorage,
    };
    #[cfg(feature = "state-persistence")]
    pub use evx_state::FileStorage;
}
