#![forbid(unsafe_code)]

//! State container built on `evx-core`.
//!
//! [`State`] wraps a [`Reactive`](evx_core::Reactive) store, dispatches a
//! [`StateChange`] after every write, and optionally persists the full
//! snapshot through a [`StateStorage`] backend.
//!
//! # Feature Flags
//!
//! - `state-persistence`: [`storage::file::FileStorage`], a JSON file backend.
//! - `tracing`: structured logs for restores and writes.
//!
//! # Example
//!
//! ```
//! use evx_state::{State, StateEventKind, StateInit};
//!
//! let mut state = State::new(
//!     StateInit::new()
//!         .with_value("count", 1)
//!         .with_compute("double", |o| o.get_or("count", 0) * 2),
//! )
//! .unwrap();
//!
//! state.broker().on(StateEventKind::StateChange, |change| {
//!     println!("{} changed to {:?}", change.key, change.value);
//!     Ok(())
//! });
//!
//! state.set("count", 21).unwrap();
//! assert_eq!(state.get("double"), Some(&42));
//! ```

pub mod error;
pub mod state;
pub mod storage;

pub use error::StateError;
pub use state::{RestorePolicy, State, StateChange, StateEventKind, StateInit};
#[cfg(feature = "state-persistence")]
pub use storage::file::FileStorage;
pub use storage::{MemoryStorage, StateStorage, StorageError};
