#![forbid(unsafe_code)]

//! Dependency-tracking key/value store with computed keys.
//!
//! - [`Reactive`]: the store. Plain keys are written with
//!   [`Reactive::set`]; computed keys are re-evaluated whenever a key they
//!   read changes.
//! - [`Snapshot`]: insertion-ordered `String -> V` map used for store data and
//!   state snapshots.
//! - [`Tracked`]: the view a compute function receives. Every key read
//!   through it is recorded as a dependency of the key being computed.
//! - [`ReactiveOptions`] / [`ReactiveConfig`]: construction options and
//!   limits.
//!
//! # Architecture
//!
//! Dependencies are discovered at run time, not declared. Each evaluation of a
//! compute function replaces that key's dependency set with the keys it read
//! during *that* run, so a function branching on current data can depend on
//! different keys from one run to the next.
//!
//! A write stores the value, then recomputes every computed key whose last
//! run read the written key. Each recomputed value is written the same way,
//! so updates cascade depth-first within the same call.
//!
//! # Invariants
//!
//! 1. After any [`Reactive::set`] returns `Ok`, every computed key `k` holds
//!    `f_k(current data)` for every computer that read a changed key.
//! 2. A key never lists itself as a dependency; self-reads are discarded.
//! 3. Dependency sets reflect the most recent evaluation only.
//! 4. Computers run in registration order, both at construction and when a
//!    single write invalidates several of them.
//!
//! # Failure Modes
//!
//! - **Cycle**: the cascade is bounded by [`ReactiveConfig::max_depth`]. Going
//!   deeper returns [`ReactiveError::CircularDependency`]; values written
//!   before the ceiling was hit are kept (no rollback).
//! - **Diamond**: a key reachable through several paths is recomputed once
//!   per path. This is not an error.
//!
//! [`ReactiveError::CircularDependency`]: crate::error::ReactiveError::CircularDependency

pub mod snapshot;
pub mod store;

pub use snapshot::{Snapshot, Tracked};
pub use store::{ComputeFn, OnSetFn, Reactive, ReactiveOptions};

/// Default recomputation depth ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Environment variable overriding [`ReactiveConfig::max_depth`].
pub const MAX_DEPTH_ENV: &str = "EVX_MAX_COMPUTE_DEPTH";

/// Limits for a [`Reactive`] store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Maximum cascade depth before a write fails with a circular-dependency
    /// error. Default: 1000.
    pub max_depth: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReactiveConfig {
    /// Set the depth ceiling.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Defaults overridden by `EVX_MAX_COMPUTE_DEPTH` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(MAX_DEPTH_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(depth) = value.and_then(|v| v.trim().parse::<usize>().ok()) {
            config.max_depth = depth;
        }
        config
    }
}
