#![forbid(unsafe_code)]

//! Feature-agnostic logging macros.
//!
//! With the `tracing` feature, `trace!`, `debug!` and `warn!` are the
//! `tracing` macros. Without it they expand to nothing, so call sites never
//! need their own `cfg` gates.
//!
//! Events follow a `message = "component.action"` convention, e.g.
//! `reactive.recompute` or `broker.dispatch`.

#[cfg(feature = "tracing")]
pub use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __evx_log_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub use crate::__evx_log_noop as debug;
#[cfg(not(feature = "tracing"))]
pub use crate::__evx_log_noop as trace;
#[cfg(not(feature = "tracing"))]
pub use crate::__evx_log_noop as warn;

/// Install a JSON `tracing` subscriber filtered by the `EVX_LOG` environment
/// variable (same syntax as `RUST_LOG`).
///
/// Fails if a global subscriber is already installed.
#[cfg(feature = "tracing-json")]
pub fn init_json() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    tracing_subscriber::registry()
        .with(EnvFilter::from_env("EVX_LOG"))
        .with(fmt::layer().json())
        .try_init()
}
