#![forbid(unsafe_code)]

//! Error types for the reactive store and the broker.

use thiserror::Error;

/// Error returned by a listener callback.
///
/// Any `std::error::Error` (or a plain string via `.into()`) can be returned.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Return type of every listener callback.
pub type ListenerResult = Result<(), ListenerError>;

/// Errors raised by [`Reactive`](crate::reactive::Reactive).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The recomputation cascade went deeper than the configured ceiling.
    ///
    /// Values assigned before the ceiling was hit are kept.
    #[error("too many computations (depth {depth}): you may have created a circular dependency")]
    CircularDependency { depth: usize },
}

/// Errors raised by [`Broker::dispatch`](crate::broker::Broker::dispatch).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A listener returned an error. Listeners after it were not notified.
    #[error("listener for `{event_type}` failed: {source}")]
    Listener {
        event_type: String,
        #[source]
        source: ListenerError,
    },

    /// Re-entrant dispatch on one broker nested deeper than allowed, usually
    /// a pipe/consume cycle or a listener that re-dispatches its own event.
    #[error("dispatch nested deeper than {depth} levels on one broker")]
    DispatchDepthExceeded { depth: usize },
}

impl BrokerError {
    #[must_use]
    pub fn listener(event_type: impl Into<String>, source: ListenerError) -> Self {
        Self::Listener {
            event_type: event_type.into(),
            source,
        }
    }

    /// Event type whose listener failed, if this is a listener failure.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Listener { event_type, .. } => Some(event_type),
            Self::DispatchDepthExceeded { .. } => None,
        }
    }
}
