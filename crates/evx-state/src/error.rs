#![forbid(unsafe_code)]

//! Error type for [`State`](crate::State).

use evx_core::{BrokerError, ReactiveError};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised by [`State`](crate::State) construction and writes.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    /// A change listener failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("state storage failed: {0}")]
    Storage(#[from] StorageError),
}
