#![forbid(unsafe_code)]

//! State container: a [`Reactive`] store that announces every write.
//!
//! # Architecture
//!
//! [`State`] owns the engine and a private [`Broker`] carrying one event kind,
//! [`StateEventKind::StateChange`]. Outside code subscribes through
//! [`State::broker`], a [`ReadOnlyBroker`], so only the state itself can
//! dispatch changes.
//!
//! A write is, in order:
//!
//! 1. [`Reactive::set`] (computed keys recompute);
//! 2. the full snapshot is written to the configured storage, if any;
//! 3. a [`StateChange`] is dispatched carrying the key, its value as read
//!    back after recomputation, and a snapshot of all values.
//!
//! # Failure Modes
//!
//! Each step propagates its error and skips the steps after it. A failed
//! storage write therefore leaves the engine updated but unannounced.

use std::fmt;
use std::rc::Rc;

use evx_core::logging::debug;
use evx_core::{
    Broker, BrokerConfig, EventMap, Reactive, ReactiveConfig, ReactiveOptions, ReadOnlyBroker,
    Snapshot, Tracked,
};

use crate::error::StateError;
use crate::storage::StateStorage;

/// The single event kind a [`State`] dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEventKind {
    StateChange,
}

impl StateEventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StateChange => "state_change",
        }
    }
}

/// Notification sent after every [`State::set`] / [`State::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange<V> {
    /// Key that was written.
    pub key: String,
    /// Value at `key` after recomputation.
    pub value: Option<V>,
    /// Every value after the write.
    pub state: Snapshot<V>,
}

impl<V: 'static> EventMap for StateChange<V> {
    type Kind = StateEventKind;

    fn kind(&self) -> StateEventKind {
        StateEventKind::StateChange
    }

    fn kind_name(kind: StateEventKind) -> String {
        kind.as_str().to_owned()
    }
}

/// What [`State::new`] does with a snapshot found in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestorePolicy {
    /// Read the persisted snapshot and ignore it; start from the initial
    /// state.
    #[default]
    Discard,
    /// Overlay the persisted snapshot onto the initial state.
    Restore,
}

struct StoreBinding<V> {
    storage: Rc<dyn StateStorage<V>>,
    key: String,
}

/// Construction options for [`State`].
pub struct StateInit<V> {
    options: ReactiveOptions<V>,
    store: Option<StoreBinding<V>>,
    restore: RestorePolicy,
    broker_config: BrokerConfig,
}

impl<V> Default for StateInit<V> {
    fn default() -> Self {
        Self {
            options: ReactiveOptions::new(),
            store: None,
            restore: RestorePolicy::default(),
            broker_config: BrokerConfig::default(),
        }
    }
}

impl<V> StateInit<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one initial value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: V) -> Self {
        self.options = self.options.with_value(key, value);
        self
    }

    /// Seed initial values from any `(key, value)` iterator.
    #[must_use]
    pub fn with_state<K, I>(mut self, state: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.options = self.options.with_data(state);
        self
    }

    /// Register a computed key. See [`ReactiveOptions::with_compute`].
    #[must_use]
    pub fn with_compute<F>(mut self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Tracked<'_, V>) -> V + 'static,
    {
        self.options = self.options.with_compute(key, compute);
        self
    }

    /// Persist every change to `storage` under `key`.
    #[must_use]
    pub fn with_store(mut self, storage: Rc<dyn StateStorage<V>>, key: impl Into<String>) -> Self {
        self.store = Some(StoreBinding {
            storage,
            key: key.into(),
        });
        self
    }

    #[must_use]
    pub fn with_restore(mut self, restore: RestorePolicy) -> Self {
        self.restore = restore;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ReactiveConfig) -> Self {
        self.options = self.options.with_config(config);
        self
    }

    #[must_use]
    pub fn with_broker_config(mut self, config: BrokerConfig) -> Self {
        self.broker_config = config;
        self
    }
}

/// Observable, optionally persisted key/value state.
///
/// See the [module docs](self) for the write sequence.
pub struct State<V: 'static> {
    engine: Reactive<V>,
    broker: Broker<StateChange<V>>,
    store: Option<StoreBinding<V>>,
}

impl<V: fmt::Debug + 'static> fmt::Debug for State<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("engine", &self.engine)
            .field("broker", &self.broker)
            .field("store_key", &self.store.as_ref().map(|s| s.key.as_str()))
            .finish()
    }
}

impl<V: Clone + 'static> State<V> {
    /// Build the state and its engine.
    ///
    /// With a store configured the persisted snapshot is read first and then
    /// handled per the [`RestorePolicy`].
    ///
    /// # Errors
    ///
    /// [`StateError::Storage`] when reading the store fails,
    /// [`StateError::Reactive`] when the initial evaluation hits the depth
    /// ceiling.
    pub fn new(init: StateInit<V>) -> Result<Self, StateError> {
        let StateInit {
            mut options,
            store,
            restore,
            broker_config,
        } = init;

        if let Some(binding) = &store
            && let Some(persisted) = binding.storage.get(&binding.key)?
        {
            match restore {
                RestorePolicy::Restore => {
                    debug!(
                        message = "state.restore",
                        key = binding.key.as_str(),
                        entries = persisted.len()
                    );
                    options = options.with_data(persisted);
                }
                RestorePolicy::Discard => {
                    debug!(
                        message = "state.restore_discarded",
                        key = binding.key.as_str(),
                        entries = persisted.len()
                    );
                }
            }
        }

        Ok(Self {
            engine: Reactive::new(options)?,
            broker: Broker::with_config(broker_config),
            store,
        })
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.engine.get(key)
    }

    /// Every current value.
    #[must_use]
    pub fn get_all(&self) -> &Snapshot<V> {
        self.engine.data()
    }

    /// Populated keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.engine.keys()
    }

    /// The underlying engine, read-only.
    #[must_use]
    pub fn engine(&self) -> &Reactive<V> {
        &self.engine
    }

    /// Subscribe-only handle to change notifications.
    #[must_use]
    pub fn broker(&self) -> ReadOnlyBroker<StateChange<V>> {
        self.broker.read_only()
    }

    /// Write `value` at `key`, persist, then announce the change.
    ///
    /// # Errors
    ///
    /// The first failing step's error; see the [module docs](self).
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Result<(), StateError> {
        let key = key.into();
        self.engine.set(key.as_str(), value)?;
        self.commit(key)
    }

    /// Like [`set`](Self::set), with the value produced by `updater` from the
    /// engine as it is before the write.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn update<F>(&mut self, key: impl Into<String>, updater: F) -> Result<(), StateError>
    where
        F: FnOnce(&Reactive<V>) -> V,
    {
        let value = updater(&self.engine);
        self.set(key, value)
    }

    fn commit(&self, key: String) -> Result<(), StateError> {
        let state = self.engine.snapshot();
        if let Some(binding) = &self.store {
            binding.storage.set(&binding.key, &state)?;
        }
        debug!(
            message = "state.set",
            key = key.as_str(),
            persisted = self.store.is_some()
        );
        let value = state.get(&key).cloned();
        self.broker.dispatch(StateChange { key, value, state })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::cell::RefCell;

    fn doubled() -> StateInit<i64> {
        StateInit::new()
            .with_value("a", 1)
            .with_compute("b", |o| o.get_or("a", 0) * 2)
    }

    fn recorder(state: &State<i64>) -> Rc<RefCell<Vec<StateChange<i64>>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        state.broker().on(StateEventKind::StateChange, move |change| {
            sink.borrow_mut().push(change.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn set_recomputes_and_announces() {
        let mut state = State::new(doubled()).unwrap();
        let seen = recorder(&state);

        state.set("a", 5).unwrap();
        assert_eq!(state.get("b"), Some(&10));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].key, "a");
        assert_eq!(seen[0].value, Some(5));
        assert_eq!(seen[0].state.get("b"), Some(&10));
    }

    #[test]
    fn announced_value_is_read_after_recomputation() {
        // A direct write to a computed key holds until one of its inputs changes.
        let mut state = State::new(
            StateInit::new()
                .with_value("src", 1)
                .with_compute("a", |o| o.get_or("src", 0)),
        )
        .unwrap();
        let seen = recorder(&state);

        state.set("a", 9).unwrap();
        state.set("src", 3).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen[0].value, Some(9));
        assert_eq!(seen[1].key, "src");
        assert_eq!(seen[1].state.get("a"), Some(&3));
    }

    #[test]
    fn announced_snapshot_is_detached() {
        let mut state = State::new(doubled()).unwrap();
        let seen = recorder(&state);
        state.set("a", 2).unwrap();
        state.set("a", 3).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen[0].state.get("a"), Some(&2));
        assert_eq!(seen[1].state.get("a"), Some(&3));
    }

    #[test]
    fn update_sees_engine_before_write() {
        let mut state = State::new(doubled()).unwrap();
        state
            .update("a", |engine| engine.get("b").copied().unwrap_or(0) + 1)
            .unwrap();
        assert_eq!(state.get("a"), Some(&3));
        assert_eq!(state.get("b"), Some(&6));
    }

    #[test]
    fn get_all_and_keys() {
        let state = State::new(doubled()).unwrap();
        assert_eq!(state.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(state.get_all().len(), 2);
        assert!(state.engine().is_computed("b"));
    }

    #[test]
    fn every_set_persists_full_snapshot() {
        let storage = Rc::new(MemoryStorage::new());
        let mut state = State::new(doubled().with_store(storage.clone(), "app")).unwrap();
        assert_eq!(storage.writes(), 0);

        state.set("a", 4).unwrap();
        state.set("c", 7).unwrap();
        assert_eq!(storage.writes(), 2);

        let persisted = storage.get("app").unwrap().unwrap();
        assert_eq!(&persisted, state.get_all());
        assert_eq!(persisted.get("b"), Some(&8));
    }

    #[test]
    fn discard_policy_ignores_persisted_state() {
        let persisted: Snapshot<i64> = [("a", 50)].into_iter().collect();
        let storage = Rc::new(MemoryStorage::new().with_entry("app", persisted));
        let state = State::new(doubled().with_store(storage, "app")).unwrap();
        assert_eq!(state.get("a"), Some(&1));
        assert_eq!(state.get("b"), Some(&2));
    }

    #[test]
    fn restore_policy_overlays_persisted_state() {
        let persisted: Snapshot<i64> = [("a", 50), ("extra", 1)].into_iter().collect();
        let storage = Rc::new(MemoryStorage::new().with_entry("app", persisted));
        let state = State::new(
            doubled()
                .with_store(storage, "app")
                .with_restore(RestorePolicy::Restore),
        )
        .unwrap();
        assert_eq!(state.get("a"), Some(&50));
        assert_eq!(state.get("b"), Some(&100));
        assert_eq!(state.get("extra"), Some(&1));
    }

    #[test]
    fn storage_failure_skips_announcement() {
        let storage = Rc::new(MemoryStorage::new());
        let mut state = State::new(doubled().with_store(storage.clone(), "app")).unwrap();
        let seen = recorder(&state);
        storage.set_read_only(true);

        let err = state.set("a", 2).unwrap_err();
        assert!(matches!(err, StateError::Storage(_)));
        assert_eq!(state.get("b"), Some(&4));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn listener_failure_surfaces_as_broker_error() {
        let mut state = State::new(doubled()).unwrap();
        state
            .broker()
            .on(StateEventKind::StateChange, |_| Err("rejected".into()));
        let err = state.set("a", 2).unwrap_err();
        match err {
            StateError::Broker(inner) => assert_eq!(inner.event_type(), Some("state_change")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_surfaces_as_reactive_error() {
        let init = StateInit::new()
            .with_compute("x", |o: &Tracked<'_, i64>| o.get_or("y", 0) + 1)
            .with_compute("y", |o: &Tracked<'_, i64>| o.get_or("x", 0) + 1)
            .with_config(ReactiveConfig::default().with_max_depth(10));
        assert!(matches!(State::new(init), Err(StateError::Reactive(_))));
    }
}
