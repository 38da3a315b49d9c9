#![forbid(unsafe_code)]

//! The [`Reactive`] store and its construction options.
//!
//! # Design
//!
//! The store owns its data, its compute functions and the dependency table.
//! Compute functions never see the store itself, only a [`Tracked`] view of
//! the data, so reads during computation are always observed and a computer
//! cannot write back into the store mid-evaluation.
//!
//! Recomputation is eager: a write returns only after every affected
//! computed key has been re-evaluated.

use std::fmt;

use ahash::AHashMap;

use super::ReactiveConfig;
use super::snapshot::{Snapshot, Tracked};
use crate::error::ReactiveError;
use crate::logging::{trace, warn};

/// Compute function for one key: a function of the current data.
pub type ComputeFn<V> = Box<dyn Fn(&Tracked<'_, V>) -> V>;

/// Hook run after every external [`Reactive::set`] with the written key, its
/// value and the data after recomputation.
pub type OnSetFn<V> = Box<dyn FnMut(&str, &V, &Snapshot<V>)>;

/// Construction options for [`Reactive`].
pub struct ReactiveOptions<V> {
    initial_data: Snapshot<V>,
    compute: Vec<(String, ComputeFn<V>)>,
    on_set: Option<OnSetFn<V>>,
    config: ReactiveConfig,
}

impl<V> Default for ReactiveOptions<V> {
    fn default() -> Self {
        Self {
            initial_data: Snapshot::new(),
            compute: Vec::new(),
            on_set: None,
            config: ReactiveConfig::default(),
        }
    }
}

impl<V> ReactiveOptions<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one initial value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: V) -> Self {
        self.initial_data.insert(key, value);
        self
    }

    /// Seed initial values from any `(key, value)` iterator.
    #[must_use]
    pub fn with_data<K, I>(mut self, data: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.initial_data.extend(data);
        self
    }

    /// Register the compute function for `key`.
    ///
    /// Registration order is evaluation order. Registering a key twice
    /// replaces the function and keeps the original position.
    #[must_use]
    pub fn with_compute<F>(mut self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Tracked<'_, V>) -> V + 'static,
    {
        let key = key.into();
        let compute: ComputeFn<V> = Box::new(compute);
        match self.compute.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = compute,
            None => self.compute.push((key, compute)),
        }
        self
    }

    /// Run `hook` after every external write.
    #[must_use]
    pub fn on_set<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&str, &V, &Snapshot<V>) + 'static,
    {
        self.on_set = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ReactiveConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }
}

/// Observable key/value store with computed keys.
///
/// See the [module docs](super) for the update model.
pub struct Reactive<V> {
    data: Snapshot<V>,
    /// Fixed at construction; registration order is evaluation order.
    computers: Vec<(String, ComputeFn<V>)>,
    /// Computed key -> keys read during its last evaluation (never itself).
    deps: AHashMap<String, Vec<String>>,
    on_set: Option<OnSetFn<V>>,
    config: ReactiveConfig,
    computations: u64,
}

impl<V: fmt::Debug> fmt::Debug for Reactive<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("data", &self.data)
            .field("deps", &self.deps)
            .field("computations", &self.computations)
            .field("config", &self.config)
            .finish()
    }
}

impl<V> Reactive<V> {
    /// Build a store: copy the initial data in, then evaluate every compute
    /// function once in registration order.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::CircularDependency`] when the initial evaluation
    /// already cascades past the depth ceiling.
    pub fn new(options: ReactiveOptions<V>) -> Result<Self, ReactiveError> {
        let ReactiveOptions {
            initial_data,
            compute,
            on_set,
            config,
        } = options;

        let mut store = Self {
            data: initial_data,
            computers: compute,
            deps: AHashMap::new(),
            on_set,
            config,
            computations: 0,
        };
        let keys: Vec<String> = store.computers.iter().map(|(k, _)| k.clone()).collect();
        store.compute(&keys, 0)?;
        Ok(store)
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    /// Read-only view of all current values.
    #[must_use]
    pub fn data(&self) -> &Snapshot<V> {
        &self.data
    }

    /// Populated keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write `key` and recompute everything that depends on it.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::CircularDependency`] when the cascade exceeds
    /// [`ReactiveConfig::max_depth`]. Values written before that point stay
    /// written.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Result<(), ReactiveError> {
        let key = key.into();
        self.set_value(&key, value, 0)?;
        if let Some(hook) = self.on_set.as_mut()
            && let Some(value) = self.data.get(&key)
        {
            hook(&key, value, &self.data);
        }
        Ok(())
    }

    /// Keys read by `key`'s compute function during its last evaluation.
    ///
    /// `None` for keys without a compute function.
    #[must_use]
    pub fn dependencies(&self, key: &str) -> Option<&[String]> {
        self.deps.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.computers.iter().any(|(k, _)| k == key)
    }

    /// Computed keys in registration order.
    pub fn computed_keys(&self) -> impl Iterator<Item = &str> {
        self.computers.iter().map(|(k, _)| k.as_str())
    }

    /// Total compute-function invocations since construction.
    #[must_use]
    pub fn computations(&self) -> u64 {
        self.computations
    }

    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        &self.config
    }

    fn set_value(&mut self, key: &str, value: V, depth: usize) -> Result<(), ReactiveError> {
        if depth > self.config.max_depth {
            warn!(
                message = "reactive.circular_dependency",
                key,
                max_depth = self.config.max_depth
            );
            return Err(ReactiveError::CircularDependency {
                depth: self.config.max_depth,
            });
        }

        self.data.insert(key, value);

        let dependents = self.dependents_of(key);
        if dependents.is_empty() {
            return Ok(());
        }
        self.compute(&dependents, depth + 1)
    }

    /// Computed keys whose last evaluation read `key`, in registration order.
    fn dependents_of(&self, key: &str) -> Vec<String> {
        self.computers
            .iter()
            .filter(|(k, _)| {
                self.deps
                    .get(k)
                    .is_some_and(|read| read.iter().any(|r| r == key))
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn compute(&mut self, keys: &[String], depth: usize) -> Result<(), ReactiveError> {
        for key in keys {
            let Some(index) = self.computers.iter().position(|(k, _)| k == key) else {
                continue;
            };

            let tracked = Tracked::new(&self.data);
            let value = (self.computers[index].1)(&tracked);
            let mut observed = tracked.into_observed();
            // A computer reading its own key must not retrigger itself.
            observed.retain(|k| k != key);

            self.computations += 1;
            trace!(
                message = "reactive.recompute",
                key = key.as_str(),
                depth,
                deps = observed.len()
            );
            self.deps.insert(key.clone(), observed);

            self.set_value(key, value, depth)?;
        }
        Ok(())
    }
}

impl<V: Clone> Reactive<V> {
    /// Owned copy of all current values.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<V> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn deps(store: &Reactive<i64>, key: &str) -> Vec<String> {
        store.dependencies(key).unwrap_or_default().to_vec()
    }

    #[test]
    fn computed_value_follows_source() {
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 1)
                .with_compute("b", |o| o.get_or("a", 0) * 2),
        )
        .unwrap();
        assert_eq!(store.get("b"), Some(&2));

        store.set("a", 5).unwrap();
        assert_eq!(store.get("b"), Some(&10));
    }

    #[test]
    fn construction_seeds_deps_for_keys_without_values() {
        let store: Reactive<i64> = Reactive::new(
            ReactiveOptions::new().with_compute("total", |o| {
                o.get_or("x", 0) + o.get_or("y", 0)
            }),
        )
        .unwrap();

        assert_eq!(store.get("total"), Some(&0));
        assert_eq!(deps(&store, "total"), ["x", "y"]);
        assert!(!store.contains_key("x"));
    }

    #[test]
    fn late_value_for_unseen_key_triggers_recompute() {
        let mut store: Reactive<i64> = Reactive::new(
            ReactiveOptions::new().with_compute("total", |o| {
                o.get_or("x", 0) + o.get_or("y", 0)
            }),
        )
        .unwrap();

        store.set("y", 4).unwrap();
        assert_eq!(store.get("total"), Some(&4));
    }

    #[test]
    fn self_read_is_not_a_dependency() {
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("step", 1)
                .with_compute("count", |o| o.get_or("count", 0) + o.get_or("step", 0)),
        )
        .unwrap();

        assert_eq!(deps(&store, "count"), ["step"]);
        assert_eq!(store.get("count"), Some(&1));

        // Writing the key itself does not recompute it.
        let before = store.computations();
        store.set("count", 10).unwrap();
        assert_eq!(store.computations(), before);
        assert_eq!(store.get("count"), Some(&10));

        store.set("step", 2).unwrap();
        assert_eq!(store.get("count"), Some(&12));
    }

    #[test]
    fn dependencies_follow_the_last_branch_taken() {
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_data([("use_a", 1), ("a", 10), ("b", 20)])
                .with_compute("pick", |o| {
                    if o.get_or("use_a", 0) != 0 {
                        o.get_or("a", 0)
                    } else {
                        o.get_or("b", 0)
                    }
                }),
        )
        .unwrap();
        assert_eq!(store.get("pick"), Some(&10));
        assert_eq!(deps(&store, "pick"), ["use_a", "a"]);

        store.set("use_a", 0).unwrap();
        assert_eq!(store.get("pick"), Some(&20));
        assert_eq!(deps(&store, "pick"), ["use_a", "b"]);

        // The stale edge to `a` is gone.
        let before = store.computations();
        store.set("a", 99).unwrap();
        assert_eq!(store.computations(), before);
        assert_eq!(store.get("pick"), Some(&20));
    }

    #[test]
    fn chain_cascades_through_computed_keys() {
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 1)
                .with_compute("b", |o| o.get_or("a", 0) + 1)
                .with_compute("c", |o| o.get_or("b", 0) * 10),
        )
        .unwrap();
        assert_eq!(store.get("c"), Some(&20));

        store.set("a", 4).unwrap();
        assert_eq!(store.get("b"), Some(&5));
        assert_eq!(store.get("c"), Some(&50));
    }

    #[test]
    fn diamond_settles_consistently() {
        // a -> b, a -> c, (b, c) -> d
        let d_runs = Rc::new(Cell::new(0u32));
        let d_runs_in = Rc::clone(&d_runs);
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 10)
                .with_compute("b", |o| o.get_or("a", 0) + 1)
                .with_compute("c", |o| o.get_or("a", 0) * 2)
                .with_compute("d", move |o| {
                    d_runs_in.set(d_runs_in.get() + 1);
                    o.get_or("b", 0) + o.get_or("c", 0)
                }),
        )
        .unwrap();
        assert_eq!(store.get("d"), Some(&31));

        d_runs.set(0);
        store.set("a", 5).unwrap();
        assert_eq!(store.get("b"), Some(&6));
        assert_eq!(store.get("c"), Some(&10));
        assert_eq!(store.get("d"), Some(&16));
        // Reached once through b and once through c.
        assert_eq!(d_runs.get(), 2);
    }

    #[test]
    fn dependents_recompute_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2, o3) = (Rc::clone(&order), Rc::clone(&order), Rc::clone(&order));
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("src", 0)
                .with_compute("z", move |o| {
                    o1.borrow_mut().push("z");
                    o.get_or("src", 0)
                })
                .with_compute("a", move |o| {
                    o2.borrow_mut().push("a");
                    o.get_or("src", 0)
                })
                .with_compute("m", move |o| {
                    o3.borrow_mut().push("m");
                    o.get_or("src", 0)
                }),
        )
        .unwrap();
        assert_eq!(*order.borrow(), ["z", "a", "m"]);

        order.borrow_mut().clear();
        store.set("src", 1).unwrap();
        assert_eq!(*order.borrow(), ["z", "a", "m"]);
    }

    #[test]
    fn cycle_active_at_construction_fails() {
        let result: Result<Reactive<i64>, _> = Reactive::new(
            ReactiveOptions::new()
                .with_max_depth(20)
                .with_compute("a", |o| o.get_or("b", 0) + 1)
                .with_compute("b", |o| o.get_or("a", 0) + 1),
        );
        assert!(matches!(
            result,
            Err(ReactiveError::CircularDependency { depth: 20 })
        ));
    }

    /// `a` only reads `b` once `on` is set, so the cycle is dormant until then.
    fn dormant_cycle(max_depth: usize, runs: Rc<Cell<u64>>) -> Reactive<i64> {
        let runs_a = Rc::clone(&runs);
        Reactive::new(
            ReactiveOptions::new()
                .with_max_depth(max_depth)
                .with_value("on", 0)
                .with_compute("a", move |o| {
                    runs_a.set(runs_a.get() + 1);
                    if o.get_or("on", 0) != 0 {
                        o.get_or("b", 0) + 1
                    } else {
                        0
                    }
                })
                .with_compute("b", move |o| {
                    runs.set(runs.get() + 1);
                    o.get_or("a", 0) + 1
                }),
        )
        .unwrap()
    }

    #[test]
    fn cycle_fails_after_exactly_ceiling_plus_one_computations() {
        let runs = Rc::new(Cell::new(0u64));
        let mut store = dormant_cycle(10, Rc::clone(&runs));
        runs.set(0);

        let err = store.set("on", 1).unwrap_err();
        assert_eq!(err, ReactiveError::CircularDependency { depth: 10 });
        // Depths 1..=10 succeed; the computation at depth 11 is rejected on write.
        assert_eq!(runs.get(), 11);
    }

    #[test]
    fn cycle_keeps_partial_writes() {
        let runs = Rc::new(Cell::new(0u64));
        let mut store = dormant_cycle(10, runs);
        assert!(store.set("on", 1).is_err());

        assert_eq!(store.get("on"), Some(&1));
        // Values kept climbing until the ceiling was hit.
        assert!(store.get("a").copied().unwrap_or_default() > 1);
        assert!(store.get("b").copied().unwrap_or_default() > 1);
    }

    #[test]
    fn default_ceiling_is_one_thousand() {
        // Deep recursion; give the cascade a roomy stack.
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let runs = Rc::new(Cell::new(0u64));
                let mut store = dormant_cycle(DEFAULT_DEPTH, Rc::clone(&runs));
                runs.set(0);
                let err = store.set("on", 1).unwrap_err();
                (err, runs.get())
            })
            .unwrap();
        let (err, runs) = handle.join().unwrap();
        assert_eq!(err, ReactiveError::CircularDependency { depth: 1000 });
        assert_eq!(runs, 1001);
    }

    const DEFAULT_DEPTH: usize = crate::reactive::DEFAULT_MAX_DEPTH;

    #[test]
    fn writing_a_computed_key_overrides_until_next_recompute() {
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 1)
                .with_compute("b", |o| o.get_or("a", 0) * 2),
        )
        .unwrap();

        store.set("b", 100).unwrap();
        assert_eq!(store.get("b"), Some(&100));

        store.set("a", 3).unwrap();
        assert_eq!(store.get("b"), Some(&6));
    }

    #[test]
    fn on_set_sees_recomputed_data() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let mut store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 1)
                .with_compute("b", |o| o.get_or("a", 0) * 2)
                .on_set(move |key, value, data| {
                    seen_in
                        .borrow_mut()
                        .push((key.to_owned(), *value, data.get("b").copied()));
                }),
        )
        .unwrap();
        // Construction does not call the hook.
        assert!(seen.borrow().is_empty());

        store.set("a", 7).unwrap();
        assert_eq!(*seen.borrow(), [("a".to_owned(), 7, Some(14))]);
    }

    #[test]
    fn keys_keep_insertion_order() {
        let store = Reactive::new(
            ReactiveOptions::new()
                .with_value("z", 1)
                .with_value("a", 2)
                .with_compute("m", |o| o.get_or("z", 0)),
        )
        .unwrap();
        assert_eq!(store.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
        assert_eq!(store.computed_keys().collect::<Vec<_>>(), ["m"]);
        assert!(store.is_computed("m"));
        assert!(!store.is_computed("z"));
        assert_eq!(store.dependencies("z"), None);
    }

    #[test]
    fn registering_a_computer_twice_replaces_it() {
        let store = Reactive::new(
            ReactiveOptions::new()
                .with_value("a", 3)
                .with_compute("b", |o| o.get_or("a", 0))
                .with_compute("c", |_| 0)
                .with_compute("b", |o| o.get_or("a", 0) * 100),
        )
        .unwrap();
        assert_eq!(store.get("b"), Some(&300));
        assert_eq!(store.computed_keys().collect::<Vec<_>>(), ["b", "c"]);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut store = Reactive::new(ReactiveOptions::new().with_value("a", 1)).unwrap();
        let snap = store.snapshot();
        store.set("a", 2).unwrap();
        assert_eq!(snap.get("a"), Some(&1));
        assert_eq!(store.get("a"), Some(&2));
    }

    #[test]
    fn debug_format() {
        let store = Reactive::new(ReactiveOptions::new().with_value("a", 42)).unwrap();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("Reactive"));
        assert!(dbg.contains("42"));
    }

    #[cfg(feature = "tracing")]
    mod tracing_capture {
        use super::*;
        use std::sync::{Arc, Mutex};
        use tracing::Subscriber;
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::{Context, SubscriberExt};

        struct MessageCapture {
            messages: Arc<Mutex<Vec<String>>>,
        }

        impl<S: Subscriber> Layer<S> for MessageCapture {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                struct Msg {
                    message: Option<String>,
                }
                impl tracing::field::Visit for Msg {
                    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                        if field.name() == "message" {
                            self.message = Some(value.to_string());
                        }
                    }

                    fn record_debug(
                        &mut self,
                        field: &tracing::field::Field,
                        value: &dyn std::fmt::Debug,
                    ) {
                        if field.name() == "message" {
                            self.message =
                                Some(format!("{value:?}").trim_matches('"').to_string());
                        }
                    }
                }
                let mut msg = Msg { message: None };
                event.record(&mut msg);
                if let Some(message) = msg.message {
                    self.messages.lock().expect("capture lock").push(message);
                }
            }
        }

        #[test]
        fn recompute_and_cycle_events_emitted() {
            let messages = Arc::new(Mutex::new(Vec::new()));
            let subscriber = tracing_subscriber::registry().with(MessageCapture {
                messages: Arc::clone(&messages),
            });
            let _guard = tracing::subscriber::set_default(subscriber);

            let mut store = dormant_cycle(5, Rc::new(Cell::new(0)));
            assert!(store.set("on", 1).is_err());

            let messages = messages.lock().expect("capture lock");
            assert!(messages.iter().any(|m| m == "reactive.recompute"));
            assert!(
                messages.iter().any(|m| m == "reactive.circular_dependency"),
                "expected reactive.circular_dependency warning"
            );
        }
    }
}
