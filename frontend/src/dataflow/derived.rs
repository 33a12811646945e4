//! Memoized derived views
//!
//! A Derived view is a pure function of atoms and other derived views. It is
//! pull-based: nothing is computed until the view is read, and a read only
//! recomputes when a dependency's version moved since the previous read.

use crate::dataflow::runtime::{
    Dependencies, NodeId, Observer, Observers, ResetFlag, RuntimeInner, Source,
};
use crate::dataflow::Runtime;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct DerivedNode<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    this: Weak<DerivedNode<T>>,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    stale: Cell<bool>,
    computing: Cell<bool>,
    dependencies: RefCell<Dependencies>,
    observers: Observers,
}

impl<T: PartialEq + 'static> DerivedNode<T> {
    fn recompute(&self) {
        self.computing.set(true);
        let (next, dependencies) = {
            let _computing = ResetFlag(&self.computing);
            match self.runtime.upgrade() {
                Some(runtime) => runtime.collect(|| (self.compute)()),
                None => ((self.compute)(), Dependencies::default()),
            }
        };

        let changed = self.value.borrow().as_ref() != Some(&next);
        if changed {
            *self.value.borrow_mut() = Some(next);
            self.version.set(self.version.get() + 1);
        }

        let observer: Weak<dyn Observer> = self.this.clone();
        dependencies.subscribe_all(&observer);
        *self.dependencies.borrow_mut() = dependencies;
        self.stale.set(false);
    }
}

impl<T: PartialEq + 'static> Source for DerivedNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn refresh(&self) -> u64 {
        if self.computing.get() {
            panic!("derived view #{} depends on itself", self.id);
        }
        let has_value = self.value.borrow().is_some();
        if has_value && !self.stale.get() {
            return self.version.get();
        }
        if has_value && !self.dependencies.borrow().changed() {
            self.stale.set(false);
            return self.version.get();
        }
        self.recompute();
        self.version.get()
    }

    fn subscribe(&self, observer: Weak<dyn Observer>) {
        self.observers.add(observer);
    }
}

impl<T> Observer for DerivedNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_stale(&self) {
        if self.stale.replace(true) {
            return;
        }
        self.observers.notify_all();
    }
}

/// Read-only memoized view over other reactive values.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::Runtime;
///
/// let rt = Runtime::new();
/// let readings = rt.atom(vec![20.5, 22.0, 21.0]);
/// let peak = rt.derive({
///     let readings = readings.clone();
///     move || readings.with(|r| r.iter().cloned().fold(f64::MIN, f64::max))
/// });
///
/// assert_eq!(peak.get(), 22.0);
/// readings.update(|r| {
///     let mut next = r.clone();
///     next.push(23.5);
///     next
/// });
/// assert_eq!(peak.get(), 23.5);
/// ```
pub struct Derived<T> {
    node: Rc<DerivedNode<T>>,
}

impl<T: PartialEq + 'static> Derived<T> {
    pub(crate) fn new(runtime: &Runtime, compute: impl Fn() -> T + 'static) -> Self {
        let id = runtime.inner().next_node_id();
        let node = Rc::new_cyclic(|this| DerivedNode {
            id,
            runtime: runtime.downgrade(),
            this: this.clone(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            version: Cell::new(0),
            stale: Cell::new(true),
            computing: Cell::new(false),
            dependencies: RefCell::new(Dependencies::default()),
            observers: Observers::default(),
        });
        Self { node }
    }

    /// Reads the (possibly recomputed) value through a reference, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let version = self.node.refresh();
        if let Some(runtime) = self.node.runtime.upgrade() {
            runtime.track(self.node.clone(), version);
        }
        self.read(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.node.refresh();
        self.read(f)
    }

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.node.value.borrow().as_ref() {
            Some(value) => f(value),
            None => unreachable!("derived view #{} read before computing", self.node.id),
        }
    }

    /// Number of distinct values produced so far.
    pub fn version(&self) -> u64 {
        self.node.refresh()
    }
}

impl<T: PartialEq + Clone + 'static> Derived<T> {
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("value", &*self.node.value.borrow())
            .field("stale", &self.node.stale.get())
            .finish()
    }
}

impl Runtime {
    /// Creates a memoized view computed by `compute`.
    pub fn derive<T: PartialEq + 'static>(&self, compute: impl Fn() -> T + 'static) -> Derived<T> {
        Derived::new(self, compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn counted<T, F: Fn() -> T>(calls: &Rc<Cell<usize>>, f: F) -> impl Fn() -> T + use<T, F> {
        let calls = calls.clone();
        move || {
            calls.set(calls.get() + 1);
            f()
        }
    }

    #[test]
    fn test_derived_is_lazy() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let a = rt.atom(2);
        let doubled = rt.derive(counted(&calls, {
            let a = a.clone();
            move || a.get() * 2
        }));

        assert_eq!(calls.get(), 0);
        assert_eq!(doubled.get(), 4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_memoized_until_dependency_changes() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let c1 = rt.atom(1);
        let c2 = rt.atom(10);
        let sum = rt.derive(counted(&calls, {
            let (c1, c2) = (c1.clone(), c2.clone());
            move || c1.get() + c2.get()
        }));

        assert_eq!(sum.get(), 11);
        assert_eq!(sum.get(), 11);
        assert_eq!(sum.get(), 11);
        assert_eq!(calls.get(), 1);

        c2.set(20);
        assert_eq!(sum.get(), 21);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_two_updates_in_one_batch_recompute_once() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let start = rt.atom(0);
        let end = rt.atom(10);
        let span = rt.derive(counted(&calls, {
            let (start, end) = (start.clone(), end.clone());
            move || end.get() - start.get()
        }));
        assert_eq!(span.get(), 10);

        rt.batch(|| {
            start.set(100);
            end.set(160);
        });
        assert_eq!(span.get(), 60);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_unchanged_result_does_not_invalidate_downstream() {
        let rt = Runtime::new();
        let downstream_calls = Rc::new(Cell::new(0));
        let temperature = rt.atom(21.3_f64);
        let rounded = rt.derive({
            let temperature = temperature.clone();
            move || temperature.get().round() as i64
        });
        let label = rt.derive(counted(&downstream_calls, {
            let rounded = rounded.clone();
            move || format!("{} °C", rounded.get())
        }));

        assert_eq!(label.get(), "21 °C");
        temperature.set(21.4);
        assert_eq!(label.get(), "21 °C");
        assert_eq!(downstream_calls.get(), 1);

        temperature.set(22.6);
        assert_eq!(label.get(), "23 °C");
        assert_eq!(downstream_calls.get(), 2);
    }

    #[test]
    fn test_dependencies_follow_branches() {
        let rt = Runtime::new();
        let use_celsius = rt.atom(true);
        let celsius = rt.atom(20.0_f64);
        let fahrenheit = rt.atom(68.0_f64);
        let calls = Rc::new(Cell::new(0));
        let shown = rt.derive(counted(&calls, {
            let (use_celsius, celsius, fahrenheit) =
                (use_celsius.clone(), celsius.clone(), fahrenheit.clone());
            move || if use_celsius.get() { celsius.get() } else { fahrenheit.get() }
        }));

        assert_eq!(shown.get(), 20.0);
        fahrenheit.set(70.0);
        assert_eq!(shown.get(), 20.0);
        assert_eq!(calls.get(), 1);

        use_celsius.set(false);
        assert_eq!(shown.get(), 70.0);
        celsius.set(25.0);
        assert_eq!(shown.get(), 70.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_untracked_read_does_not_invalidate() {
        let rt = Runtime::new();
        let a = rt.atom(1);
        let b = rt.atom(100);
        let calls = Rc::new(Cell::new(0));
        let mixed = rt.derive(counted(&calls, {
            let (a, b) = (a.clone(), b.clone());
            move || a.get() + b.get_untracked()
        }));

        assert_eq!(mixed.get(), 101);
        b.set(200);
        assert_eq!(mixed.get(), 101);
        a.set(2);
        assert_eq!(mixed.get(), 202);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    #[should_panic(expected = "depends on itself")]
    fn test_self_dependency_panics() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let looped = rt.derive({
            let slot = slot.clone();
            move || slot.borrow().as_ref().map_or(0, |me| me.get() + 1)
        });
        *slot.borrow_mut() = Some(looped.clone());
        looped.get();
    }
}
