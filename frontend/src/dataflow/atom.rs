//! Reactive cell
//!
//! Atom is the unit of view state: a single value with synchronous reads and
//! atomic replacement writes. Reads made inside a derived view or an effect are
//! tracked automatically; `*_untracked` reads are not.

use crate::dataflow::runtime::{NodeId, Observer, Observers, RuntimeInner, Source};
use crate::dataflow::Runtime;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct AtomNode<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
    version: Cell<u64>,
    observers: Observers,
}

impl<T> AtomNode<T> {
    fn commit(&self) {
        self.version.set(self.version.get() + 1);
        self.observers.notify_all();
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.settle();
        }
    }
}

impl<T: 'static> Source for AtomNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn refresh(&self) -> u64 {
        self.version.get()
    }

    fn subscribe(&self, observer: Weak<dyn Observer>) {
        self.observers.add(observer);
    }
}

/// Mutable observable value owned by a view model.
///
/// Cloning an Atom shares the same cell.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::Runtime;
///
/// let rt = Runtime::new();
/// let counter = rt.atom(0);
///
/// counter.set(5);
/// counter.update(|n| n + 1);
/// assert_eq!(counter.get(), 6);
///
/// // No commit when the value is unchanged
/// counter.set_neq(6);
/// ```
pub struct Atom<T> {
    node: Rc<AtomNode<T>>,
}

impl<T: 'static> Atom<T> {
    pub(crate) fn new(runtime: &Runtime, initial: T) -> Self {
        Self {
            node: Rc::new(AtomNode {
                id: runtime.inner().next_node_id(),
                runtime: runtime.downgrade(),
                value: RefCell::new(initial),
                version: Cell::new(0),
                observers: Observers::default(),
            }),
        }
    }

    fn track(&self) {
        if let Some(runtime) = self.node.runtime.upgrade() {
            runtime.track(self.node.clone(), self.node.version.get());
        }
    }

    /// Reads the value through a reference, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.node.value.borrow())
    }

    /// Reads the value through a reference without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.node.value.borrow())
    }

    /// Replaces the value and notifies dependents.
    ///
    /// Panics if called while a `with` closure of the same atom is running.
    pub fn set(&self, value: T) {
        let previous = self.node.value.replace(value);
        drop(previous);
        self.node.commit();
    }

    /// Replaces the value only when it differs from the current one.
    pub fn set_neq(&self, value: T)
    where
        T: PartialEq,
    {
        if *self.node.value.borrow() != value {
            self.set(value);
        }
    }

    /// Read-modify-write against the current value.
    ///
    /// If `f` panics, the atom keeps its previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.node.value.borrow());
        self.set(next);
    }

    /// Like `update`, but `f` may refuse the change.
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> Result<T, E>) -> Result<(), E> {
        let next = f(&self.node.value.borrow())?;
        self.set(next);
        Ok(())
    }

    /// Number of commits so far.
    pub fn version(&self) -> u64 {
        self.node.version.get()
    }

    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly { atom: self.clone() }
    }
}

impl<T: Clone + 'static> Atom<T> {
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("value", &*self.node.value.borrow())
            .field("version", &self.node.version.get())
            .finish()
    }
}

/// Read side of an Atom, handed out to components that may observe but not write.
pub struct ReadOnly<T> {
    atom: Atom<T>,
}

impl<T: 'static> ReadOnly<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.atom.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.atom.with_untracked(f)
    }

    pub fn version(&self) -> u64 {
        self.atom.version()
    }
}

impl<T: Clone + 'static> ReadOnly<T> {
    pub fn get(&self) -> T {
        self.atom.get()
    }

    pub fn get_untracked(&self) -> T {
        self.atom.get_untracked()
    }
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.atom).finish()
    }
}

impl Runtime {
    /// Creates a new atom owned by this runtime.
    pub fn atom<T: 'static>(&self, initial: T) -> Atom<T> {
        Atom::new(self, initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_atom_basic_functionality() {
        let rt = Runtime::new();
        let atom = rt.atom(42);
        assert_eq!(atom.get(), 42);

        atom.set(100);
        assert_eq!(atom.get(), 100);
        assert_eq!(atom.version(), 1);
    }

    #[test]
    fn test_update_uses_current_value() {
        let rt = Runtime::new();
        let atom = rt.atom(1);
        let handle = atom.clone();

        atom.set(10);
        handle.update(|n| n * 2);
        atom.update(|n| n + 1);
        assert_eq!(atom.get(), 21);
    }

    #[test]
    fn test_panicking_update_leaves_value_unchanged() {
        let rt = Runtime::new();
        let atom = rt.atom(String::from("kept"));

        let result = catch_unwind(AssertUnwindSafe(|| {
            atom.update(|_| panic!("formatter blew up"));
        }));
        assert!(result.is_err());
        assert_eq!(atom.get(), "kept");
        assert_eq!(atom.version(), 0);
    }

    #[test]
    fn test_try_update_rejects_without_commit() {
        let rt = Runtime::new();
        let setpoint = rt.atom(21.0_f64);

        let rejected = setpoint.try_update(|_| Err("out of range"));
        assert_eq!(rejected, Err("out of range"));
        assert_eq!(setpoint.version(), 0);

        setpoint.try_update(|t| Ok::<_, ()>(t + 0.5)).unwrap();
        assert_eq!(setpoint.get(), 21.5);
    }

    #[test]
    fn test_set_neq_skips_equal_values() {
        let rt = Runtime::new();
        let atom = rt.atom(5);

        atom.set_neq(5);
        assert_eq!(atom.version(), 0);
        atom.set_neq(6);
        assert_eq!(atom.version(), 1);
        // Plain set always commits.
        atom.set(6);
        assert_eq!(atom.version(), 2);
    }

    #[test]
    fn test_read_only_follows_writer() {
        let rt = Runtime::new();
        let atom = rt.atom(vec![1, 2]);
        let reader = atom.read_only();

        atom.update(|v| v.iter().map(|n| n * 10).collect());
        assert_eq!(reader.get(), vec![10, 20]);
        assert_eq!(reader.with(Vec::len), 2);
    }

    proptest! {
        #[test]
        fn prop_read_returns_last_write(ops in prop::collection::vec((any::<bool>(), any::<i32>()), 1..40)) {
            let rt = Runtime::new();
            let atom = rt.atom(0_i64);
            let mut expected = 0_i64;

            for (is_set, n) in ops {
                if is_set {
                    atom.set(i64::from(n));
                    expected = i64::from(n);
                } else {
                    atom.update(|v| v.wrapping_add(i64::from(n)));
                    expected = expected.wrapping_add(i64::from(n));
                }
            }
            prop_assert_eq!(atom.get(), expected);
        }
    }
}
