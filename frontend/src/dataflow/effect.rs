//! Effect triggers
//!
//! Effects run side effects (data loads, timers, persistence) whenever the
//! reactive values they read change. They are torn down when their handle is
//! dropped, so a view model owns its effects as plain fields.

use crate::dataflow::Runtime;
use crate::dataflow::runtime::{Dependencies, NodeId, Observer, ResetFlag, RuntimeInner};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub(crate) struct EffectNode {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    this: Weak<EffectNode>,
    run: RefCell<Box<dyn FnMut()>>,
    dependencies: RefCell<Dependencies>,
    pristine: Cell<bool>,
    queued: Cell<bool>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    runs: Cell<u64>,
}

impl EffectNode {
    pub(crate) fn unqueue(&self) {
        self.queued.set(false);
    }

    /// Called by the runtime while settling.
    pub(crate) fn run_if_stale(&self, runtime: &RuntimeInner) {
        self.queued.set(false);
        if self.disposed.get() {
            return;
        }
        if !self.pristine.get() && !self.dependencies.borrow().changed() {
            return;
        }
        self.pristine.set(false);

        self.running.set(true);
        let mut dependencies = {
            let _running = ResetFlag(&self.running);
            let ((), dependencies) = runtime.collect(|| {
                let mut run = self.run.borrow_mut();
                (*run)()
            });
            dependencies
        };
        // Writes the effect made to its own inputs must not re-trigger it.
        dependencies.resnapshot();
        let observer: Weak<dyn Observer> = self.this.clone();
        dependencies.subscribe_all(&observer);
        *self.dependencies.borrow_mut() = dependencies;
        self.runs.set(self.runs.get() + 1);
    }
}

impl Observer for EffectNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_stale(&self) {
        if self.disposed.get() || self.running.get() || self.queued.get() {
            return;
        }
        self.queued.set(true);
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.enqueue(self.this.clone());
        }
    }
}

/// Handle of a registered effect. Dropping it tears the effect down.
#[must_use = "an effect stops as soon as its handle is dropped"]
pub struct Effect {
    node: Rc<EffectNode>,
}

impl Effect {
    fn register(runtime: &Runtime, run: Box<dyn FnMut()>) -> Self {
        let id = runtime.inner().next_node_id();
        let node = Rc::new_cyclic(|this| EffectNode {
            id,
            runtime: runtime.downgrade(),
            this: this.clone(),
            run: RefCell::new(run),
            dependencies: RefCell::new(Dependencies::default()),
            pristine: Cell::new(true),
            queued: Cell::new(true),
            running: Cell::new(false),
            disposed: Cell::new(false),
            runs: Cell::new(0),
        });
        runtime.inner().enqueue(Rc::downgrade(&node));
        runtime.inner().settle();
        Self { node }
    }

    /// How many times the effect body has run.
    pub fn runs(&self) -> u64 {
        self.node.runs.get()
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        self.node.disposed.set(true);
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.node.id)
            .field("runs", &self.node.runs.get())
            .finish()
    }
}

impl Runtime {
    /// Runs `f` now and again whenever anything it read changes.
    ///
    /// Inside a batch the first run waits for the batch to end.
    pub fn effect(&self, f: impl FnMut() + 'static) -> Effect {
        Effect::register(self, Box::new(f))
    }

    /// Calls `handler` with the value of `source` once it is available and
    /// every time it changes afterwards.
    ///
    /// `source` is tracked and returns `None` while any input is missing;
    /// `handler` is not tracked, so it may read or write freely without
    /// subscribing the effect to what it touches.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dashboard_frontend::dataflow::Runtime;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let rt = Runtime::new();
    /// let range = rt.atom(None::<(i64, i64)>);
    /// let timezone = rt.atom(None::<i32>);
    /// let fetches = Rc::new(Cell::new(0));
    ///
    /// let _load = rt.watch(
    ///     {
    ///         let (range, timezone) = (range.clone(), timezone.clone());
    ///         move || Some((range.get()?, timezone.get()?))
    ///     },
    ///     {
    ///         let fetches = fetches.clone();
    ///         move |_| fetches.set(fetches.get() + 1)
    ///     },
    /// );
    /// assert_eq!(fetches.get(), 0);
    ///
    /// rt.batch(|| {
    ///     range.set(Some((0, 3600)));
    ///     timezone.set(Some(-300));
    /// });
    /// assert_eq!(fetches.get(), 1);
    /// ```
    pub fn watch<D>(
        &self,
        source: impl Fn() -> Option<D> + 'static,
        mut handler: impl FnMut(D) + 'static,
    ) -> Effect
    where
        D: PartialEq + Clone + 'static,
    {
        let runtime = self.downgrade();
        let mut last: Option<D> = None;
        self.effect(move || {
            let Some(current) = source() else {
                last = None;
                return;
            };
            if last.as_ref() == Some(&current) {
                return;
            }
            last = Some(current.clone());
            match runtime.upgrade() {
                Some(runtime) => runtime.untrack(|| handler(current)),
                None => handler(current),
            }
        })
    }
}
