//! Reactive graph owner
//!
//! The Runtime tracks which atoms and derived views a computation reads,
//! queues effects whose inputs changed and settles them in passes. It is
//! strictly single-threaded: every node holds a `Weak` back-reference to the
//! runtime so dropping the last `Runtime` handle never leaks the graph.

use crate::config::ReactiveSection;
use crate::dataflow::effect::EffectNode;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

pub(crate) type NodeId = u64;

/// Something a computation can depend on (an atom or a derived view).
pub(crate) trait Source {
    fn node_id(&self) -> NodeId;

    /// Brings the node up to date and returns its current version.
    fn refresh(&self) -> u64;

    fn subscribe(&self, observer: Weak<dyn Observer>);
}

/// Something that must hear about upstream changes (a derived view or an effect).
pub(crate) trait Observer {
    fn node_id(&self) -> NodeId;

    fn mark_stale(&self);
}

struct Dependency {
    source: Rc<dyn Source>,
    version: u64,
}

/// Sources read by one computation, with the version each had when read.
#[derive(Default)]
pub(crate) struct Dependencies(Vec<Dependency>);

impl Dependencies {
    fn record(&mut self, source: Rc<dyn Source>, version: u64) {
        let id = source.node_id();
        if !self.0.iter().any(|dep| dep.source.node_id() == id) {
            self.0.push(Dependency { source, version });
        }
    }

    /// True when any source moved past the version seen by the last run.
    pub(crate) fn changed(&self) -> bool {
        self.0.iter().any(|dep| dep.source.refresh() != dep.version)
    }

    /// Re-reads every source version, absorbing writes made by the owner itself.
    pub(crate) fn resnapshot(&mut self) {
        for dep in &mut self.0 {
            dep.version = dep.source.refresh();
        }
    }

    pub(crate) fn subscribe_all(&self, observer: &Weak<dyn Observer>) {
        for dep in &self.0 {
            dep.source.subscribe(observer.clone());
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Observer list kept by every source.
#[derive(Default)]
pub(crate) struct Observers(RefCell<Vec<Weak<dyn Observer>>>);

impl Observers {
    pub(crate) fn add(&self, observer: Weak<dyn Observer>) {
        let Some(candidate) = observer.upgrade() else {
            return;
        };
        let id = candidate.node_id();
        let mut observers = self.0.borrow_mut();
        observers.retain(|existing| existing.strong_count() > 0);
        let known = observers
            .iter()
            .filter_map(Weak::upgrade)
            .any(|existing| existing.node_id() == id);
        if !known {
            observers.push(observer);
        }
    }

    pub(crate) fn notify_all(&self) {
        // Snapshot first: observers may subscribe to us again while being notified.
        let snapshot: Vec<_> = self.0.borrow().iter().cloned().collect();
        for observer in snapshot.iter().filter_map(Weak::upgrade) {
            observer.mark_stale();
        }
    }
}

/// Resets a flag when dropped, including while unwinding.
pub(crate) struct ResetFlag<'a>(pub(crate) &'a Cell<bool>);

impl Drop for ResetFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct PopFrame<'a>(&'a RefCell<Vec<Option<Dependencies>>>);

impl PopFrame<'_> {
    fn finish(self) -> Dependencies {
        let dependencies = self.0.borrow_mut().pop().flatten().unwrap_or_default();
        std::mem::forget(self);
        dependencies
    }
}

impl Drop for PopFrame<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().pop();
    }
}

struct LeaveBatch<'a>(&'a Cell<usize>);

impl Drop for LeaveBatch<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Effects of a pass that did not get to run. If an effect panics, the rest
/// must be able to queue again.
struct UnqueueRemaining(VecDeque<Weak<EffectNode>>);

impl Drop for UnqueueRemaining {
    fn drop(&mut self) {
        for effect in self.0.drain(..).filter_map(|effect| effect.upgrade()) {
            effect.unqueue();
        }
    }
}

pub(crate) struct RuntimeInner {
    next_node_id: Cell<NodeId>,
    batch_depth: Cell<usize>,
    settling: Cell<bool>,
    pending: RefCell<VecDeque<Weak<EffectNode>>>,
    // `None` frames are untracked scopes.
    frames: RefCell<Vec<Option<Dependencies>>>,
    max_settle_passes: usize,
}

impl RuntimeInner {
    pub(crate) fn next_node_id(&self) -> NodeId {
        let id = self.next_node_id.get();
        self.next_node_id.set(id + 1);
        id
    }

    pub(crate) fn track(&self, source: Rc<dyn Source>, version: u64) {
        if let Some(Some(frame)) = self.frames.borrow_mut().last_mut() {
            frame.record(source, version);
        }
    }

    /// Runs `f` in a fresh tracking frame and returns what it read.
    pub(crate) fn collect<R>(&self, f: impl FnOnce() -> R) -> (R, Dependencies) {
        self.frames.borrow_mut().push(Some(Dependencies::default()));
        let frame = PopFrame(&self.frames);
        let value = f();
        (value, frame.finish())
    }

    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.frames.borrow_mut().push(None);
        let _frame = PopFrame(&self.frames);
        f()
    }

    pub(crate) fn enqueue(&self, effect: Weak<EffectNode>) {
        self.pending.borrow_mut().push_back(effect);
    }

    /// Runs queued effects until nothing is pending.
    ///
    /// Does nothing inside a batch or while already settling; writes made by
    /// effects land in the queue and are picked up by the next pass.
    pub(crate) fn settle(&self) {
        if self.batch_depth.get() > 0 || self.settling.get() {
            return;
        }
        self.settling.set(true);
        let _settling = ResetFlag(&self.settling);

        let mut passes = 0;
        loop {
            let queued: Vec<_> = self.pending.borrow_mut().drain(..).collect();
            if queued.is_empty() {
                break;
            }
            passes += 1;
            if passes > self.max_settle_passes {
                let mut dropped = queued;
                dropped.extend(self.pending.borrow_mut().drain(..));
                log::error!(
                    "Reactive graph did not settle after {} passes, dropping {} queued effects",
                    self.max_settle_passes,
                    dropped.len()
                );
                for effect in dropped.iter().filter_map(Weak::upgrade) {
                    effect.unqueue();
                }
                break;
            }
            let mut pass = UnqueueRemaining(queued.into());
            while let Some(effect) = pass.0.pop_front() {
                if let Some(effect) = effect.upgrade() {
                    effect.run_if_stale(self);
                }
            }
        }
    }
}

/// Handle to a reactive graph. Cloning shares the graph.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::Runtime;
///
/// let rt = Runtime::new();
/// let a = rt.atom(1);
/// let b = rt.atom(2);
/// let sum = rt.derive({
///     let (a, b) = (a.clone(), b.clone());
///     move || a.get() + b.get()
/// });
///
/// rt.batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(sum.get(), 30);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub const DEFAULT_MAX_SETTLE_PASSES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_settle_passes(Self::DEFAULT_MAX_SETTLE_PASSES)
    }

    pub fn with_config(config: &ReactiveSection) -> Self {
        Self::with_max_settle_passes(config.max_settle_passes)
    }

    fn with_max_settle_passes(max_settle_passes: usize) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                next_node_id: Cell::new(0),
                batch_depth: Cell::new(0),
                settling: Cell::new(false),
                pending: RefCell::new(VecDeque::new()),
                frames: RefCell::new(Vec::new()),
                max_settle_passes: max_settle_passes.max(1),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    /// Applies every write made by `f` before any effect observes them.
    ///
    /// Batches nest; effects settle once the outermost batch returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
        let result = {
            let _leave = LeaveBatch(&self.inner.batch_depth);
            f()
        };
        self.inner.settle();
        result
    }

    /// Runs `f` without registering any of its reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untrack(f)
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("batch_depth", &self.inner.batch_depth.get())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}
