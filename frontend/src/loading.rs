//! Async reconciliation of fetched data into view state
//!
//! A `Reconciler` owns one `LoadState` atom. Each `run` takes a ticket; when
//! the fetch completes, its result is merged only if no newer `run` (or
//! `reset`/`abandon`) happened meanwhile. Superseded requests keep running at
//! the transport level, their results are simply dropped.

use crate::dataflow::{Atom, ReadOnly, Runtime};
use crate::errors::{ErrorKind, ErrorPolicy, ErrorSink, TransportError};
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::future::Future;
use std::rc::Rc;

/// Loading/success/error wrapper for fetched data.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadState<T> {
    pub value: Option<T>,
    pub is_loading: bool,
    pub error: Option<ErrorKind>,
}

impl<T> LoadState<T> {
    pub fn loading() -> Self {
        Self {
            value: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn loaded(value: T) -> Self {
        Self {
            value: Some(value),
            is_loading: false,
            error: None,
        }
    }

    pub fn failed(error: ErrorKind) -> Self {
        Self {
            value: None,
            is_loading: false,
            error: Some(error),
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.is_loading
    }
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self::loading()
    }
}

/// How a finished fetch was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Applied,
    Failed,
    /// A newer request superseded this one; its result was dropped.
    Stale,
}

struct ReconcilerInner<K, T> {
    state: Atom<LoadState<T>>,
    current_key: RefCell<Option<K>>,
    ticket: Cell<u64>,
    errors: Option<Rc<dyn ErrorSink>>,
    policy: ErrorPolicy,
}

impl<K: Debug, T: Clone + 'static> ReconcilerInner<K, T> {
    fn finish(&self, ticket: u64, result: Result<T, TransportError>) -> Settled {
        if self.ticket.get() != ticket {
            log::debug!(
                "Dropping stale response for {:?} (ticket {ticket}, current {})",
                self.current_key.borrow(),
                self.ticket.get()
            );
            return Settled::Stale;
        }
        match result {
            Ok(value) => {
                self.state.set(LoadState::loaded(value));
                Settled::Applied
            }
            Err(error) => {
                let kind = match &self.errors {
                    Some(sink) => sink.report(&error),
                    None => self.policy.classify(&error),
                };
                self.state.set(LoadState::failed(kind));
                Settled::Failed
            }
        }
    }
}

/// Merges asynchronous fetch results into a `LoadState` without races.
///
/// # Examples
///
/// ```rust
/// use dashboard_frontend::dataflow::Runtime;
/// use dashboard_frontend::errors::TransportError;
/// use dashboard_frontend::loading::{Reconciler, Settled};
///
/// let rt = Runtime::new();
/// let usage = Reconciler::<String, f64>::new(&rt);
///
/// let first = usage.run("loc-1".to_string(), |_| async { Ok::<_, TransportError>(10.0) });
/// let second = usage.run("loc-2".to_string(), |_| async { Ok::<_, TransportError>(20.0) });
///
/// futures::executor::block_on(async {
///     assert_eq!(first.await, Settled::Stale);
///     assert_eq!(second.await, Settled::Applied);
/// });
/// assert_eq!(usage.state().get().value, Some(20.0));
/// ```
pub struct Reconciler<K, T> {
    inner: Rc<ReconcilerInner<K, T>>,
}

impl<K, T> Reconciler<K, T>
where
    K: Clone + PartialEq + Debug + 'static,
    T: Clone + 'static,
{
    /// Classifies failures with the default `[errors]` statuses.
    pub fn new(runtime: &Runtime) -> Self {
        Self::build(runtime, None, ErrorPolicy::default())
    }

    /// Classifies failures with `policy` but reports them nowhere.
    pub fn with_policy(runtime: &Runtime, policy: ErrorPolicy) -> Self {
        Self::build(runtime, None, policy)
    }

    /// Failures for current requests are reported to `errors`, which also
    /// classifies them.
    pub fn with_error_sink(runtime: &Runtime, errors: Rc<dyn ErrorSink>) -> Self {
        Self::build(runtime, Some(errors), ErrorPolicy::default())
    }

    fn build(runtime: &Runtime, errors: Option<Rc<dyn ErrorSink>>, policy: ErrorPolicy) -> Self {
        Self {
            inner: Rc::new(ReconcilerInner {
                state: runtime.atom(LoadState::loading()),
                current_key: RefCell::new(None),
                ticket: Cell::new(0),
                errors,
                policy,
            }),
        }
    }

    pub fn state(&self) -> ReadOnly<LoadState<T>> {
        self.inner.state.read_only()
    }

    pub fn current_key(&self) -> Option<K> {
        self.inner.current_key.borrow().clone()
    }

    /// Starts a request for `key` and returns the future that completes it.
    ///
    /// The state switches to loading right away. A new key drops the previous
    /// value; the same key (a refresh) keeps it visible while loading.
    pub fn run<F, Fut>(&self, key: K, fetch: F) -> impl Future<Output = Settled> + use<K, T, F, Fut>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<T, TransportError>> + 'static,
    {
        let ticket = self.inner.ticket.get() + 1;
        self.inner.ticket.set(ticket);

        let same_key = self.inner.current_key.borrow().as_ref() == Some(&key);
        *self.inner.current_key.borrow_mut() = Some(key.clone());
        if same_key {
            self.inner.state.update(|state| LoadState {
                value: state.value.clone(),
                is_loading: true,
                error: None,
            });
        } else {
            self.inner.state.set(LoadState::loading());
        }

        let request = fetch(key);
        let inner = Rc::clone(&self.inner);
        async move {
            let result = request.await;
            inner.finish(ticket, result)
        }
    }

    /// Like `run`, but does nothing when `key` is already the current key.
    pub fn run_if_changed<F, Fut>(
        &self,
        key: K,
        fetch: F,
    ) -> Option<impl Future<Output = Settled> + use<K, T, F, Fut>>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<T, TransportError>> + 'static,
    {
        if self.inner.current_key.borrow().as_ref() == Some(&key) {
            log::debug!("Skipping reload, {key:?} is already current");
            return None;
        }
        Some(self.run(key, fetch))
    }

    /// Clears the value and shows loading before the next request is issued.
    /// Whatever is in flight will be dropped.
    pub fn reset(&self) {
        self.inner.ticket.set(self.inner.ticket.get() + 1);
        *self.inner.current_key.borrow_mut() = None;
        self.inner.state.set(LoadState::loading());
    }

    /// Drops whatever is in flight without touching the state.
    pub fn abandon(&self) {
        self.inner.ticket.set(self.inner.ticket.get() + 1);
    }
}

impl<K, T> Clone for Reconciler<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
