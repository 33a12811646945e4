//! Local async tasks and periodic refresh
//!
//! View models spawn their fetches on the current thread's `LocalSet`; the
//! reactive graph is `!Send`, so everything stays on one thread.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

pub struct Task;

impl Task {
    /// Spawns a detached local task.
    ///
    /// Panics outside of a `tokio::task::LocalSet`.
    pub fn start(future: impl Future<Output = ()> + 'static) {
        drop(tokio::task::spawn_local(future));
    }

    /// Spawns a local task that is aborted when the returned handle is dropped.
    pub fn start_droppable(future: impl Future<Output = ()> + 'static) -> TaskHandle {
        TaskHandle {
            handle: tokio::task::spawn_local(future),
        }
    }
}

#[must_use = "the task is aborted as soon as its handle is dropped"]
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Calls `tick` every `period` until dropped. The first call happens one
/// period after start.
#[derive(Debug)]
pub struct AutoRefresh {
    period: Duration,
    _task: TaskHandle,
}

impl AutoRefresh {
    pub fn start(period: Duration, mut tick: impl FnMut() + 'static) -> Self {
        let task = Task::start_droppable(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick();
            }
        });
        Self {
            period,
            _task: task,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
