//! Delayed task scheduling
//!
//! A [`Scheduler`] runs a single callback after a delay and hands back a
//! [`TaskHandle`] that can cancel it. Two implementations:
//! - [`TokioScheduler`]: real time, one tokio task per scheduled callback
//! - [`ManualScheduler`]: virtual clock advanced explicitly, for simulations and tests

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback run when a scheduled delay elapses
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identifies one scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Schedules one-shot delayed callbacks
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Prevent `handle` from firing. No-op if it already fired or was
    /// already cancelled.
    fn cancel(&self, handle: &TaskHandle);
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler backed by the tokio timer
pub struct TokioScheduler {
    runtime: Handle,
    tasks: Arc<Mutex<HashMap<TaskHandle, JoinHandle<()>>>>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Scheduler on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of tasks that have neither fired nor been cancelled
    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = self.tasks.clone();

        // Hold the map while spawning so the entry exists before the task can remove it
        let mut pending = lock(&self.tasks);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Whoever removes the entry first wins: this task fires, or cancel() stops it
            let still_scheduled = lock(&tasks).remove(&handle).is_some();
            if still_scheduled {
                debug!("Scheduled {} fired after {:?}", handle, delay);
                task();
            }
        });
        pending.insert(handle, join);

        debug!("Scheduled {} in {:?}", handle, delay);
        handle
    }

    fn cancel(&self, handle: &TaskHandle) {
        if let Some(join) = lock(&self.tasks).remove(handle) {
            join.abort();
            debug!("Cancelled {}", handle);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, join) in lock(&self.tasks).drain() {
            join.abort();
        }
    }
}

struct ManualState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TaskHandle), Task>,
}

/// Scheduler driven by a virtual clock.
///
/// Nothing fires until [`ManualScheduler::advance`] moves the clock past a
/// task's deadline. Tasks with the same deadline fire in scheduling order.
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                next_id: 0,
                queue: BTreeMap::new(),
            }),
        }
    }

    /// Current virtual time, measured from construction
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Move the clock forward by `by`, firing every task that comes due.
    /// Returns the number of tasks fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = lock(&self.state).now + by;
        let mut fired = 0;

        loop {
            // Tasks run without the lock so they can schedule or cancel
            let task = {
                let mut state = lock(&self.state);
                let due = match state.queue.keys().next() {
                    Some(&(deadline, handle)) if deadline <= target => (deadline, handle),
                    _ => break,
                };
                state.now = due.0;
                state.queue.remove(&due).map(|task| (due.1, task))
            };

            if let Some((handle, task)) = task {
                debug!("Scheduled {} fired at {:?}", handle, self.now());
                task();
                fired += 1;
            }
        }

        lock(&self.state).now = target;
        fired
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let mut state = lock(&self.state);
        let handle = TaskHandle::new(state.next_id);
        state.next_id += 1;
        let deadline = state.now + delay;
        state.queue.insert((deadline, handle), task);

        debug!("Scheduled {} at {:?}", handle, deadline);
        handle
    }

    fn cancel(&self, handle: &TaskHandle) {
        let mut state = lock(&self.state);
        let before = state.queue.len();
        state.queue.retain(|(_, queued), _| queued != handle);
        if state.queue.len() < before {
            debug!("Cancelled {}", handle);
        }
    }
}
