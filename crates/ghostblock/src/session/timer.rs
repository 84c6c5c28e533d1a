//! Cancellable one-shot timers.
//!
//! A recording session arms exactly one timer. The [`Scheduler`] trait is the
//! seam to the host's timer facility: [`TokioScheduler`] for hosts running a
//! tokio runtime, [`ManualScheduler`] for hosts that drive time from their
//! own event loop (and for tests).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::lock_unpoisoned;

/// Work to run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies one scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
}

impl TimerHandle {
    /// The scheduler-assigned id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Schedules deferred callbacks.
///
/// `cancel` must be synchronous: once it returns, the callback has either
/// already started or will never run.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// The scheduler's notion of "now".
    fn now(&self) -> Instant;

    /// Run `callback` once after `delay`.
    fn schedule_in(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Drop a pending timer. Unknown or already-fired handles are ignored.
    fn cancel(&self, handle: &TimerHandle);
}

/// Timers backed by `tokio::time::sleep` tasks.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a scheduler on the runtime of the calling task, if any.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Number of timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.tasks).len()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule_in(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tasks = Arc::clone(&self.tasks);

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut guard = lock_unpoisoned(&self.tasks);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            lock_unpoisoned(&tasks).remove(&id);
            trace!(timer = id, "Timer fired");
            callback();
        });
        guard.insert(id, task);

        TimerHandle { id }
    }

    fn cancel(&self, handle: &TimerHandle) {
        if let Some(task) = lock_unpoisoned(&self.tasks).remove(&handle.id) {
            task.abort();
            trace!(timer = handle.id, "Timer cancelled");
        }
    }
}

struct PendingTimer {
    id: u64,
    due: Duration,
    callback: TimerCallback,
}

impl fmt::Debug for PendingTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTimer")
            .field("id", &self.id)
            .field("due", &self.due)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ManualClock {
    elapsed: Duration,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

/// A virtual clock that only moves when told to.
///
/// Callbacks run on the thread calling [`ManualScheduler::advance`], in
/// deadline order, with no internal lock held, so they may schedule or
/// cancel other timers.
#[derive(Debug)]
pub struct ManualScheduler {
    origin: Instant,
    clock: Mutex<ManualClock>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// Create a clock at time zero with nothing scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            clock: Mutex::new(ManualClock::default()),
        }
    }

    /// Time elapsed on the virtual clock.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        lock_unpoisoned(&self.clock).elapsed
    }

    /// Number of timers still waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.clock).pending.len()
    }

    /// Move the clock forward, firing every timer that comes due.
    ///
    /// Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.elapsed() + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut clock = lock_unpoisoned(&self.clock);
                let due_index = clock
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id))
                    .map(|(index, _)| index);

                match due_index {
                    Some(index) => {
                        let timer = clock.pending.remove(index);
                        clock.elapsed = clock.elapsed.max(timer.due);
                        timer
                    }
                    None => {
                        clock.elapsed = target;
                        break;
                    }
                }
            };

            trace!(timer = next.id, "Manual timer fired");
            (next.callback)();
            fired += 1;
        }

        fired
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn schedule_in(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut clock = lock_unpoisoned(&self.clock);
        clock.next_id += 1;
        let id = clock.next_id;
        let due = clock.elapsed + delay;
        clock.pending.push(PendingTimer { id, due, callback });
        TimerHandle { id }
    }

    fn cancel(&self, handle: &TimerHandle) {
        lock_unpoisoned(&self.clock)
            .pending
            .retain(|timer| timer.id != handle.id);
    }
}
