//! Scheduler Module
//!
//! The periodic scheduling primitive the sweeper runs on. `TokioScheduler`
//! drives real timers; `ManualScheduler` fires ticks on demand so sweeps can
//! be tested without waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Callback run on every tick.
pub type Tick = Arc<dyn Fn() + Send + Sync>;

/// Schedules a callback at a fixed interval.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, interval: Duration, tick: Tick) -> TaskHandle;
}

// == Task Handle ==
/// Handle to a scheduled task. Cancelling (or dropping) it stops the task.
pub struct TaskHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TaskHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops the task. Ticks already running finish; no new ones start.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// == Tokio Scheduler ==
/// Runs ticks on a tokio interval. The first tick fires one interval after
/// scheduling; missed ticks are skipped rather than bunched up.
///
/// `schedule` must be called from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, interval: Duration, tick: Tick) -> TaskHandle {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            timer.tick().await;

            loop {
                timer.tick().await;
                tick();
            }
        });

        TaskHandle::new(move || {
            handle.abort();
            debug!("Scheduled task aborted");
        })
    }
}

// == Manual Scheduler ==
struct ManualTask {
    id: u64,
    interval: Duration,
    tick: Tick,
}

/// A scheduler whose ticks only run when `fire` is called.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    tasks: Arc<Mutex<Vec<ManualTask>>>,
    next_id: Arc<AtomicU64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every live task once. Returns how many ran.
    pub fn fire(&self) -> usize {
        // Ticks run outside the lock so they may cancel themselves
        let ticks: Vec<Tick> = self
            .tasks
            .lock()
            .iter()
            .map(|task| Arc::clone(&task.tick))
            .collect();
        for tick in &ticks {
            tick();
        }
        ticks.len()
    }

    /// Number of scheduled, uncancelled tasks.
    pub fn active(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Intervals of the live tasks, in scheduling order.
    pub fn intervals(&self) -> Vec<Duration> {
        self.tasks.lock().iter().map(|task| task.interval).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, interval: Duration, tick: Tick) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().push(ManualTask { id, interval, tick });

        let tasks: Weak<Mutex<Vec<ManualTask>>> = Arc::downgrade(&self.tasks);
        TaskHandle::new(move || {
            if let Some(tasks) = tasks.upgrade() {
                tasks.lock().retain(|task| task.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Tick) {
        let count = Arc::new(AtomicUsize::new(0));
        let tick_count = Arc::clone(&count);
        let tick: Tick = Arc::new(move || {
            tick_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, tick)
    }

    #[test]
    fn test_manual_scheduler_fire_and_cancel() {
        let scheduler = ManualScheduler::new();
        let (count, tick) = counter();

        let handle = scheduler.schedule(Duration::from_secs(300), tick);
        assert_eq!(scheduler.active(), 1);
        assert_eq!(scheduler.intervals(), vec![Duration::from_secs(300)]);

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        handle.cancel();
        assert_eq!(scheduler.active(), 0);
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let scheduler = ManualScheduler::new();
        let (_, tick) = counter();

        drop(scheduler.schedule(Duration::from_secs(1), tick));
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_ticks_on_interval() {
        let (count, tick) = counter();
        let handle = TokioScheduler.schedule(Duration::from_secs(10), tick);

        // Nothing fires before the first interval elapses
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
