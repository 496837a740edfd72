//! Time-ordered queue of pending tasks.
//!
//! Entries are keyed by `(execute_at, task id)`, which gives a total order:
//! earliest deadline first, ties broken by ascending id. A task appears at
//! most once; rescheduling is remove-then-insert under one lock, so a burst
//! of reschedules collapses into a single entry at the latest deadline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::task::{TaskId, TimedTask, far_future};
use crate::error::LockResultExt;

const LOG_TARGET: &str = "reparse_scheduler::queue";

type EntryKey = (Instant, TaskId);

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<EntryKey, Arc<TimedTask>>,
    /// Deadline index so a task can be found without scanning `entries`.
    deadlines: HashMap<TaskId, Instant>,
    closed: bool,
}

impl QueueState {
    fn remove(&mut self, id: TaskId) -> Option<Arc<TimedTask>> {
        let deadline = self.deadlines.remove(&id)?;
        let task = self.entries.remove(&(deadline, id));
        assert!(task.is_some(), "queue index out of sync for task {id}");
        task
    }

    fn insert(&mut self, task: Arc<TimedTask>, deadline: Instant) {
        let id = task.id();
        let previous = self.deadlines.insert(id, deadline);
        assert!(previous.is_none(), "duplicate queue entry for task {id}");
        let previous = self.entries.insert((deadline, id), task);
        assert!(previous.is_none(), "duplicate queue key for task {id}");
    }

    fn earliest(&self) -> Option<EntryKey> {
        self.entries.first_key_value().map(|(key, _)| *key)
    }
}

/// Shared pending-task set consumed by a single worker.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            changed: Condvar::new(),
        }
    }

    fn lock(&self, context: &str) -> MutexGuard<'_, QueueState> {
        self.state.lock().recover_poison(context)
    }

    /// Schedule `task` to run `delay` from now, replacing any pending entry.
    ///
    /// Returns `false` once the queue has been closed.
    pub fn reschedule(&self, task: &Arc<TimedTask>, delay: Duration) -> bool {
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or_else(far_future);

        let mut state = self.lock("TaskQueue::reschedule");
        if state.closed {
            log::trace!(
                target: LOG_TARGET,
                "Ignoring reschedule of '{}' {} on closed queue",
                task.name(),
                task.id()
            );
            return false;
        }
        let replaced = state.remove(task.id()).is_some();
        task.mark_idle();
        state.insert(Arc::clone(task), deadline);
        drop(state);

        self.changed.notify_all();
        log::trace!(
            target: LOG_TARGET,
            "{} '{}' {} in {:?}",
            if replaced { "Rescheduled" } else { "Scheduled" },
            task.name(),
            task.id(),
            delay
        );
        true
    }

    /// Schedule `task` to run as soon as the worker is free.
    pub fn reschedule_now(&self, task: &Arc<TimedTask>) -> bool {
        self.reschedule(task, Duration::ZERO)
    }

    /// Remove a pending entry. A running body is not affected.
    ///
    /// Threads waiting on a cancelled task are released. Returns `true` if
    /// an entry was removed.
    pub fn cancel(&self, task: &Arc<TimedTask>) -> bool {
        let removed = {
            let mut state = self.lock("TaskQueue::cancel");
            let removed = state.remove(task.id());
            // Under the queue lock, so a racing reschedule cannot re-arm
            // the task between removal and release.
            if let Some(task) = &removed {
                task.abandon();
            }
            removed
        };
        match removed {
            Some(task) => {
                self.changed.notify_all();
                log::trace!(
                    target: LOG_TARGET,
                    "Cancelled '{}' {}",
                    task.name(),
                    task.id()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, task: &TimedTask) -> bool {
        self.lock("TaskQueue::is_pending")
            .deadlines
            .contains_key(&task.id())
    }

    /// Deadline of the pending entry for `task`, if any.
    pub fn deadline_of(&self, task: &TimedTask) -> Option<Instant> {
        self.lock("TaskQueue::deadline_of")
            .deadlines
            .get(&task.id())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.lock("TaskQueue::len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock("TaskQueue::is_closed").closed
    }

    /// Close the queue, discarding pending entries and waking the worker.
    ///
    /// Returns the number of discarded entries.
    pub fn close(&self) -> usize {
        let discarded: Vec<Arc<TimedTask>> = {
            let mut state = self.lock("TaskQueue::close");
            state.closed = true;
            state.deadlines.clear();
            let discarded: Vec<_> = std::mem::take(&mut state.entries).into_values().collect();
            for task in &discarded {
                task.abandon();
            }
            discarded
        };
        self.changed.notify_all();
        if !discarded.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "Closed queue, discarded {} pending task(s)",
                discarded.len()
            );
        }
        discarded.len()
    }

    /// Block until the earliest task is due, remove it and mark it running.
    ///
    /// Returns `None` once the queue is closed. If the earliest entry changes
    /// while waiting (a different task, or the same task with a new deadline)
    /// the wait is abandoned and the new earliest entry is considered instead.
    pub(crate) fn take_next(&self) -> Option<Arc<TimedTask>> {
        let mut state = self.lock("TaskQueue::take_next");
        loop {
            if state.closed {
                return None;
            }
            let Some(key) = state.earliest() else {
                state = self
                    .changed
                    .wait(state)
                    .recover_poison("TaskQueue::take_next");
                continue;
            };

            let now = Instant::now();
            if key.0 > now {
                let (guard, _) = self
                    .changed
                    .wait_timeout(state, key.0 - now)
                    .recover_poison("TaskQueue::take_next");
                state = guard;
                if state.closed {
                    return None;
                }
                if state.earliest() != Some(key) {
                    log::trace!(
                        target: LOG_TARGET,
                        "Earliest entry changed while waiting on {}; re-evaluating",
                        key.1
                    );
                    continue;
                }
                if key.0 > Instant::now() {
                    continue;
                }
            }

            if let Some(task) = state.remove(key.1) {
                task.begin_run();
                return Some(task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskState;
    use std::thread;

    fn noop(name: &str) -> Arc<TimedTask> {
        TimedTask::new(name, || Ok(()))
    }

    #[test]
    fn test_reschedule_keeps_single_entry() {
        let queue = TaskQueue::new();
        let task = noop("debounced");

        assert!(queue.reschedule(&task, Duration::from_millis(100)));
        let first = queue.deadline_of(&task).unwrap();
        thread::sleep(Duration::from_millis(2));
        assert!(queue.reschedule(&task, Duration::from_millis(100)));
        let second = queue.deadline_of(&task).unwrap();

        assert_eq!(queue.len(), 1);
        assert!(second > first, "latest reschedule wins");
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[test]
    fn test_cancel_removes_and_releases() {
        let queue = TaskQueue::new();
        let task = noop("cancelled");

        queue.reschedule(&task, Duration::from_secs(10));
        assert!(queue.is_pending(&task));

        assert!(queue.cancel(&task));
        assert!(!queue.is_pending(&task));
        assert!(queue.is_empty());
        assert_eq!(task.state(), TaskState::Finished);

        assert!(!queue.cancel(&task), "second cancel is a no-op");
    }

    #[test]
    fn test_take_next_orders_by_deadline_then_id() {
        let queue = TaskQueue::new();
        let late = noop("late");
        let early = noop("early");

        queue.reschedule(&late, Duration::from_millis(30));
        queue.reschedule(&early, Duration::ZERO);

        let first = queue.take_next().unwrap();
        assert_eq!(first.id(), early.id());
        assert_eq!(first.state(), TaskState::Running);

        let second = queue.take_next().unwrap();
        assert_eq!(second.id(), late.id());
    }

    #[test]
    fn test_cancel_racing_reschedule_never_leaves_pending_task_finished() {
        let queue = Arc::new(TaskQueue::new());
        for _ in 0..500 {
            let task = noop("raced");
            queue.reschedule(&task, Duration::from_secs(3600));

            let canceller = {
                let queue = queue.clone();
                let task = task.clone();
                thread::spawn(move || queue.cancel(&task))
            };
            queue.reschedule(&task, Duration::from_secs(3600));
            canceller.join().unwrap();

            if queue.is_pending(&task) {
                assert_eq!(task.state(), TaskState::Idle, "queued task must stay Idle");
            } else {
                assert_eq!(task.state(), TaskState::Finished);
            }
            queue.cancel(&task);
        }
    }

    #[test]
    fn test_equal_deadlines_run_in_id_order() {
        let queue = TaskQueue::new();
        let first = noop("first");
        let lower = noop("lower");
        let higher = noop("higher");
        let last = noop("last");

        let base = Instant::now();
        let tied = base + Duration::from_millis(5);
        {
            let mut state = queue.lock("test");
            state.insert(last.clone(), base + Duration::from_millis(10));
            state.insert(higher.clone(), tied);
            state.insert(lower.clone(), tied);
            state.insert(first.clone(), base);
        }

        let order: Vec<TaskId> = (0..4).map(|_| queue.take_next().unwrap().id()).collect();
        assert_eq!(order, vec![first.id(), lower.id(), higher.id(), last.id()]);
    }

    #[test]
    fn test_take_next_waits_for_deadline() {
        let queue = TaskQueue::new();
        let task = noop("delayed");
        let scheduled_at = Instant::now();
        queue.reschedule(&task, Duration::from_millis(40));

        let taken = queue.take_next().unwrap();
        assert_eq!(taken.id(), task.id());
        assert!(scheduled_at.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_take_next_follows_reschedule_to_later_time() {
        let queue = Arc::new(TaskQueue::new());
        let task = noop("moved");
        let start = Instant::now();
        queue.reschedule(&task, Duration::from_millis(30));

        let mover = {
            let queue = queue.clone();
            let task = task.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.reschedule(&task, Duration::from_millis(80));
            })
        };

        let taken = queue.take_next().unwrap();
        mover.join().unwrap();
        assert_eq!(taken.id(), task.id());
        assert!(
            start.elapsed() >= Duration::from_millis(85),
            "must not fire at the stale deadline"
        );
    }

    #[test]
    fn test_close_discards_and_stops_taking() {
        let queue = Arc::new(TaskQueue::new());
        let task = noop("discarded");
        queue.reschedule(&task, Duration::from_secs(10));

        let taker = {
            let queue = queue.clone();
            thread::spawn(move || queue.take_next().map(|task| task.id()))
        };
        thread::sleep(Duration::from_millis(10));

        assert_eq!(queue.close(), 1);
        assert_eq!(taker.join().unwrap(), None);
        assert_eq!(task.state(), TaskState::Finished);
        assert!(!queue.reschedule(&task, Duration::ZERO));
        assert!(queue.is_empty());
    }
}
