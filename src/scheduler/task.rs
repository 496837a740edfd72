//! Reusable timed tasks.
//!
//! A `TimedTask` is created once and rescheduled many times. Its lifecycle is
//! `Idle -> Running -> Finished`, with `Idle` re-entered on every reschedule.
//! The state lives behind a mutex/condvar pair so waiters can block on
//! completion; the `Running -> Finished` step is a compare-and-set so a
//! reschedule that lands while the body runs defers completion to the next run.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::interrupt::{Interrupt, Interrupted};
use crate::error::{LockResultExt, TaskError};

const LOG_TARGET: &str = "reparse_scheduler::task";

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Body executed by the worker each time the task fires.
pub type TaskBody = Box<dyn Fn() -> Result<(), TaskError> + Send + Sync>;

/// Process-unique task identity, used as the queue tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled (or rescheduled) and waiting to run
    Idle,
    /// Pulled by the worker; body executing
    Running,
    /// Last run completed with no reschedule pending
    Finished,
}

/// How a single run of the body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Panicked,
}

/// Result of waiting for a task to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Finished,
    Interrupted,
    TimedOut,
}

/// State cell shared with interrupt tokens so they can wake waiters.
pub(crate) struct Completion {
    state: Mutex<TaskState>,
    changed: Condvar,
}

impl Completion {
    fn lock(&self, context: &str) -> MutexGuard<'_, TaskState> {
        self.state.lock().recover_poison(context)
    }

    /// Wake every thread blocked on this task without changing its state.
    pub(crate) fn wake_all(&self) {
        let _state = self.lock("Completion::wake_all");
        self.changed.notify_all();
    }
}

pub struct TimedTask {
    id: TaskId,
    name: String,
    body: TaskBody,
    completion: Arc<Completion>,
    runs: AtomicU64,
}

impl fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl TimedTask {
    /// Create a task that has never been scheduled.
    ///
    /// A fresh task reports `Finished`, so waiting on it returns at once.
    pub fn new<F>(name: impl Into<String>, body: F) -> Arc<Self>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: TaskId::next(),
            name: name.into(),
            body: Box::new(body),
            completion: Arc::new(Completion {
                state: Mutex::new(TaskState::Finished),
                changed: Condvar::new(),
            }),
            runs: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        *self.completion.lock("TimedTask::state")
    }

    /// Number of times the body has been entered.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// Reset to `Idle`. Called by the queue on every (re)schedule.
    pub(crate) fn mark_idle(&self) {
        *self.completion.lock("TimedTask::mark_idle") = TaskState::Idle;
    }

    /// `Idle -> Running`. Called by the queue while it hands the task out.
    pub(crate) fn begin_run(&self) {
        *self.completion.lock("TimedTask::begin_run") = TaskState::Running;
    }

    /// Release waiters of a task that will not run (cancelled or discarded).
    ///
    /// A body that is currently executing is left alone; only the state
    /// recorded for waiters changes.
    pub(crate) fn abandon(&self) {
        let mut state = self.completion.lock("TimedTask::abandon");
        if *state == TaskState::Idle {
            *state = TaskState::Finished;
            self.completion.changed.notify_all();
        }
    }

    /// Execute the body once on the calling (worker) thread.
    ///
    /// Errors and panics are contained here and never reach the worker loop.
    pub(crate) fn run(&self) -> TaskOutcome {
        self.runs.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (self.body)())) {
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(err)) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Task '{}' {} failed: {}",
                    self.name,
                    self.id,
                    err
                );
                TaskOutcome::Failed
            }
            Err(payload) => {
                log::error!(
                    target: LOG_TARGET,
                    "Task '{}' {} panicked: {}",
                    self.name,
                    self.id,
                    panic_message(payload.as_ref())
                );
                TaskOutcome::Panicked
            }
        };

        self.finish();
        log::trace!(
            target: LOG_TARGET,
            "Task '{}' {} ran in {:?} ({:?})",
            self.name,
            self.id,
            started.elapsed(),
            outcome
        );
        outcome
    }

    /// `Running -> Finished`, unless a reschedule already moved us to `Idle`.
    fn finish(&self) {
        let mut state = self.completion.lock("TimedTask::finish");
        if *state == TaskState::Running {
            *state = TaskState::Finished;
            self.completion.changed.notify_all();
        } else {
            log::trace!(
                target: LOG_TARGET,
                "Task '{}' {} rescheduled during its run; completion deferred",
                self.name,
                self.id
            );
        }
    }

    /// Block until the task reaches `Finished`.
    pub fn await_finished(&self) {
        let _ = self.wait(None, None);
    }

    /// Block until `Finished` or until `interrupt` fires.
    ///
    /// The interrupt flag stays set after returning `Err`, so the caller can
    /// still observe it.
    pub fn await_finished_interruptibly(&self, interrupt: &Interrupt) -> Result<(), Interrupted> {
        match self.wait(Some(interrupt), None) {
            WaitOutcome::Finished => Ok(()),
            _ => Err(Interrupted),
        }
    }

    /// Block until `Finished` or `timeout` elapses. Returns `true` if finished.
    pub fn await_finished_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        self.wait(None, deadline.or(Some(far_future()))) == WaitOutcome::Finished
    }

    pub(crate) fn wait(
        &self,
        interrupt: Option<&Interrupt>,
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        let _registration = interrupt.map(|token| token.register(&self.completion));
        let mut state = self.completion.lock("TimedTask::wait");
        loop {
            if *state == TaskState::Finished {
                return WaitOutcome::Finished;
            }
            if interrupt.is_some_and(Interrupt::is_interrupted) {
                return WaitOutcome::Interrupted;
            }
            match deadline {
                None => {
                    state = self
                        .completion
                        .changed
                        .wait(state)
                        .recover_poison("TimedTask::wait");
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let (guard, _) = self
                        .completion
                        .changed
                        .wait_timeout(state, deadline - now)
                        .recover_poison("TimedTask::wait");
                    state = guard;
                }
            }
        }
    }
}

/// An instant far enough ahead to stand in for "no deadline".
pub(crate) fn far_future() -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(60 * 60 * 24 * 365))
        .unwrap_or(now)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
