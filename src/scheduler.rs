//! Debounced single-worker task scheduling.
//!
//! ```text
//! producers ──reschedule/cancel──► TaskQueue ◄──take_next── Worker thread
//!                                   (deadline, id)              │
//!                                                               ▼
//!                                                         TimedTask::run
//! ```
//!
//! Exactly one worker thread executes task bodies, so bodies never run
//! concurrently with each other. Producers never block on the worker; only
//! the `await_finished*` family blocks, and only the calling thread.

pub mod interrupt;
pub mod queue;
pub mod task;
pub mod worker;

use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

pub use interrupt::{Interrupt, Interrupted};
pub use queue::TaskQueue;
pub use task::{TaskBody, TaskId, TaskOutcome, TaskState, TimedTask};
pub use worker::Worker;

use crate::error::{LockResultExt, SchedulerResult};

/// A queue together with the worker thread that drains it.
pub struct TaskScheduler {
    queue: Arc<TaskQueue>,
    worker: Mutex<Worker>,
}

impl TaskScheduler {
    /// Start a scheduler whose worker thread is called `thread_name`.
    pub fn start(thread_name: &str) -> SchedulerResult<Self> {
        let queue = Arc::new(TaskQueue::new());
        let worker = Worker::spawn(thread_name, Arc::clone(&queue))?;
        Ok(Self {
            queue,
            worker: Mutex::new(worker),
        })
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn reschedule(&self, task: &Arc<TimedTask>, delay: Duration) -> bool {
        self.queue.reschedule(task, delay)
    }

    pub fn reschedule_now(&self, task: &Arc<TimedTask>) -> bool {
        self.queue.reschedule_now(task)
    }

    pub fn cancel(&self, task: &Arc<TimedTask>) -> bool {
        self.queue.cancel(task)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .recover_poison("TaskScheduler::is_running")
            .is_alive()
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker
            .lock()
            .recover_poison("TaskScheduler::worker_thread_id")
            .thread_id()
    }

    /// Close the queue and join the worker. Safe to call more than once.
    ///
    /// The join happens outside the worker lock, so a body still running can
    /// call `is_running` or `worker_thread_id` without deadlocking.
    pub fn shutdown(&self) -> usize {
        let (discarded, handle, thread_id) = {
            let mut worker = self.worker.lock().recover_poison("TaskScheduler::shutdown");
            let (discarded, handle) = worker.stop();
            (discarded, handle, worker.thread_id())
        };
        worker::join(handle, thread_id);
        discarded
    }
}
