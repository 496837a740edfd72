//! The single worker thread that drains a `TaskQueue`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use super::queue::TaskQueue;
use super::task::TaskOutcome;
use crate::error::SchedulerResult;

const LOG_TARGET: &str = "reparse_scheduler::worker";

/// Owns the worker thread for one queue.
///
/// Dropping the worker closes the queue and joins the thread.
pub struct Worker {
    queue: Arc<TaskQueue>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    running: Arc<AtomicBool>,
}

/// Cleared when the run loop exits, including by panic.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Worker {
    /// Start a named worker thread consuming `queue`.
    pub fn spawn(name: impl Into<String>, queue: Arc<TaskQueue>) -> SchedulerResult<Self> {
        let name = name.into();
        let loop_queue = Arc::clone(&queue);
        let running = Arc::new(AtomicBool::new(true));
        let flag = RunningFlag(Arc::clone(&running));
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _flag = flag;
            run_loop(&loop_queue);
        })?;
        let thread_id = handle.thread().id();
        log::debug!(target: LOG_TARGET, "Spawned worker thread '{}'", name);

        Ok(Self {
            queue,
            handle: Some(handle),
            thread_id,
            running,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Id of the worker thread; task bodies observe this as `thread::current().id()`.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Close the queue and hand out the thread handle for joining.
    ///
    /// Returns the number of discarded pending tasks and the handle, which
    /// is `None` if an earlier call already took it.
    pub(crate) fn stop(&mut self) -> (usize, Option<JoinHandle<()>>) {
        (self.queue.close(), self.handle.take())
    }

    /// Close the queue and join the thread. Idempotent.
    ///
    /// A body already running is allowed to complete; nothing runs afterwards.
    /// Returns the number of pending tasks that were discarded.
    pub fn shutdown(&mut self) -> usize {
        let (discarded, handle) = self.stop();
        join(handle, self.thread_id);
        discarded
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Join a handle taken by `Worker::stop`, unless called from that thread.
pub(crate) fn join(handle: Option<JoinHandle<()>>, thread_id: ThreadId) {
    let Some(handle) = handle else {
        return;
    };
    if thread::current().id() == thread_id {
        // Joining ourselves would deadlock; the loop exits after this body.
        log::warn!(
            target: LOG_TARGET,
            "Worker shutdown requested from its own thread; not joining"
        );
    } else if handle.join().is_err() {
        log::error!(target: LOG_TARGET, "Worker thread terminated by panic");
    } else {
        log::debug!(target: LOG_TARGET, "Worker thread joined");
    }
}

fn run_loop(queue: &TaskQueue) {
    log::debug!(target: LOG_TARGET, "Worker loop started");
    while let Some(task) = queue.take_next() {
        match task.run() {
            TaskOutcome::Succeeded => {}
            outcome => log::debug!(
                target: LOG_TARGET,
                "Task '{}' {} ended with {:?}",
                task.name(),
                task.id(),
                outcome
            ),
        }
    }
    log::debug!(target: LOG_TARGET, "Worker loop exiting");
}
