//! Per-editor update session.
//!
//! ```text
//! on_edit ──► EditCoalescer ──► reschedule(model-update, debounce)
//!                                      │
//!                                      ▼ (worker)
//!                          SyntaxModel::update_model(snapshot)
//!                              │ Ok                 │ Err
//!                              ▼                    ▼
//!                  commit + install model      log, keep edits
//!                              │
//!              reschedule(presentation), reschedule(outline)
//! ```
//!
//! The session owns one worker thread. All three task bodies run on it, so
//! they never race each other; they still re-read the model slot and the
//! edit log because producers keep running concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use super::collaborators::{OutlineRenderer, PresentationRenderer, SyntaxModel};
use super::state::{PipelineState, PipelineStats, PipelineStatus};
use crate::config::SchedulerConfig;
use crate::document::EditCoalescer;
use crate::error::{LockResultExt, SchedulerError, SchedulerResult, TaskError};
use crate::scheduler::task::{WaitOutcome, far_future};
use crate::scheduler::{Interrupt, TaskScheduler, TaskState, TimedTask};

const LOG_TARGET: &str = "reparse_scheduler::pipeline";

/// The three tasks of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineTask {
    ModelUpdate,
    Presentation,
    Outline,
}

impl PipelineTask {
    pub fn name(self) -> &'static str {
        match self {
            PipelineTask::ModelUpdate => "model-update",
            PipelineTask::Presentation => "presentation-update",
            PipelineTask::Outline => "outline-update",
        }
    }
}

/// State shared between the session handle and the task bodies.
struct SessionShared<M: SyntaxModel> {
    edits: EditCoalescer,
    model: ArcSwapOption<M>,
    status: PipelineStatus,
    cursor: Mutex<Option<usize>>,
}

pub struct UpdateSession<M: SyntaxModel> {
    shared: Arc<SessionShared<M>>,
    scheduler: TaskScheduler,
    model_task: Arc<TimedTask>,
    presentation_task: Arc<TimedTask>,
    outline_task: Arc<TimedTask>,
    config: SchedulerConfig,
    disposed: AtomicBool,
}

impl<M: SyntaxModel> UpdateSession<M> {
    /// Start a session over `initial_text`, with `model` already built for it.
    ///
    /// Spawns the worker thread. Nothing is scheduled until the first edit.
    pub fn new<P, O>(
        config: SchedulerConfig,
        initial_text: impl Into<String>,
        model: M,
        presentation: P,
        outline: O,
    ) -> SchedulerResult<Self>
    where
        P: PresentationRenderer<M::Styling> + 'static,
        O: OutlineRenderer<M::Outline> + 'static,
    {
        let shared = Arc::new(SessionShared {
            edits: EditCoalescer::new(initial_text),
            model: ArcSwapOption::from_pointee(model),
            status: PipelineStatus::default(),
            cursor: Mutex::new(None),
        });
        let scheduler = TaskScheduler::start(&config.worker_thread_name)?;

        let presentation_task = {
            let shared = Arc::clone(&shared);
            TimedTask::new(PipelineTask::Presentation.name(), move || {
                publish_presentation(&shared, &presentation)
            })
        };
        let outline_task = {
            let shared = Arc::clone(&shared);
            TimedTask::new(PipelineTask::Outline.name(), move || {
                publish_outline(&shared, &outline)
            })
        };
        let model_task = {
            let shared = Arc::clone(&shared);
            let queue = Arc::clone(scheduler.queue());
            let presentation_task = Arc::clone(&presentation_task);
            let outline_task = Arc::clone(&outline_task);
            let post_update_delay = config.post_update_delay();
            TimedTask::new(PipelineTask::ModelUpdate.name(), move || {
                if update_model(&shared)? {
                    queue.reschedule(&presentation_task, post_update_delay);
                    queue.reschedule(&outline_task, post_update_delay);
                }
                Ok(())
            })
        };

        log::debug!(
            target: LOG_TARGET,
            "Session started (debounce {:?})",
            config.model_update_delay()
        );
        Ok(Self {
            shared,
            scheduler,
            model_task,
            presentation_task,
            outline_task,
            config,
            disposed: AtomicBool::new(false),
        })
    }

    fn task(&self, task: PipelineTask) -> &Arc<TimedTask> {
        match task {
            PipelineTask::ModelUpdate => &self.model_task,
            PipelineTask::Presentation => &self.presentation_task,
            PipelineTask::Outline => &self.outline_task,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Record a text change and re-arm the debounced model update.
    pub fn on_edit(
        &self,
        offset: usize,
        removed_len: usize,
        inserted: impl Into<String>,
    ) -> SchedulerResult<()> {
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        self.shared.edits.append(offset, removed_len, inserted)?;
        // A closed queue means dispose ran after the check above.
        if !self
            .scheduler
            .reschedule(&self.model_task, self.config.model_update_delay())
        {
            return Err(SchedulerError::Disposed);
        }
        Ok(())
    }

    /// Run `task` after `delay`, replacing any pending run.
    pub fn reschedule(&self, task: PipelineTask, delay: Duration) -> bool {
        self.scheduler.reschedule(self.task(task), delay)
    }

    pub fn reschedule_now(&self, task: PipelineTask) -> bool {
        self.scheduler.reschedule_now(self.task(task))
    }

    /// Prevent a pending run of `task`; a running body completes normally.
    pub fn cancel(&self, task: PipelineTask) -> bool {
        self.scheduler.cancel(self.task(task))
    }

    /// Republish styling only (e.g. the color theme changed).
    pub fn on_theme_changed(&self) -> bool {
        self.reschedule(
            PipelineTask::Presentation,
            self.config.presentation_resync_delay(),
        )
    }

    /// Remember the cursor and resync the outline selection only.
    pub fn on_cursor_moved(&self, offset: usize) -> bool {
        *self
            .shared
            .cursor
            .lock()
            .recover_poison("UpdateSession::on_cursor_moved") = Some(offset);
        self.reschedule(PipelineTask::Outline, self.config.outline_resync_delay())
    }

    /// Bring the model up to date now and return it.
    ///
    /// Returns immediately when no edits are pending. Otherwise the existing
    /// model-update task is moved to the front of the queue and the caller
    /// blocks until it completes. If the update fails, the previous model is
    /// returned.
    pub fn force_update_and_get(&self) -> Option<Arc<M>> {
        self.force_update(None, None)
    }

    /// Like `force_update_and_get`, but gives up when `interrupt` fires.
    ///
    /// On interruption the currently installed (possibly stale) model is
    /// returned, the token stays set, and the background update continues.
    pub fn force_update_and_get_interruptibly(&self, interrupt: &Interrupt) -> Option<Arc<M>> {
        self.force_update(Some(interrupt), None)
    }

    /// Like `force_update_and_get`, but waits at most `timeout`.
    pub fn force_update_and_get_timeout(&self, timeout: Duration) -> Option<Arc<M>> {
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(far_future);
        self.force_update(None, Some(deadline))
    }

    fn force_update(
        &self,
        interrupt: Option<&Interrupt>,
        deadline: Option<Instant>,
    ) -> Option<Arc<M>> {
        if !self.shared.edits.has_pending() {
            return self.current_model();
        }
        if !self.scheduler.reschedule_now(&self.model_task) {
            return self.current_model();
        }
        match self.model_task.wait(interrupt, deadline) {
            WaitOutcome::Finished => {}
            WaitOutcome::Interrupted => {
                log::debug!(target: LOG_TARGET, "Forced update wait interrupted");
            }
            WaitOutcome::TimedOut => {
                log::debug!(target: LOG_TARGET, "Forced update wait timed out");
            }
        }
        self.current_model()
    }

    /// The installed model, or `None` after dispose.
    pub fn current_model(&self) -> Option<Arc<M>> {
        self.shared.model.load_full()
    }

    /// Swap in a new document and model, discarding pending edits.
    ///
    /// A model update already running against the old input is discarded
    /// when it tries to commit. Both views are refreshed immediately.
    pub fn replace_input(&self, text: impl Into<String>, model: M) -> SchedulerResult<()> {
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        self.scheduler.cancel(&self.model_task);
        let model = Arc::new(model);
        self.shared
            .edits
            .reset(text, || self.shared.model.store(Some(model)));
        self.shared.status.mark_views_stale();
        self.scheduler.reschedule_now(&self.presentation_task);
        self.scheduler.reschedule_now(&self.outline_task);
        log::debug!(target: LOG_TARGET, "Input replaced");
        Ok(())
    }

    /// Current mirrored document text.
    pub fn text(&self) -> Arc<str> {
        self.shared.edits.text()
    }

    pub fn pending_edit_count(&self) -> usize {
        self.shared.edits.pending_len()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.shared.status.state(self.shared.edits.has_pending())
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.status.stats()
    }

    pub fn task_state(&self, task: PipelineTask) -> TaskState {
        self.task(task).state()
    }

    pub fn is_pending(&self, task: PipelineTask) -> bool {
        self.scheduler.queue().is_pending(self.task(task))
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.scheduler.worker_thread_id()
    }

    pub fn is_worker_alive(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Cancel all tasks, stop the worker and release the model. Idempotent.
    ///
    /// When this returns (from any thread other than the worker), no task
    /// body is running and none will run again.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in [&self.model_task, &self.presentation_task, &self.outline_task] {
            self.scheduler.cancel(task);
        }
        let discarded = self.scheduler.shutdown();
        self.shared
            .edits
            .reset(String::new(), || self.shared.model.store(None));
        self.shared.status.reset();
        self.shared
            .cursor
            .lock()
            .recover_poison("UpdateSession::dispose")
            .take();
        log::debug!(
            target: LOG_TARGET,
            "Session disposed ({} queued task(s) discarded)",
            discarded
        );
    }
}

impl<M: SyntaxModel> Drop for UpdateSession<M> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Model-update body. Returns whether a new model was installed.
fn update_model<M: SyntaxModel>(shared: &SessionShared<M>) -> Result<bool, TaskError> {
    let snapshot = shared.edits.snapshot();
    if snapshot.is_empty() {
        log::trace!(target: LOG_TARGET, "No pending edits; model is current");
        return Ok(false);
    }
    let Some(current) = shared.model.load_full() else {
        log::debug!(target: LOG_TARGET, "Model released; skipping update");
        return Ok(false);
    };

    let _updating = shared.status.begin_update();
    let next = match current.update_model(snapshot.events(), &snapshot) {
        Ok(next) => Arc::new(next),
        Err(err) => {
            shared.status.update_failed();
            return Err(err.into());
        }
    };

    if shared.model.load().is_none() {
        log::debug!(target: LOG_TARGET, "Model released during update; discarding result");
        return Ok(false);
    }

    match shared
        .edits
        .commit(&snapshot, || shared.model.store(Some(next)))
    {
        Ok(()) => {
            shared.status.update_succeeded();
            log::debug!(
                target: LOG_TARGET,
                "Model updated with {} edit(s)",
                snapshot.len()
            );
            Ok(true)
        }
        Err(SchedulerError::Superseded { snapshot, current }) => {
            log::debug!(
                target: LOG_TARGET,
                "Update of input generation {} superseded by {}; discarding result",
                snapshot,
                current
            );
            Ok(false)
        }
        Err(err) => {
            shared.status.update_failed();
            Err(err.into())
        }
    }
}

fn publish_presentation<M, R>(shared: &SessionShared<M>, renderer: &R) -> Result<(), TaskError>
where
    M: SyntaxModel,
    R: PresentationRenderer<M::Styling> + ?Sized,
{
    let Some(model) = shared.model.load_full() else {
        return Ok(());
    };
    renderer.publish_styling(0..model.document_len(), model.styling())?;
    shared.status.presentation_published();
    Ok(())
}

fn publish_outline<M, R>(shared: &SessionShared<M>, renderer: &R) -> Result<(), TaskError>
where
    M: SyntaxModel,
    R: OutlineRenderer<M::Outline> + ?Sized,
{
    let Some(model) = shared.model.load_full() else {
        return Ok(());
    };
    let cursor = *shared
        .cursor
        .lock()
        .recover_poison("publish_outline");
    renderer.publish_outline(model.outline(), cursor)?;
    shared.status.outline_published();
    Ok(())
}
