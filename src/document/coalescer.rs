//! Pending edit log plus mirrored document text.
//!
//! Producers append under one mutex; the model-update task snapshots the log
//! and, after a successful model update, commits exactly the prefix it
//! consumed. A failed update commits nothing, so the next attempt sees the
//! same events again.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::edits::{EditEvent, validate_edit};
use super::TextSupplier;
use crate::error::{LockResultExt, SchedulerError, SchedulerResult};

const LOG_TARGET: &str = "reparse_scheduler::coalescer";

/// Immutable view of the pending log and the text it produces.
#[derive(Debug, Clone)]
pub struct EditSnapshot {
    generation: u64,
    events: Vec<Arc<EditEvent>>,
    text: Arc<str>,
}

impl EditSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn events(&self) -> &[Arc<EditEvent>] {
        &self.events
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl TextSupplier for EditSnapshot {
    fn full_text(&self) -> &str {
        &self.text
    }
}

struct PendingEdits {
    log: VecDeque<Arc<EditEvent>>,
    text: String,
    /// Shared copy of `text`, rebuilt lazily after a change.
    shared_text: Option<Arc<str>>,
    next_seq: u64,
    /// Bumped on every reset so stale snapshots cannot commit.
    generation: u64,
}

impl PendingEdits {
    fn shared_text(&mut self) -> Arc<str> {
        if let Some(text) = &self.shared_text {
            return Arc::clone(text);
        }
        let text: Arc<str> = Arc::from(self.text.as_str());
        self.shared_text = Some(Arc::clone(&text));
        text
    }
}

pub struct EditCoalescer {
    inner: Mutex<PendingEdits>,
}

impl EditCoalescer {
    pub fn new(initial_text: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(PendingEdits {
                log: VecDeque::new(),
                text: initial_text.into(),
                shared_text: None,
                next_seq: 1,
                generation: 0,
            }),
        }
    }

    fn lock(&self, context: &str) -> MutexGuard<'_, PendingEdits> {
        self.inner.lock().recover_poison(context)
    }

    /// Append an edit and apply it to the mirrored text.
    ///
    /// An invalid edit is rejected without touching the log or the text.
    pub fn append(
        &self,
        offset: usize,
        removed_len: usize,
        inserted: impl Into<String>,
    ) -> SchedulerResult<Arc<EditEvent>> {
        let inserted = inserted.into();
        let mut pending = self.lock("EditCoalescer::append");
        validate_edit(&pending.text, offset, removed_len)?;

        let seq = pending.next_seq;
        pending.next_seq += 1;
        let event = Arc::new(EditEvent::new(seq, offset, removed_len, inserted));
        pending
            .text
            .replace_range(offset..offset + removed_len, event.inserted());
        pending.shared_text = None;
        pending.log.push_back(Arc::clone(&event));
        Ok(event)
    }

    /// Consistent copy of the pending log and current text.
    pub fn snapshot(&self) -> EditSnapshot {
        let mut pending = self.lock("EditCoalescer::snapshot");
        EditSnapshot {
            generation: pending.generation,
            events: pending.log.iter().cloned().collect(),
            text: pending.shared_text(),
        }
    }

    /// Drop the prefix consumed by `snapshot`, then run `install`.
    ///
    /// Both happen in one critical section, so a concurrent `reset` is
    /// ordered either before (the commit is `Superseded`) or after.
    /// A log front that does not match the snapshot means a second consumer
    /// exists; that is reported as an invariant violation and nothing changes.
    pub fn commit<F: FnOnce()>(&self, snapshot: &EditSnapshot, install: F) -> SchedulerResult<()> {
        let mut pending = self.lock("EditCoalescer::commit");
        if pending.generation != snapshot.generation {
            return Err(SchedulerError::Superseded {
                snapshot: snapshot.generation,
                current: pending.generation,
            });
        }

        let consumed = snapshot.events.len();
        let front_matches = pending.log.len() >= consumed
            && pending
                .log
                .iter()
                .zip(&snapshot.events)
                .all(|(queued, taken)| queued.seq() == taken.seq());
        if !front_matches {
            let err = SchedulerError::invariant(format!(
                "pending edit log front {:?} does not match consumed events {:?}",
                pending.log.iter().take(consumed).map(|e| e.seq()).collect::<Vec<_>>(),
                snapshot.events.iter().map(|e| e.seq()).collect::<Vec<_>>(),
            ));
            log::error!(target: LOG_TARGET, "{}", err);
            return Err(err);
        }

        pending.log.drain(..consumed);
        install();
        log::trace!(
            target: LOG_TARGET,
            "Committed {} edit(s), {} still pending",
            consumed,
            pending.log.len()
        );
        Ok(())
    }

    /// Discard the log and replace the text (new input or teardown).
    pub fn reset<F: FnOnce()>(&self, text: impl Into<String>, install: F) {
        let mut pending = self.lock("EditCoalescer::reset");
        let dropped = pending.log.len();
        pending.log.clear();
        pending.text = text.into();
        pending.shared_text = None;
        pending.generation += 1;
        install();
        if dropped > 0 {
            log::debug!(
                target: LOG_TARGET,
                "Reset discarded {} pending edit(s)",
                dropped
            );
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock("EditCoalescer::pending_len").log.len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_len() > 0
    }

    /// Current mirrored text.
    pub fn text(&self) -> Arc<str> {
        self.lock("EditCoalescer::text").shared_text()
    }

    pub fn text_len(&self) -> usize {
        self.lock("EditCoalescer::text_len").text.len()
    }
}
