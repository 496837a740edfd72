//! Observable pipeline state.
//!
//! All flags are written by the worker thread only (plus `mark_views_stale`
//! on input replacement), so reads from producers are advisory snapshots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Where the pipeline stands relative to the text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Model and both views reflect the text.
    Clean,
    /// Edits are pending that the model has not absorbed.
    Dirty,
    /// The model update is executing.
    Updating,
    /// The model is current but styling or outline is not yet republished.
    DownstreamStale,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub presentations_published: u64,
    pub outlines_published: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PipelineStatus {
    updating: AtomicBool,
    presentation_stale: AtomicBool,
    outline_stale: AtomicBool,
    successful_updates: AtomicU64,
    failed_updates: AtomicU64,
    presentations_published: AtomicU64,
    outlines_published: AtomicU64,
}

/// Clears the updating flag when the model update ends, even by panic.
pub(crate) struct UpdatingGuard<'a> {
    status: &'a PipelineStatus,
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.status.updating.store(false, Ordering::Release);
    }
}

impl PipelineStatus {
    pub(crate) fn begin_update(&self) -> UpdatingGuard<'_> {
        self.updating.store(true, Ordering::Release);
        UpdatingGuard { status: self }
    }

    pub(crate) fn update_succeeded(&self) {
        self.mark_views_stale();
        self.successful_updates.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn update_failed(&self) {
        self.failed_updates.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn mark_views_stale(&self) {
        self.presentation_stale.store(true, Ordering::Release);
        self.outline_stale.store(true, Ordering::Release);
    }

    pub(crate) fn presentation_published(&self) {
        self.presentation_stale.store(false, Ordering::Release);
        self.presentations_published.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn outline_published(&self) {
        self.outline_stale.store(false, Ordering::Release);
        self.outlines_published.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reset(&self) {
        self.presentation_stale.store(false, Ordering::Release);
        self.outline_stale.store(false, Ordering::Release);
    }

    pub(crate) fn state(&self, has_pending_edits: bool) -> PipelineState {
        if self.updating.load(Ordering::Acquire) {
            PipelineState::Updating
        } else if has_pending_edits {
            PipelineState::Dirty
        } else if self.presentation_stale.load(Ordering::Acquire)
            || self.outline_stale.load(Ordering::Acquire)
        {
            PipelineState::DownstreamStale
        } else {
            PipelineState::Clean
        }
    }

    pub(crate) fn stats(&self) -> PipelineStats {
        PipelineStats {
            successful_updates: self.successful_updates.load(Ordering::Acquire),
            failed_updates: self.failed_updates.load(Ordering::Acquire),
            presentations_published: self.presentations_published.load(Ordering::Acquire),
            outlines_published: self.outlines_published.load(Ordering::Acquire),
        }
    }
}
