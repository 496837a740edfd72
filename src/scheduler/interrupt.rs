//! Interrupt tokens for blocking waits.
//!
//! Threads cannot be interrupted from outside in Rust, so a caller that wants
//! a cancellable wait passes an `Interrupt` token. Firing the token sets a
//! sticky flag and wakes the task the token is currently waiting on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::task::Completion;
use crate::error::LockResultExt;

/// Returned when a wait ends because its token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// Shareable interrupt flag.
///
/// One token should be used by one waiting thread at a time; clones share
/// the same flag so another thread can fire it.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

#[derive(Default)]
struct InterruptInner {
    interrupted: AtomicBool,
    waiting_on: Mutex<Option<Arc<Completion>>>,
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake the wait in progress, if any.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        let waiting = self
            .inner
            .waiting_on
            .lock()
            .recover_poison("Interrupt::interrupt")
            .clone();
        if let Some(completion) = waiting {
            completion.wake_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Record which task the caller is about to block on.
    ///
    /// Registration happens before the waiter checks the flag, and `interrupt`
    /// sets the flag before reading the registration, so a wakeup is never lost.
    pub(crate) fn register(&self, completion: &Arc<Completion>) -> Registration<'_> {
        *self
            .inner
            .waiting_on
            .lock()
            .recover_poison("Interrupt::register") = Some(Arc::clone(completion));
        Registration { interrupt: self }
    }
}

/// Clears the registration when the wait ends.
pub(crate) struct Registration<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.interrupt
            .inner
            .waiting_on
            .lock()
            .recover_poison("Registration::drop")
            .take();
    }
}
