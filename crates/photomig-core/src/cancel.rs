use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag shared between the signal handler and a running pass.
///
/// Passes only look at it between batches, so a stop request never
/// interrupts an in-flight file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a batched pass ended. An interrupted pass still carries what it
/// accomplished before stopping.
#[derive(Debug)]
pub enum PassOutcome<T> {
    Completed(T),
    Interrupted {
        partial: T,
        completed_batches: usize,
        total_batches: usize,
    },
}

impl<T> PassOutcome<T> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, PassOutcome::Interrupted { .. })
    }

    pub fn completed(self) -> Option<T> {
        match self {
            PassOutcome::Completed(value) => Some(value),
            PassOutcome::Interrupted { .. } => None,
        }
    }

    /// The result, complete or partial.
    pub fn into_inner(self) -> T {
        match self {
            PassOutcome::Completed(value) => value,
            PassOutcome::Interrupted { partial, .. } => partial,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PassOutcome<U> {
        match self {
            PassOutcome::Completed(value) => PassOutcome::Completed(f(value)),
            PassOutcome::Interrupted {
                partial,
                completed_batches,
                total_batches,
            } => PassOutcome::Interrupted {
                partial: f(partial),
                completed_batches,
                total_batches,
            },
        }
    }
}
