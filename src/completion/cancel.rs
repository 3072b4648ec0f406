use super::{CompletionCriteria, InversionState};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Satisfied once its flag is raised. Combine with the real stopping rule
/// through [`super::CompoundCompletionCriteria`] to make a run cancellable.
#[derive(Debug, Clone, Default)]
pub struct CancelCompletionCriteria {
    flag: Arc<AtomicBool>,
}

impl CancelCompletionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares an existing flag, e.g. one raised by a signal handler.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl CompletionCriteria for CancelCompletionCriteria {
    fn is_satisfied(&self, _state: &InversionState) -> bool {
        self.is_cancelled()
    }
}

impl fmt::Display for CancelCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelCompletionCriteria(cancelled: {})", self.is_cancelled())
    }
}
