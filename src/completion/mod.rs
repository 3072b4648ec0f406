//! Stopping rules for annealing runs.
//!
//! Every criterion is a predicate over an [`InversionState`] snapshot. They
//! are shared across worker threads, so any internal state sits behind a
//! mutex.

pub mod cancel;
pub mod compound;
pub mod energy;
pub mod energy_change;
pub mod iteration;
pub mod parse;
pub mod progress_tracking;
pub mod time;
pub mod variable_sub;

pub use cancel::CancelCompletionCriteria;
pub use compound::CompoundCompletionCriteria;
pub use energy::EnergyCompletionCriteria;
pub use energy_change::EnergyChangeCompletionCriteria;
pub use iteration::IterationCompletionCriteria;
pub use parse::{parse_completion_arg, parse_energy_change, parse_sub_completion, SubCompletion};
pub use progress_tracking::{ProgressListener, ProgressTrackingCompletionCriteria};
pub use time::TimeCompletionCriteria;
pub use variable_sub::VariableSubTimeCompletionCriteria;

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Snapshot handed to criteria on every check.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionState {
    pub elapsed_millis: u64,
    pub iterations: u64,
    /// Best energy vector so far; index 0 is the total.
    pub energy: Vec<f64>,
    pub num_perturbs_kept: u64,
    pub num_worse_kept: u64,
    pub num_non_zero: usize,
}

impl InversionState {
    pub fn total_energy(&self) -> f64 {
        self.energy.first().copied().unwrap_or(f64::INFINITY)
    }
}

/// Finite budget a criterion represents, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaBudget {
    Millis(u64),
    Iterations(u64),
}

pub trait CompletionCriteria: Send + Sync + fmt::Debug + fmt::Display {
    fn is_satisfied(&self, state: &InversionState) -> bool;

    fn budget(&self) -> Option<CriteriaBudget> {
        None
    }

    /// Command-line form of this criterion, when it has one.
    fn to_arg(&self) -> Option<String> {
        None
    }
}

/// Locks a mutex, recovering the data if another thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
