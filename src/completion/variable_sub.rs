use super::{lock, CompletionCriteria, CriteriaBudget, InversionState};
use crate::error::{FaultForgeError, FfResult};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct GlobalTracking {
    budget: Option<CriteriaBudget>,
    state: Option<InversionState>,
}

/// Per-round time limit that shrinks linearly from `max_millis` to
/// `min_millis` as the global run consumes its budget.
#[derive(Debug)]
pub struct VariableSubTimeCompletionCriteria {
    max_millis: u64,
    min_millis: u64,
    global: Mutex<GlobalTracking>,
}

impl VariableSubTimeCompletionCriteria {
    pub fn new(max_millis: u64, min_millis: u64) -> FfResult<Self> {
        if max_millis < min_millis {
            return Err(FaultForgeError::Config(format!(
                "Variable sub-completion max ({} ms) is below min ({} ms)",
                max_millis, min_millis
            )));
        }
        Ok(Self {
            max_millis,
            min_millis,
            global: Mutex::new(GlobalTracking::default()),
        })
    }

    pub fn max_millis(&self) -> u64 {
        self.max_millis
    }

    pub fn min_millis(&self) -> u64 {
        self.min_millis
    }

    /// Registers the global stopping rule. Only time and iteration budgets
    /// can drive the interpolation.
    pub fn set_global_criteria(&self, criteria: &dyn CompletionCriteria) -> FfResult<()> {
        match criteria.budget() {
            Some(budget) => self.set_global_budget(budget),
            None => Err(FaultForgeError::UnsupportedState(format!(
                "Variable sub-completion needs a time or iteration global criteria, got {}",
                criteria
            ))),
        }
    }

    pub fn set_global_budget(&self, budget: CriteriaBudget) -> FfResult<()> {
        lock(&self.global).budget = Some(budget);
        Ok(())
    }

    pub fn set_global_state(&self, state: InversionState) {
        lock(&self.global).state = Some(state);
    }

    /// Fraction of the global budget still remaining, in `[0, 1]`.
    fn remaining_fraction(&self) -> f64 {
        let global = lock(&self.global);
        let (budget, state) = match (&global.budget, &global.state) {
            (Some(b), Some(s)) => (*b, s),
            _ => return 1.0,
        };
        let (used, total) = match budget {
            CriteriaBudget::Millis(total) => (state.elapsed_millis, total),
            CriteriaBudget::Iterations(total) => (state.iterations, total),
        };
        if total == 0 {
            return 0.0;
        }
        (1.0 - used as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Current per-round limit in milliseconds.
    pub fn threshold_millis(&self) -> u64 {
        let span = (self.max_millis - self.min_millis) as f64;
        self.min_millis + (span * self.remaining_fraction()).round() as u64
    }
}

impl CompletionCriteria for VariableSubTimeCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        state.elapsed_millis >= self.threshold_millis()
    }

    fn to_arg(&self) -> Option<String> {
        Some(format!(
            "{},{}",
            super::time::get_time_str(self.max_millis),
            super::time::get_time_str(self.min_millis)
        ))
    }
}

impl fmt::Display for VariableSubTimeCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VariableSubTimeCompletionCriteria(max: {}, min: {})",
            super::time::get_time_str(self.max_millis),
            super::time::get_time_str(self.min_millis)
        )
    }
}
