use super::{CompletionCriteria, CriteriaBudget, InversionState};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationCompletionCriteria {
    min_iterations: u64,
}

impl IterationCompletionCriteria {
    pub fn new(min_iterations: u64) -> Self {
        Self { min_iterations }
    }

    pub fn min_iterations(&self) -> u64 {
        self.min_iterations
    }
}

impl CompletionCriteria for IterationCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        state.iterations >= self.min_iterations
    }

    fn budget(&self) -> Option<CriteriaBudget> {
        Some(CriteriaBudget::Iterations(self.min_iterations))
    }

    fn to_arg(&self) -> Option<String> {
        Some(format!("{}i", self.min_iterations))
    }
}

impl fmt::Display for IterationCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IterationCompletionCriteria(iterations: {})", self.min_iterations)
    }
}
