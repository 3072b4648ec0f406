use super::{CompletionCriteria, InversionState};
use std::fmt;

/// Satisfied once the best total energy drops to `max_energy` or below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyCompletionCriteria {
    max_energy: f64,
}

impl EnergyCompletionCriteria {
    pub fn new(max_energy: f64) -> Self {
        Self { max_energy }
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }
}

impl CompletionCriteria for EnergyCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        state.total_energy() <= self.max_energy
    }

    fn to_arg(&self) -> Option<String> {
        Some(format!("{}e", self.max_energy))
    }
}

impl fmt::Display for EnergyCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnergyCompletionCriteria(energy: {})", self.max_energy)
    }
}
