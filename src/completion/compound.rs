use super::{CompletionCriteria, InversionState};
use std::fmt;
use std::sync::Arc;

/// Satisfied as soon as any member is.
#[derive(Debug, Clone)]
pub struct CompoundCompletionCriteria {
    criteria: Vec<Arc<dyn CompletionCriteria>>,
}

impl CompoundCompletionCriteria {
    pub fn new(criteria: Vec<Arc<dyn CompletionCriteria>>) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &[Arc<dyn CompletionCriteria>] {
        &self.criteria
    }
}

impl CompletionCriteria for CompoundCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        // Every member sees every check so stateful ones keep their history.
        let mut satisfied = false;
        for c in &self.criteria {
            satisfied |= c.is_satisfied(state);
        }
        satisfied
    }
}

impl fmt::Display for CompoundCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.criteria.iter().enumerate() {
            if i > 0 {
                write!(f, " OR ")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
