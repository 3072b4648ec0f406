//! Command-line forms of completion criteria.
//!
//! | form        | meaning                      |
//! |-------------|------------------------------|
//! | `2h` `30m` `90s` `500mi` | wall-clock time |
//! | `1e-3e`, `5e` | energy at or below value   |
//! | `1000i`, `1000` | iteration count          |

use super::time::{parse_time_string, TimeCompletionCriteria};
use super::{
    CompletionCriteria, EnergyChangeCompletionCriteria, EnergyCompletionCriteria,
    InversionState, IterationCompletionCriteria, VariableSubTimeCompletionCriteria,
};
use crate::error::{FaultForgeError, FfResult};
use std::fmt;
use std::sync::Arc;

fn is_time_arg(s: &str) -> bool {
    s.ends_with("mi") || s.ends_with('h') || s.ends_with('m') || s.ends_with('s')
}

fn parse_count(s: &str) -> FfResult<u64> {
    s.trim()
        .parse()
        .map_err(|e| FaultForgeError::Parse(format!("Invalid iteration count '{}': {}", s, e)))
}

pub fn parse_completion_arg(arg: &str) -> FfResult<Arc<dyn CompletionCriteria>> {
    let s = arg.trim().to_lowercase();
    if s.is_empty() {
        return Err(FaultForgeError::Parse("Empty completion criteria".to_string()));
    }
    if is_time_arg(&s) {
        return Ok(Arc::new(TimeCompletionCriteria::new(parse_time_string(&s)?)));
    }
    if let Some(v) = s.strip_suffix('e') {
        let energy: f64 = v
            .trim()
            .parse()
            .map_err(|e| FaultForgeError::Parse(format!("Invalid energy '{}': {}", arg, e)))?;
        return Ok(Arc::new(EnergyCompletionCriteria::new(energy)));
    }
    let digits = s.strip_suffix('i').unwrap_or(&s);
    Ok(Arc::new(IterationCompletionCriteria::new(parse_count(digits)?)))
}

/// `"<look back>,<max percent>,<max abs>"`, e.g. `"5m,0.1,0.5"`.
pub fn parse_energy_change(arg: &str) -> FfResult<EnergyChangeCompletionCriteria> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(FaultForgeError::Parse(format!(
            "Energy change criteria needs 'time,percent,abs', got '{}'",
            arg
        )));
    }
    let look_back = parse_time_string(parts[0])?;
    let percent: f64 = parts[1]
        .parse()
        .map_err(|e| FaultForgeError::Parse(format!("Invalid percent '{}': {}", parts[1], e)))?;
    let abs: f64 = parts[2]
        .parse()
        .map_err(|e| FaultForgeError::Parse(format!("Invalid abs change '{}': {}", parts[2], e)))?;
    Ok(EnergyChangeCompletionCriteria::new(look_back, percent, abs))
}

/// Stopping rule for a single round of a threaded run.
#[derive(Debug, Clone)]
pub enum SubCompletion {
    /// Iterations counted from the start of the round.
    Iterations(u64),
    Time(TimeCompletionCriteria),
    VariableTime(Arc<VariableSubTimeCompletionCriteria>),
    Criteria(Arc<dyn CompletionCriteria>),
}

impl SubCompletion {
    /// Resolves to the criterion a worker checks during a round that starts
    /// at `start_iteration`.
    pub fn for_round(&self, start_iteration: u64) -> Arc<dyn CompletionCriteria> {
        match self {
            SubCompletion::Iterations(n) => Arc::new(IterationCompletionCriteria::new(
                start_iteration.saturating_add(*n),
            )),
            SubCompletion::Time(t) => Arc::new(*t),
            SubCompletion::VariableTime(v) => v.clone(),
            SubCompletion::Criteria(c) => c.clone(),
        }
    }

    /// Hooks a variable sub-completion to the global stopping rule. A no-op
    /// for the other variants.
    pub fn set_global_criteria(&self, global: &dyn CompletionCriteria) -> FfResult<()> {
        match self {
            SubCompletion::VariableTime(v) => v.set_global_criteria(global),
            _ => Ok(()),
        }
    }

    pub fn set_global_state(&self, state: &InversionState) {
        if let SubCompletion::VariableTime(v) = self {
            v.set_global_state(state.clone());
        }
    }

    pub fn to_arg(&self) -> Option<String> {
        match self {
            SubCompletion::Iterations(n) => Some(n.to_string()),
            SubCompletion::Time(t) => t.to_arg(),
            SubCompletion::VariableTime(v) => v.to_arg(),
            SubCompletion::Criteria(c) => c.to_arg(),
        }
    }
}

impl fmt::Display for SubCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubCompletion::Iterations(n) => write!(f, "SubIterations({})", n),
            SubCompletion::Time(t) => write!(f, "{}", t),
            SubCompletion::VariableTime(v) => write!(f, "{}", v),
            SubCompletion::Criteria(c) => write!(f, "{}", c),
        }
    }
}

/// `"<max>,<min>"` gives a variable time limit, a time suffix a fixed one,
/// and a bare number an iteration count.
pub fn parse_sub_completion(arg: &str) -> FfResult<SubCompletion> {
    let s = arg.trim().to_lowercase();
    if let Some((max, min)) = s.split_once(',') {
        let max = parse_time_string(max)?;
        let min = parse_time_string(min)?;
        return Ok(SubCompletion::VariableTime(Arc::new(
            VariableSubTimeCompletionCriteria::new(max, min)?,
        )));
    }
    if is_time_arg(&s) {
        return Ok(SubCompletion::Time(TimeCompletionCriteria::new(
            parse_time_string(&s)?,
        )));
    }
    let digits = s.strip_suffix('i').unwrap_or(&s);
    Ok(SubCompletion::Iterations(parse_count(digits)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mi_is_time_not_iterations() {
        let c = parse_completion_arg("500mi").unwrap();
        assert_eq!(c.to_arg().as_deref(), Some("500mi"));
    }

    #[test]
    fn test_sub_iterations_offset_by_round_start() {
        let sub = parse_sub_completion("100").unwrap();
        let c = sub.for_round(1000);
        let mut state = InversionState {
            elapsed_millis: 0,
            iterations: 1099,
            energy: vec![1.0],
            num_perturbs_kept: 0,
            num_worse_kept: 0,
            num_non_zero: 0,
        };
        assert!(!c.is_satisfied(&state));
        state.iterations = 1100;
        assert!(c.is_satisfied(&state));
    }
}
