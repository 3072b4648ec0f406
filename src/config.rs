use crate::completion::{parse_sub_completion, SubCompletion};
use crate::error::{FaultForgeError, FfResult};
use crate::optimizer::cooling::CoolingScheduleType;
use crate::optimizer::perturbation::{GenerationFunctionType, NonnegativityConstraintType};
use crate::optimizer::reweight::MisfitQuantity;
use crate::optimizer::sampler::SamplerType;
use clap::Args;
use serde::{Deserialize, Serialize};

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[command(flatten)]
    pub annealing: AnnealingParams,
    #[command(flatten)]
    pub parallel: ParallelParams,
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingParams {
    #[arg(long, default_value_t = CoolingScheduleType::FastSa)]
    pub cooling_schedule: CoolingScheduleType,
    /// Divides the iteration count before it reaches the schedule.
    #[arg(long, default_value_t = 1.0)]
    pub cooling_slowdown: f64,
    /// Iterations for the LINEAR schedule to reach zero.
    #[arg(long, default_value_t = 100_000.0)]
    pub linear_span: f64,
    /// Per-iteration factor for the EXPONENTIAL schedule.
    #[arg(long, default_value_t = 0.9999)]
    pub exponential_decay: f64,

    /// Iterations between plateau checks for adaptive cooling. Off when unset.
    #[arg(long)]
    pub adaptive_window: Option<u64>,
    #[arg(long, default_value_t = 1e-4)]
    pub adaptive_tolerance: f64,
    #[arg(long, default_value_t = 0.5)]
    pub adaptive_factor: f64,

    #[arg(long, default_value_t = GenerationFunctionType::VariableExponentialScale)]
    pub perturbation: GenerationFunctionType,
    #[arg(long, default_value_t = NonnegativityConstraintType::TryZeroRatesOften)]
    pub non_negativity: NonnegativityConstraintType,
    #[arg(long, default_value_t = SamplerType::Uniform)]
    pub sampler: SamplerType,
    #[arg(long, default_value_t = 100_000)]
    pub sampler_refresh_interval: u64,

    /// Multiplies energy deltas before the acceptance test.
    #[arg(long, default_value_t = 1.0)]
    pub energy_scale_factor: f64,
    #[arg(long, default_value_t = 0.0)]
    pub relative_smoothness_wt: f64,

    /// Iterations between full energy recomputations.
    #[arg(long, default_value_t = 10_000)]
    pub drift_interval: u64,
    #[arg(long, default_value_t = 1)]
    pub criteria_check_interval: u64,

    #[arg(long)]
    pub seed: Option<u64>,
    /// Report the current state rather than the best seen.
    #[arg(long, default_value_t = false)]
    pub keep_current_as_best: bool,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            cooling_schedule: CoolingScheduleType::FastSa,
            cooling_slowdown: 1.0,
            linear_span: 100_000.0,
            exponential_decay: 0.9999,
            adaptive_window: None,
            adaptive_tolerance: 1e-4,
            adaptive_factor: 0.5,
            perturbation: GenerationFunctionType::VariableExponentialScale,
            non_negativity: NonnegativityConstraintType::TryZeroRatesOften,
            sampler: SamplerType::Uniform,
            sampler_refresh_interval: 100_000,
            energy_scale_factor: 1.0,
            relative_smoothness_wt: 0.0,
            drift_interval: 10_000,
            criteria_check_interval: 1,
            seed: None,
            keep_current_as_best: false,
        }
    }
}

impl AnnealingParams {
    pub fn validate(&self) -> FfResult<()> {
        if !(self.cooling_slowdown > 0.0 && self.cooling_slowdown.is_finite()) {
            return Err(FaultForgeError::Config(format!(
                "cooling_slowdown must be positive, got {}",
                self.cooling_slowdown
            )));
        }
        if self.linear_span <= 0.0 {
            return Err(FaultForgeError::Config(format!(
                "linear_span must be positive, got {}",
                self.linear_span
            )));
        }
        if !(self.exponential_decay > 0.0 && self.exponential_decay < 1.0) {
            return Err(FaultForgeError::Config(format!(
                "exponential_decay must be in (0, 1), got {}",
                self.exponential_decay
            )));
        }
        if !(self.adaptive_factor > 0.0 && self.adaptive_factor < 1.0) {
            return Err(FaultForgeError::Config(format!(
                "adaptive_factor must be in (0, 1), got {}",
                self.adaptive_factor
            )));
        }
        if self.adaptive_window == Some(0) {
            return Err(FaultForgeError::Config(
                "adaptive_window must be at least 1".to_string(),
            ));
        }
        if !(self.energy_scale_factor > 0.0 && self.energy_scale_factor.is_finite()) {
            return Err(FaultForgeError::Config(format!(
                "energy_scale_factor must be positive, got {}",
                self.energy_scale_factor
            )));
        }
        if self.relative_smoothness_wt < 0.0 {
            return Err(FaultForgeError::Config(format!(
                "relative_smoothness_wt must be non-negative, got {}",
                self.relative_smoothness_wt
            )));
        }
        if self.drift_interval == 0 || self.criteria_check_interval == 0 {
            return Err(FaultForgeError::Config(
                "drift_interval and criteria_check_interval must be at least 1".to_string(),
            ));
        }
        if self.sampler_refresh_interval == 0 {
            return Err(FaultForgeError::Config(
                "sampler_refresh_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelParams {
    /// Worker count. Defaults to the available parallelism.
    #[arg(long)]
    pub threads: Option<usize>,
    /// Average worker solutions at the end of each round instead of taking
    /// the best.
    #[arg(long, default_value_t = false)]
    pub average: bool,
    /// Per-round stopping rule: `<time>`, `<max>,<min>` or an iteration count.
    #[arg(long, default_value = "1s")]
    pub sub_completion: String,
    /// Time between checkpoint files, e.g. `30m`.
    #[arg(long)]
    pub checkpoint: Option<String>,
    /// Between rounds, re-weight uncertainty-weighted constraints towards an
    /// even fit.
    #[arg(long, default_value_t = false)]
    pub reweight: bool,
    /// Misfit measure compared across constraints when re-weighting.
    #[arg(long, default_value_t = MisfitQuantity::Mad)]
    pub reweight_quantity: MisfitQuantity,
}

impl Default for ParallelParams {
    fn default() -> Self {
        Self {
            threads: None,
            average: false,
            sub_completion: "1s".to_string(),
            checkpoint: None,
            reweight: false,
            reweight_quantity: MisfitQuantity::Mad,
        }
    }
}

impl ParallelParams {
    pub fn num_threads(&self) -> usize {
        self.threads
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
    }

    pub fn sub_completion(&self) -> FfResult<SubCompletion> {
        parse_sub_completion(&self.sub_completion)
    }

    pub fn checkpoint_millis(&self) -> FfResult<Option<u64>> {
        self.checkpoint
            .as_deref()
            .map(crate::completion::time::parse_time_string)
            .transpose()
    }
}
