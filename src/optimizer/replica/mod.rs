pub mod anneal;
pub mod delta;

use crate::config::AnnealingParams;
use crate::constraints::ConstraintRange;
use crate::energy::{self, calculate_energy, entropy_term};
use crate::error::{FaultForgeError, FfResult};
use crate::inputs::InversionInputs;
use crate::matrix::{ColumnData, SparseMatrix};
use crate::optimizer::cooling::CoolingSchedule;
use crate::optimizer::sampler::{RuptureSampler, SamplerType};
use fastrand::Rng;
use std::sync::Arc;

/// Read-only system shared by every replica.
#[derive(Debug)]
pub struct AnnealingData {
    pub equality: ColumnData,
    pub inequality: Option<ColumnData>,
    pub ranges: Vec<ConstraintRange>,
    /// Per-rupture scale for the variable generation functions.
    pub basis: Option<Vec<f64>>,
    /// Relative weights for the `WEIGHTED` sampler.
    pub sampler_weights: Option<Vec<f64>>,
    eq_row_range: Vec<Option<usize>>,
    ineq_row_range: Vec<Option<usize>>,
}

impl AnnealingData {
    pub fn new(
        a: &SparseMatrix,
        d: &[f64],
        a_ineq: Option<(&SparseMatrix, &[f64])>,
        ranges: Vec<ConstraintRange>,
    ) -> FfResult<Self> {
        let equality = ColumnData::new(a, d)?;
        let inequality = match a_ineq {
            Some((m, d_ineq)) if m.num_rows() > 0 => {
                if m.num_cols() != a.num_cols() {
                    return Err(FaultForgeError::Validation(format!(
                        "Inequality matrix has {} columns, equality has {}",
                        m.num_cols(),
                        a.num_cols()
                    )));
                }
                Some(ColumnData::new(m, d_ineq)?)
            }
            _ => None,
        };

        let ineq_rows = inequality.as_ref().map_or(0, |c| c.num_rows);
        let mut eq_row_range = vec![None; equality.num_rows];
        let mut ineq_row_range = vec![None; ineq_rows];
        for (j, range) in ranges.iter().enumerate() {
            let (map, limit) = if range.inequality {
                (&mut ineq_row_range, ineq_rows)
            } else {
                (&mut eq_row_range, equality.num_rows)
            };
            if range.end_row > limit {
                return Err(FaultForgeError::Validation(format!(
                    "Range '{}' ends at row {} but the system has {} rows",
                    range.name, range.end_row, limit
                )));
            }
            for slot in &mut map[range.start_row..range.end_row] {
                *slot = Some(j);
            }
        }

        Ok(Self {
            equality,
            inequality,
            ranges,
            basis: None,
            sampler_weights: None,
            eq_row_range,
            ineq_row_range,
        })
    }

    pub fn from_inputs(inputs: &InversionInputs) -> FfResult<Self> {
        Self::new(
            &inputs.a,
            &inputs.d,
            Some((&inputs.a_ineq, &inputs.d_ineq)),
            inputs.ranges.clone(),
        )
    }

    pub fn with_basis(mut self, basis: Vec<f64>) -> FfResult<Self> {
        self.check_rupture_len("basis", basis.len())?;
        self.basis = Some(basis);
        Ok(self)
    }

    pub fn with_sampler_weights(mut self, weights: Vec<f64>) -> FfResult<Self> {
        self.check_rupture_len("sampler weights", weights.len())?;
        self.sampler_weights = Some(weights);
        Ok(self)
    }

    fn check_rupture_len(&self, what: &str, len: usize) -> FfResult<()> {
        if len != self.num_ruptures() {
            return Err(FaultForgeError::Validation(format!(
                "{} has {} entries for {} ruptures",
                what,
                len,
                self.num_ruptures()
            )));
        }
        Ok(())
    }

    pub fn num_ruptures(&self) -> usize {
        self.equality.num_cols
    }

    pub fn num_energy_types(&self) -> usize {
        energy::NUM_BASE_TYPES + self.ranges.len()
    }

    pub fn energy_type_names(&self) -> Vec<String> {
        energy::energy_type_names(&self.ranges)
    }

    fn inequality_rows(&self) -> usize {
        self.inequality.as_ref().map_or(0, |c| c.num_rows)
    }

    /// Same system with each row multiplied by its scalar and the ranges
    /// replaced. Used to change constraint weights between rounds.
    pub fn reweighted(
        &self,
        eq_scalars: &[f64],
        ineq_scalars: &[f64],
        ranges: Vec<ConstraintRange>,
    ) -> FfResult<Self> {
        if ranges.len() != self.ranges.len() {
            return Err(FaultForgeError::Validation(format!(
                "{} re-weighted ranges for {} ranges",
                ranges.len(),
                self.ranges.len()
            )));
        }
        let inequality = match &self.inequality {
            Some(c) => Some(c.scale_rows(ineq_scalars)?),
            None => None,
        };
        Ok(Self {
            equality: self.equality.scale_rows(eq_scalars)?,
            inequality,
            ranges,
            basis: self.basis.clone(),
            sampler_weights: self.sampler_weights.clone(),
            eq_row_range: self.eq_row_range.clone(),
            ineq_row_range: self.ineq_row_range.clone(),
        })
    }
}

/// One serial simulated-annealing chain.
///
/// Holds the working solution plus the best one seen, each with its own
/// misfit vectors so the best state never needs a full recompute.
#[repr(align(64))]
pub struct Replica {
    pub data: Arc<AnnealingData>,
    pub params: AnnealingParams,
    pub schedule: CoolingSchedule,
    pub sampler: RuptureSampler,
    pub rng: Rng,

    pub x: Vec<f64>,
    pub xbest: Vec<f64>,
    misfit: Vec<f64>,
    misfit_ineq: Vec<f64>,
    best_misfit: Vec<f64>,
    best_misfit_ineq: Vec<f64>,
    pub energy: Vec<f64>,
    pub ebest: Vec<f64>,
    entropy_sum: f64,

    pub iteration: u64,
    pub num_perturbs_kept: u64,
    pub num_worse_kept: u64,
    pub num_non_zero: usize,
    cur_non_zero: usize,

    // Columns changed since the last best-state sync.
    pending: Vec<usize>,
    pending_flag: Vec<bool>,

    // Scratch for a proposed move.
    proposed: Vec<f64>,
    proposed_ineq: Vec<f64>,
    range_delta: Vec<f64>,
}

impl Replica {
    pub fn new(
        data: Arc<AnnealingData>,
        params: AnnealingParams,
        initial: &[f64],
        seed: Option<u64>,
    ) -> FfResult<Self> {
        params.validate()?;
        let n = data.num_ruptures();
        if n == 0 {
            return Err(FaultForgeError::Validation(
                "Cannot anneal with zero ruptures".to_string(),
            ));
        }
        if initial.len() != n {
            return Err(FaultForgeError::Validation(format!(
                "Initial solution has {} rates for {} ruptures",
                initial.len(),
                n
            )));
        }
        if let Some((i, &v)) = initial
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0))
        {
            return Err(FaultForgeError::Validation(format!(
                "Initial rate {} for rupture {} must be finite and non-negative",
                v, i
            )));
        }

        let rng = if let Some(s) = seed {
            Rng::with_seed(s)
        } else {
            Rng::new()
        };

        let sampler = match params.sampler {
            SamplerType::Uniform => RuptureSampler::uniform(n),
            SamplerType::Weighted => match &data.sampler_weights {
                Some(w) => RuptureSampler::weighted(w)?,
                None => {
                    return Err(FaultForgeError::Config(
                        "WEIGHTED sampler needs sampler weights".to_string(),
                    ))
                }
            },
            SamplerType::EnergyWeighted => {
                RuptureSampler::energy_weighted(n, params.sampler_refresh_interval)
            }
        };

        let eq_rows = data.equality.num_rows;
        let ineq_rows = data.inequality_rows();
        let max_rows = data.equality.max_rows_per_col;
        let max_rows_ineq = data.inequality.as_ref().map_or(0, |c| c.max_rows_per_col);
        let num_ranges = data.ranges.len();

        let mut r = Replica {
            schedule: CoolingSchedule::from_params(&params),
            sampler,
            rng,
            x: initial.to_vec(),
            xbest: initial.to_vec(),
            misfit: vec![0.0; eq_rows],
            misfit_ineq: vec![0.0; ineq_rows],
            best_misfit: vec![0.0; eq_rows],
            best_misfit_ineq: vec![0.0; ineq_rows],
            energy: Vec::new(),
            ebest: Vec::new(),
            entropy_sum: 0.0,
            iteration: 0,
            num_perturbs_kept: 0,
            num_worse_kept: 0,
            num_non_zero: 0,
            cur_non_zero: 0,
            pending: Vec::new(),
            pending_flag: vec![false; n],
            proposed: vec![0.0; max_rows],
            proposed_ineq: vec![0.0; max_rows_ineq],
            range_delta: vec![0.0; num_ranges],
            params,
            data,
        };
        r.set_results(initial)?;
        Ok(r)
    }

    /// Replaces both the working and best solution with `solution` and
    /// recomputes every derived quantity from scratch.
    pub fn set_results(&mut self, solution: &[f64]) -> FfResult<()> {
        if solution.len() != self.data.num_ruptures() {
            return Err(FaultForgeError::Validation(format!(
                "Solution has {} rates for {} ruptures",
                solution.len(),
                self.data.num_ruptures()
            )));
        }
        self.x.copy_from_slice(solution);
        self.xbest.copy_from_slice(solution);
        self.recompute_current()?;
        self.take_current_as_best();
        Ok(())
    }

    /// Swaps in a system with the same shape, such as a re-weighted one, and
    /// recomputes the misfits and energies of both the working and best
    /// solutions against it.
    pub fn set_data(&mut self, data: Arc<AnnealingData>) -> FfResult<()> {
        if data.num_ruptures() != self.data.num_ruptures()
            || data.equality.num_rows != self.data.equality.num_rows
            || data.inequality_rows() != self.data.inequality_rows()
            || data.ranges.len() != self.data.ranges.len()
        {
            return Err(FaultForgeError::Validation(
                "Replacement system has a different shape".to_string(),
            ));
        }
        self.data = data;
        self.recompute_current()?;
        self.recompute_best()
    }

    /// Recomputes misfits and energy of the working solution. Returns the
    /// previous total energy.
    pub(crate) fn recompute_current(&mut self) -> FfResult<f64> {
        let previous = self.energy.first().copied().unwrap_or(f64::NAN);
        self.data.equality.misfit_into(&self.x, &mut self.misfit);
        if let Some(ineq) = &self.data.inequality {
            ineq.misfit_into(&self.x, &mut self.misfit_ineq);
        }
        self.energy = calculate_energy(
            &self.x,
            &self.misfit,
            &self.misfit_ineq,
            &self.data.ranges,
            self.params.relative_smoothness_wt,
        )?;
        self.entropy_sum = self.x.iter().map(|&v| entropy_term(v)).sum();
        self.cur_non_zero = self.x.iter().filter(|&&v| v > 0.0).count();
        Ok(previous)
    }

    /// Copies the whole working state over the best state.
    pub(crate) fn take_current_as_best(&mut self) {
        self.xbest.copy_from_slice(&self.x);
        self.best_misfit.copy_from_slice(&self.misfit);
        self.best_misfit_ineq.copy_from_slice(&self.misfit_ineq);
        self.ebest.clone_from(&self.energy);
        self.num_non_zero = self.cur_non_zero;
        for &c in &self.pending {
            self.pending_flag[c] = false;
        }
        self.pending.clear();
    }

    /// Recomputes the best energy from `xbest`, refreshing its misfits.
    pub(crate) fn recompute_best(&mut self) -> FfResult<()> {
        self.data.equality.misfit_into(&self.xbest, &mut self.best_misfit);
        if let Some(ineq) = &self.data.inequality {
            ineq.misfit_into(&self.xbest, &mut self.best_misfit_ineq);
        }
        self.ebest = calculate_energy(
            &self.xbest,
            &self.best_misfit,
            &self.best_misfit_ineq,
            &self.data.ranges,
            self.params.relative_smoothness_wt,
        )?;
        self.num_non_zero = self.xbest.iter().filter(|&&v| v > 0.0).count();
        Ok(())
    }

    /// Full energy of an arbitrary solution against this replica's system.
    pub fn calculate_energy(&self, solution: &[f64]) -> FfResult<Vec<f64>> {
        let misfit = self.data.equality.misfit(solution);
        let misfit_ineq = self
            .data
            .inequality
            .as_ref()
            .map(|c| c.misfit(solution))
            .unwrap_or_default();
        calculate_energy(
            solution,
            &misfit,
            &misfit_ineq,
            &self.data.ranges,
            self.params.relative_smoothness_wt,
        )
    }

    pub fn best_solution(&self) -> &[f64] {
        &self.xbest
    }

    pub fn best_energy(&self) -> &[f64] {
        &self.ebest
    }

    pub fn best_misfit(&self) -> &[f64] {
        &self.best_misfit
    }

    pub fn best_misfit_ineq(&self) -> &[f64] {
        &self.best_misfit_ineq
    }

    pub fn current_misfit(&self) -> &[f64] {
        &self.misfit
    }

    /// Copies out the best state for publishing to other threads.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            solution: self.xbest.clone(),
            misfit: self.best_misfit.clone(),
            misfit_ineq: self.best_misfit_ineq.clone(),
            energy: self.ebest.clone(),
            iterations: self.iteration,
            num_perturbs_kept: self.num_perturbs_kept,
            num_worse_kept: self.num_worse_kept,
            num_non_zero: self.num_non_zero,
        }
    }
}

/// Immutable copy of a replica's best state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSnapshot {
    pub solution: Vec<f64>,
    pub misfit: Vec<f64>,
    pub misfit_ineq: Vec<f64>,
    pub energy: Vec<f64>,
    pub iterations: u64,
    pub num_perturbs_kept: u64,
    pub num_worse_kept: u64,
    pub num_non_zero: usize,
}
