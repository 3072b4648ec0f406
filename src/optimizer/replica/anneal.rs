use super::Replica;
use crate::completion::{CompletionCriteria, InversionState};
use crate::energy::TOTAL;
use crate::error::FfResult;
use crate::optimizer::perturbation::{constrained_perturbation, NonnegativityConstraintType};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const DRIFT_TOLERANCE: f64 = 1e-6;

impl Replica {
    fn state(&self, elapsed_millis: u64) -> InversionState {
        InversionState {
            elapsed_millis,
            iterations: self.iteration,
            energy: self.ebest.clone(),
            num_perturbs_kept: self.num_perturbs_kept,
            num_worse_kept: self.num_worse_kept,
            num_non_zero: self.num_non_zero,
        }
    }

    /// Runs until `criteria` is satisfied.
    ///
    /// With a `start` state the iteration and perturbation counters continue
    /// from it and elapsed time is offset by its elapsed millis; otherwise
    /// they continue from this replica's own counters and time starts at 0.
    pub fn iterate(
        &mut self,
        start: Option<&InversionState>,
        criteria: &dyn CompletionCriteria,
    ) -> FfResult<InversionState> {
        let data = Arc::clone(&self.data);
        let elapsed_offset = match start {
            Some(s) => {
                self.iteration = s.iterations;
                self.num_perturbs_kept = s.num_perturbs_kept;
                self.num_worse_kept = s.num_worse_kept;
                s.elapsed_millis
            }
            None => 0,
        };

        let watch = Instant::now();
        let check_interval = self.params.criteria_check_interval;
        let drift_interval = self.params.drift_interval;
        let scale = self.params.energy_scale_factor;
        let prevent_zero =
            self.params.non_negativity == NonnegativityConstraintType::PreventZeroRates;
        let keep_current = self.params.keep_current_as_best;
        let n = data.num_ruptures();
        let mut since_check = 0u64;

        loop {
            if since_check == 0 {
                let elapsed = elapsed_offset + watch.elapsed().as_millis() as u64;
                if criteria.is_satisfied(&self.state(elapsed)) {
                    break;
                }
            }
            since_check += 1;
            if since_check >= check_interval {
                since_check = 0;
            }

            self.iteration += 1;
            let iter = self.iteration;

            self.sampler.maybe_refresh(
                iter,
                &data.equality,
                &self.misfit,
                data.inequality.as_ref().map(|c| (c, self.misfit_ineq.as_slice())),
            );

            let temperature = self.schedule.temperature(iter);
            let col = self.sampler.sample(&mut self.rng);
            debug_assert!(col < n);
            let x = self.x[col];
            let basis = data.basis.as_ref().map(|b| b[col]);
            let perturb = constrained_perturbation(
                self.params.perturbation,
                self.params.non_negativity,
                &mut self.rng,
                temperature,
                x,
                basis,
            );

            if perturb != 0.0 {
                let delta = self.calc_move_delta(&data, col, perturb)?;
                let accept = if delta.total < 0.0 || (prevent_zero && x == 0.0) {
                    true
                } else {
                    let p = (-delta.total * scale / temperature).exp();
                    self.rng.f64() < p
                };

                if accept {
                    self.apply_move(&data, col, perturb, &delta);
                    self.num_perturbs_kept += 1;
                    if delta.total > 0.0 {
                        self.num_worse_kept += 1;
                    }
                    if keep_current || self.energy[TOTAL] < self.ebest[TOTAL] {
                        self.sync_best(&data);
                    }
                }
            }

            self.schedule.observe(iter, self.ebest[TOTAL]);

            if iter % drift_interval == 0 {
                self.reconcile_drift()?;
            }
        }

        self.reconcile_drift()?;
        self.recompute_best()?;
        let elapsed = elapsed_offset + watch.elapsed().as_millis() as u64;
        Ok(self.state(elapsed))
    }

    /// Replaces the running energy with a full recompute and reports drift
    /// past the tolerance.
    fn reconcile_drift(&mut self) -> FfResult<()> {
        let running = self.recompute_current()?;
        let actual = self.energy[TOTAL];
        let drift = (running - actual).abs();
        let tolerance = DRIFT_TOLERANCE * actual.abs().max(1.0);
        if drift > tolerance {
            warn!(
                iteration = self.iteration,
                running, actual, drift, "Running energy drifted from full recompute"
            );
        } else {
            debug!(iteration = self.iteration, drift, "Energy drift within tolerance");
        }
        if self.params.keep_current_as_best {
            self.take_current_as_best();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::AnnealingData;
    use super::*;
    use crate::completion::IterationCompletionCriteria;
    use crate::config::AnnealingParams;
    use crate::matrix::SparseMatrix;

    fn data() -> Arc<AnnealingData> {
        let mut a = SparseMatrix::new(2, 3);
        a.set(0, 0, 1.0);
        a.set(0, 1, 1.0);
        a.set(1, 1, 1.0);
        a.set(1, 2, 1.0);
        Arc::new(AnnealingData::new(&a, &[1e-3, 2e-3], None, Vec::new()).unwrap())
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = || {
            let mut r =
                Replica::new(data(), AnnealingParams::default(), &[0.0; 3], Some(42)).unwrap();
            r.iterate(None, &IterationCompletionCriteria::new(5_000)).unwrap();
            r.best_solution().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_iterations_continue_from_start_state() {
        let mut r = Replica::new(data(), AnnealingParams::default(), &[0.0; 3], Some(1)).unwrap();
        let start = InversionState {
            elapsed_millis: 0,
            iterations: 100,
            energy: r.best_energy().to_vec(),
            num_perturbs_kept: 7,
            num_worse_kept: 0,
            num_non_zero: 0,
        };
        let end = r.iterate(Some(&start), &IterationCompletionCriteria::new(150)).unwrap();
        assert_eq!(end.iterations, 150);
        assert!(end.num_perturbs_kept >= 7);
    }

    #[test]
    fn test_best_energy_never_worse_than_start() {
        let mut r = Replica::new(data(), AnnealingParams::default(), &[0.0; 3], Some(5)).unwrap();
        let before = r.best_energy()[TOTAL];
        let end = r.iterate(None, &IterationCompletionCriteria::new(2_000)).unwrap();
        assert!(end.energy[TOTAL] <= before + 1e-12);
    }
}
