use crate::completion::time::get_time_str;
use crate::completion::{lock, CompletionCriteria, InversionState, SubCompletion};
use crate::config::AnnealingParams;
use crate::energy::TOTAL;
use crate::error::{FaultForgeError, FfResult};
use crate::constraints::ConstraintRange;
use crate::optimizer::replica::{AnnealingData, Replica, ReplicaSnapshot};
use crate::optimizer::reweight::{EvenFitReweighter, MisfitQuantity};
use crate::optimizer::solution::write_rates_file;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Checkpoint {
    interval_millis: u64,
    prefix: PathBuf,
    water_level: Option<Vec<f64>>,
}

/// Runs one replica per worker in rounds.
///
/// Each round every worker anneals from the same start until the
/// sub-completion is met. The round ends by either taking the single best
/// worker solution or averaging all of them, and every worker restarts the
/// next round from that result.
pub struct ThreadedAnnealer {
    replicas: Vec<Replica>,
    sub_completion: SubCompletion,
    average: bool,
    checkpoint: Option<Checkpoint>,
    reweighter: Option<EvenFitReweighter>,
    pool: rayon::ThreadPool,
}

impl ThreadedAnnealer {
    pub fn new(
        data: Arc<AnnealingData>,
        params: AnnealingParams,
        initial: &[f64],
        num_threads: usize,
        sub_completion: SubCompletion,
    ) -> FfResult<Self> {
        if num_threads == 0 {
            return Err(FaultForgeError::Config(
                "Threaded annealing needs at least one thread".to_string(),
            ));
        }
        let replicas = (0..num_threads)
            .map(|i| {
                let seed = params.seed.map(|s| s.wrapping_add(i as u64));
                Replica::new(data.clone(), params.clone(), initial, seed)
            })
            .collect::<FfResult<Vec<_>>>()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| FaultForgeError::Config(format!("Failed to build thread pool: {}", e)))?;

        Ok(Self {
            replicas,
            sub_completion,
            average: false,
            checkpoint: None,
            reweighter: None,
            pool,
        })
    }

    pub fn with_average(mut self, average: bool) -> Self {
        self.average = average;
        self
    }

    /// Re-weights uncertainty-weighted constraints towards an even fit before
    /// every round after the first.
    pub fn with_reweighting(mut self, quantity: MisfitQuantity) -> FfResult<Self> {
        let data = self.replicas[0].data.clone();
        self.reweighter = Some(EvenFitReweighter::new(data, quantity)?);
        Ok(self)
    }

    pub fn reweighter(&self) -> Option<&EvenFitReweighter> {
        self.reweighter.as_ref()
    }

    /// Ranges of the system currently annealed, with their current weights.
    pub fn constraint_ranges(&self) -> &[ConstraintRange] {
        &self.replicas[0].data.ranges
    }

    /// Writes `{prefix}_checkpoint_{time}.csv` every `interval_millis` of
    /// run time. The water level, if given, is added back before writing.
    pub fn with_checkpoints(
        mut self,
        interval_millis: u64,
        prefix: impl Into<PathBuf>,
        water_level: Option<Vec<f64>>,
    ) -> Self {
        self.checkpoint = Some(Checkpoint {
            interval_millis: interval_millis.max(1),
            prefix: prefix.into(),
            water_level,
        });
        self
    }

    pub fn num_threads(&self) -> usize {
        self.replicas.len()
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn best_solution(&self) -> &[f64] {
        self.replicas[0].best_solution()
    }

    pub fn best_energy(&self) -> &[f64] {
        self.replicas[0].best_energy()
    }

    pub fn best_misfit(&self) -> &[f64] {
        self.replicas[0].best_misfit()
    }

    pub fn best_misfit_ineq(&self) -> &[f64] {
        self.replicas[0].best_misfit_ineq()
    }

    fn initial_state(&self) -> InversionState {
        let r = &self.replicas[0];
        InversionState {
            elapsed_millis: 0,
            iterations: r.iteration,
            energy: r.ebest.clone(),
            num_perturbs_kept: r.num_perturbs_kept,
            num_worse_kept: r.num_worse_kept,
            num_non_zero: r.num_non_zero,
        }
    }

    pub fn iterate(&mut self, criteria: &dyn CompletionCriteria) -> FfResult<InversionState> {
        self.sub_completion.set_global_criteria(criteria)?;
        info!(
            threads = self.replicas.len(),
            average = self.average,
            "Threaded annealing until {} with rounds of {}",
            criteria,
            self.sub_completion
        );

        let watch = Instant::now();
        let mut state = self.initial_state();
        let mut rounds = 0u64;
        let mut checkpoints_written = 0u64;

        while !criteria.is_satisfied(&state) {
            if rounds > 0 && self.reweight()? {
                state.energy = self.replicas[0].ebest.clone();
            }
            self.sub_completion.set_global_state(&state);
            let sub = self.sub_completion.for_round(state.iterations);
            let round_start = InversionState {
                elapsed_millis: 0,
                ..state.clone()
            };

            let best_slot: Arc<Mutex<Option<(usize, ReplicaSnapshot)>>> =
                Arc::new(Mutex::new(None));
            let replicas = &mut self.replicas;
            let results: Vec<FfResult<InversionState>> = self.pool.install(|| {
                replicas
                    .par_iter_mut()
                    .enumerate()
                    .map(|(i, r)| {
                        let end = r.iterate(Some(&round_start), &*sub)?;
                        let mut slot = lock(&best_slot);
                        let better = match slot.as_ref() {
                            Some((_, best)) => end.energy[TOTAL] < best.energy[TOTAL],
                            None => true,
                        };
                        if better {
                            *slot = Some((i, r.snapshot()));
                        }
                        Ok(end)
                    })
                    .collect()
            });
            let ends = results.into_iter().collect::<FfResult<Vec<_>>>()?;
            let iterations = ends.iter().map(|s| s.iterations).max().unwrap_or(state.iterations);

            let (perturbs, worse) = if self.average {
                self.average_solutions()?;
                let kept: u64 = ends
                    .iter()
                    .map(|s| s.num_perturbs_kept.saturating_sub(round_start.num_perturbs_kept))
                    .sum();
                let worse: u64 = ends
                    .iter()
                    .map(|s| s.num_worse_kept.saturating_sub(round_start.num_worse_kept))
                    .sum();
                (
                    round_start.num_perturbs_kept + kept,
                    round_start.num_worse_kept + worse,
                )
            } else {
                let chosen = lock(&best_slot).take();
                let Some((index, snapshot)) = chosen else {
                    return Err(FaultForgeError::UnsupportedState(
                        "No worker published a result".to_string(),
                    ));
                };
                debug!(
                    round = rounds,
                    worker = index,
                    energy = snapshot.energy[TOTAL],
                    "Round best"
                );
                for r in &mut self.replicas {
                    r.set_results(&snapshot.solution)?;
                }
                (snapshot.num_perturbs_kept, snapshot.num_worse_kept)
            };

            for r in &mut self.replicas {
                r.iteration = iterations;
                r.num_perturbs_kept = perturbs;
                r.num_worse_kept = worse;
            }
            rounds += 1;
            state = InversionState {
                elapsed_millis: watch.elapsed().as_millis() as u64,
                iterations,
                energy: self.replicas[0].ebest.clone(),
                num_perturbs_kept: perturbs,
                num_worse_kept: worse,
                num_non_zero: self.replicas[0].num_non_zero,
            };
            debug!(
                round = rounds,
                iterations,
                energy = state.energy[TOTAL],
                "Round complete"
            );

            self.maybe_checkpoint(&state, &mut checkpoints_written);
        }

        info!(
            rounds,
            iterations = state.iterations,
            elapsed_ms = state.elapsed_millis,
            energy = state.total_energy(),
            "Threaded annealing done"
        );
        Ok(state)
    }

    /// Returns whether the system changed.
    fn reweight(&mut self) -> FfResult<bool> {
        let Some(reweighter) = &mut self.reweighter else {
            return Ok(false);
        };
        let best = &self.replicas[0];
        let Some(data) = reweighter.reweight(best.best_misfit(), best.best_misfit_ineq())? else {
            return Ok(false);
        };
        for r in &mut self.replicas {
            r.set_data(data.clone())?;
        }
        Ok(true)
    }

    fn average_solutions(&mut self) -> FfResult<()> {
        let n = self.replicas[0].xbest.len();
        let count = self.replicas.len() as f64;
        let mut avg = vec![0.0; n];
        for r in &self.replicas {
            for (a, &x) in avg.iter_mut().zip(&r.xbest) {
                *a += x;
            }
        }
        for a in &mut avg {
            *a /= count;
        }
        for r in &mut self.replicas {
            r.set_results(&avg)?;
        }
        Ok(())
    }

    fn maybe_checkpoint(&self, state: &InversionState, written: &mut u64) {
        let Some(cp) = &self.checkpoint else {
            return;
        };
        let due = state.elapsed_millis / cp.interval_millis;
        if due <= *written {
            return;
        }
        *written = due;

        let mut name = cp.prefix.as_os_str().to_owned();
        name.push(format!(
            "_checkpoint_{}.csv",
            get_time_str(cp.interval_millis * due)
        ));
        let path = PathBuf::from(name);
        let solution: Vec<f64> = match &cp.water_level {
            Some(wl) => self.best_solution().iter().zip(wl).map(|(x, w)| x + w).collect(),
            None => self.best_solution().to_vec(),
        };
        match write_rates_file(&path, &solution) {
            Ok(()) => info!("Wrote checkpoint {}", path.display()),
            Err(e) => warn!("Failed to write checkpoint {}: {}", path.display(), e),
        }
    }
}
