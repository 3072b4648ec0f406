use super::{AnnealingData, Replica};
use crate::energy::{
    entropy_energy, entropy_term, ENTROPY, EQUALITY, INEQUALITY, NUM_BASE_TYPES, TOTAL,
};
use crate::error::FfResult;

/// Energy change of a single-rupture move.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveDelta {
    pub total: f64,
    pub equality: f64,
    pub inequality: f64,
    pub entropy: f64,
    /// Total entropy after the move.
    pub entropy_sum: f64,
}

impl Replica {
    /// Energy change from adding `perturb` to rupture `col`.
    ///
    /// Only the rows in that rupture's column are visited. The new misfit
    /// values go into the scratch buffers and the per-range changes into
    /// `range_delta`; nothing else is modified.
    #[inline]
    pub(crate) fn calc_move_delta(
        &mut self,
        data: &AnnealingData,
        col: usize,
        perturb: f64,
    ) -> FfResult<MoveDelta> {
        let track_ranges = !self.range_delta.is_empty();
        if track_ranges {
            self.range_delta.fill(0.0);
        }

        let mut equality = 0.0;
        let rows = &data.equality.col_rows[col];
        let values = &data.equality.col_values[col];
        for (k, (&r, &a)) in rows.iter().zip(values).enumerate() {
            let prev = self.misfit[r];
            let next = a.mul_add(perturb, prev);
            self.proposed[k] = next;
            let d = next * next - prev * prev;
            equality += d;
            if track_ranges {
                if let Some(j) = data.eq_row_range[r] {
                    self.range_delta[j] += d;
                }
            }
        }

        let mut inequality = 0.0;
        if let Some(ineq) = &data.inequality {
            let rows = &ineq.col_rows[col];
            let values = &ineq.col_values[col];
            for (k, (&r, &a)) in rows.iter().zip(values).enumerate() {
                let prev = self.misfit_ineq[r];
                let next = a.mul_add(perturb, prev);
                self.proposed_ineq[k] = next;
                let prev_e = if prev > 0.0 { prev * prev } else { 0.0 };
                let next_e = if next > 0.0 { next * next } else { 0.0 };
                let d = next_e - prev_e;
                inequality += d;
                if track_ranges {
                    if let Some(j) = data.ineq_row_range[r] {
                        self.range_delta[j] += d;
                    }
                }
            }
        }

        let wt = self.params.relative_smoothness_wt;
        let (entropy, entropy_sum) = if wt > 0.0 {
            let x = self.x[col];
            let sum = self.entropy_sum - entropy_term(x) + entropy_term(x + perturb);
            (entropy_energy(sum, wt)? - self.energy[ENTROPY], sum)
        } else {
            (0.0, self.entropy_sum)
        };

        Ok(MoveDelta {
            total: equality + inequality + entropy,
            equality,
            inequality,
            entropy,
            entropy_sum,
        })
    }

    /// Commits a move whose delta was just computed by
    /// [`Replica::calc_move_delta`] for the same column.
    #[inline]
    pub(crate) fn apply_move(
        &mut self,
        data: &AnnealingData,
        col: usize,
        perturb: f64,
        delta: &MoveDelta,
    ) {
        let was_zero = self.x[col] == 0.0;
        self.x[col] += perturb;
        if self.x[col] < 0.0 {
            self.x[col] = 0.0;
        }
        let is_zero = self.x[col] == 0.0;
        match (was_zero, is_zero) {
            (true, false) => self.cur_non_zero += 1,
            (false, true) => self.cur_non_zero -= 1,
            _ => {}
        }

        for (k, &r) in data.equality.col_rows[col].iter().enumerate() {
            self.misfit[r] = self.proposed[k];
        }
        if let Some(ineq) = &data.inequality {
            for (k, &r) in ineq.col_rows[col].iter().enumerate() {
                self.misfit_ineq[r] = self.proposed_ineq[k];
            }
        }

        self.energy[TOTAL] += delta.total;
        self.energy[EQUALITY] += delta.equality;
        self.energy[INEQUALITY] += delta.inequality;
        self.energy[ENTROPY] += delta.entropy;
        self.entropy_sum = delta.entropy_sum;
        for (j, d) in self.range_delta.iter().enumerate() {
            self.energy[NUM_BASE_TYPES + j] += d;
        }

        if !self.pending_flag[col] {
            self.pending_flag[col] = true;
            self.pending.push(col);
        }
    }

    /// Makes the working state the best state, copying only what changed
    /// since the last sync.
    pub(crate) fn sync_best(&mut self, data: &AnnealingData) {
        for &c in &self.pending {
            self.xbest[c] = self.x[c];
            for &r in &data.equality.col_rows[c] {
                self.best_misfit[r] = self.misfit[r];
            }
            if let Some(ineq) = &data.inequality {
                for &r in &ineq.col_rows[c] {
                    self.best_misfit_ineq[r] = self.misfit_ineq[r];
                }
            }
            self.pending_flag[c] = false;
        }
        self.pending.clear();
        self.ebest.copy_from_slice(&self.energy);
        self.num_non_zero = self.cur_non_zero;
    }
}
