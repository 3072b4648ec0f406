//! Even-fit re-weighting of uncertainty-weighted constraints.
//!
//! Rows normalized by their uncertainty have misfits in standard deviations,
//! so their fits can be compared across constraints. Between threaded rounds
//! each such range is pushed towards the average fit: a range fit better than
//! average loses weight, one fit worse gains it. Each adjustment is bounded
//! per round and relative to the starting weight, and the row-count weighted
//! total is conserved before bounding.

use crate::constraints::{ConstraintRange, ConstraintWeightingType};
use crate::error::{FaultForgeError, FfResult};
use crate::optimizer::replica::AnnealingData;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

/// A weight never moves by more than this factor in one round.
pub const MAX_ROUND_ADJUSTMENT: f64 = 2.0;
/// A weight never ends up more than this factor from where it started.
pub const MAX_TOTAL_ADJUSTMENT: f64 = 100.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MisfitQuantity {
    /// Signed mean.
    Mean,
    /// Mean absolute misfit.
    Mae,
    /// Median absolute misfit. Robust to a few badly fit rows.
    Mad,
    /// Root mean square.
    Rmse,
    /// Standard deviation about the mean. Blind to a uniform bias.
    StdDev,
}

impl MisfitQuantity {
    /// The quantity over a set of misfits. Zero for an empty set.
    pub fn compute(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let n = values.len() as f64;
        match self {
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Mae => values.iter().map(|v| v.abs()).sum::<f64>() / n,
            Self::Mad => {
                let mut abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
                abs.sort_by(f64::total_cmp);
                let mid = abs.len() / 2;
                if abs.len() % 2 == 0 {
                    0.5 * (abs[mid - 1] + abs[mid])
                } else {
                    abs[mid]
                }
            }
            Self::Rmse => (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
            Self::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
        }
    }
}

/// Outcome of one re-weighting step.
#[derive(Debug, Clone, PartialEq)]
pub struct ReweightRound {
    /// Average quantity across the adjusted ranges.
    pub target: f64,
    /// Quantity per range; `None` for ranges that are not adjusted.
    pub values: Vec<Option<f64>>,
    /// Weights after the step, one per range.
    pub weights: Vec<f64>,
}

/// Tracks per-range weights across rounds and rebuilds the annealing system
/// for each new set of weights.
#[derive(Debug)]
pub struct EvenFitReweighter {
    quantity: MisfitQuantity,
    original: Arc<AnnealingData>,
    weights: Vec<f64>,
    sqrt_ratios: bool,
    history: Vec<ReweightRound>,
}

impl EvenFitReweighter {
    pub fn new(original: Arc<AnnealingData>, quantity: MisfitQuantity) -> FfResult<Self> {
        if !original
            .ranges
            .iter()
            .any(|r| r.weighting == ConstraintWeightingType::NormalizedByUncertainty)
        {
            return Err(FaultForgeError::Config(
                "Re-weighting needs at least one uncertainty-weighted constraint".to_string(),
            ));
        }
        if let Some(r) = original.ranges.iter().find(|r| !(r.weight > 0.0)) {
            return Err(FaultForgeError::Config(format!(
                "Constraint '{}' has non-positive weight {}",
                r.name, r.weight
            )));
        }
        let weights = original.ranges.iter().map(|r| r.weight).collect();
        Ok(Self {
            quantity,
            original,
            weights,
            sqrt_ratios: true,
            history: Vec::new(),
        })
    }

    /// Use the plain misfit ratio instead of its square root. Adjusts
    /// faster and overshoots more.
    pub fn with_linear_ratios(mut self) -> Self {
        self.sqrt_ratios = false;
        self
    }

    pub fn quantity(&self) -> MisfitQuantity {
        self.quantity
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn history(&self) -> &[ReweightRound] {
        &self.history
    }

    fn adjustable(range: &ConstraintRange) -> bool {
        range.weighting == ConstraintWeightingType::NormalizedByUncertainty
    }

    /// Quantity of each adjustable range, in standard deviations. The misfits
    /// are those of the system at the current weights. Satisfied inequality
    /// rows count as a perfect fit.
    pub fn range_values(&self, misfit: &[f64], misfit_ineq: &[f64]) -> Vec<Option<f64>> {
        self.original
            .ranges
            .iter()
            .zip(&self.weights)
            .map(|(range, &weight)| {
                if !Self::adjustable(range) {
                    return None;
                }
                let source = if range.inequality { misfit_ineq } else { misfit };
                let rows = source.get(range.start_row..range.end_row)?;
                let scaled: Vec<f64> = rows
                    .iter()
                    .map(|&m| {
                        let m = if range.inequality { m.max(0.0) } else { m };
                        m / weight
                    })
                    .collect();
                Some(self.quantity.compute(&scaled))
            })
            .collect()
    }

    /// Computes new weights from the best misfits of the last round and
    /// returns the system re-encoded with them, or `None` when the average
    /// fit is degenerate and the weights are left alone.
    pub fn reweight(
        &mut self,
        misfit: &[f64],
        misfit_ineq: &[f64],
    ) -> FfResult<Option<Arc<AnnealingData>>> {
        let values = self.range_values(misfit, misfit_ineq);
        let fitted: Vec<f64> = values.iter().flatten().copied().collect();
        let target = fitted.iter().sum::<f64>() / fitted.len().max(1) as f64;
        if !(target > 0.0 && target.is_finite()) {
            warn!(target, quantity = %self.quantity, "Skipping re-weight, bad average misfit");
            return Ok(None);
        }

        let ranges = &self.original.ranges;
        let mut calc = self.weights.clone();
        let mut orig_total = 0.0;
        let mut new_total = 0.0;
        for (j, range) in ranges.iter().enumerate() {
            let Some(value) = values[j] else {
                continue;
            };
            let ratio = if self.sqrt_ratios {
                (value / target).sqrt()
            } else {
                value / target
            };
            let ratio = ratio.clamp(1.0 / MAX_ROUND_ADJUSTMENT, MAX_ROUND_ADJUSTMENT);
            calc[j] = self.weights[j] * ratio;
            let rows = range.num_rows() as f64;
            orig_total += rows * range.weight;
            new_total += rows * calc[j];
        }
        let conserve = if new_total > 0.0 {
            orig_total / new_total
        } else {
            1.0
        };

        let mut weights = self.weights.clone();
        for (j, range) in ranges.iter().enumerate() {
            if values[j].is_none() {
                continue;
            }
            let prev = self.weights[j];
            weights[j] = (calc[j] * conserve)
                .clamp(prev / MAX_ROUND_ADJUSTMENT, prev * MAX_ROUND_ADJUSTMENT)
                .clamp(
                    range.weight / MAX_TOTAL_ADJUSTMENT,
                    range.weight * MAX_TOTAL_ADJUSTMENT,
                );
            debug!(
                constraint = %range.short_name,
                value = values[j],
                prev,
                weight = weights[j],
                "Re-weighted"
            );
        }

        let data = self.rebuild(&weights)?;
        info!(
            quantity = %self.quantity,
            target,
            ranges = fitted.len(),
            "Re-weighted uncertainty-weighted constraints"
        );
        self.weights = weights.clone();
        self.history.push(ReweightRound {
            target,
            values,
            weights,
        });
        Ok(Some(Arc::new(data)))
    }

    /// Scales rows relative to the original system so repeated rounds never
    /// compound rounding error.
    fn rebuild(&self, weights: &[f64]) -> FfResult<AnnealingData> {
        let original = &self.original;
        let mut eq_scalars = vec![1.0; original.equality.num_rows];
        let mut ineq_scalars = vec![1.0; original.inequality.as_ref().map_or(0, |c| c.num_rows)];
        let mut ranges = original.ranges.clone();
        for (range, &w) in ranges.iter_mut().zip(weights) {
            let scalars = if range.inequality {
                &mut ineq_scalars
            } else {
                &mut eq_scalars
            };
            let scale = w / range.weight;
            for s in &mut scalars[range.start_row..range.end_row] {
                *s = scale;
            }
            range.weight = w;
        }
        original.reweighted(&eq_scalars, &ineq_scalars, ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SparseMatrix;

    fn range(
        name: &str,
        start: usize,
        end: usize,
        weighting: ConstraintWeightingType,
    ) -> ConstraintRange {
        ConstraintRange {
            name: name.to_string(),
            short_name: name.to_string(),
            start_row: start,
            end_row: end,
            inequality: false,
            weight: 1.0,
            weighting,
        }
    }

    /// Two uncertainty-weighted ranges of two rows each plus one normalized
    /// row, over five identity columns.
    fn data() -> Arc<AnnealingData> {
        let mut a = SparseMatrix::new(5, 5);
        for i in 0..5 {
            a.set(i, i, 1.0);
        }
        let ranges = vec![
            range("Good", 0, 2, ConstraintWeightingType::NormalizedByUncertainty),
            range("Poor", 2, 4, ConstraintWeightingType::NormalizedByUncertainty),
            range("Other", 4, 5, ConstraintWeightingType::Normalized),
        ];
        Arc::new(AnnealingData::new(&a, &[1.0; 5], None, ranges).unwrap())
    }

    /// Misfits at the current weights for fixed fits of 0.1 and 2.0 sigma.
    fn misfits(weights: &[f64]) -> Vec<f64> {
        vec![
            0.1 * weights[0],
            -0.1 * weights[0],
            2.0 * weights[1],
            -2.0 * weights[1],
            0.3,
        ]
    }

    #[test]
    fn test_quantities() {
        let v = [1.0, -3.0, 2.0, -4.0];
        assert_eq!(MisfitQuantity::Mean.compute(&v), -1.0);
        assert_eq!(MisfitQuantity::Mae.compute(&v), 2.5);
        assert_eq!(MisfitQuantity::Mad.compute(&v), 2.5);
        assert_eq!(MisfitQuantity::Mad.compute(&[-5.0, 1.0, 2.0]), 2.0);
        assert_eq!(MisfitQuantity::Rmse.compute(&[3.0, -4.0]), 12.5f64.sqrt());
        assert_eq!(MisfitQuantity::StdDev.compute(&[2.0, 2.0, 2.0]), 0.0);
        assert_eq!(MisfitQuantity::Mad.compute(&[]), 0.0);
        assert_eq!("MAD".parse::<MisfitQuantity>().unwrap(), MisfitQuantity::Mad);
        assert_eq!(MisfitQuantity::StdDev.to_string(), "STD_DEV");
    }

    #[test]
    fn test_over_fit_loses_and_under_fit_gains() {
        let mut rw = EvenFitReweighter::new(data(), MisfitQuantity::Mad).unwrap();
        let new_data = rw
            .reweight(&misfits(&[1.0, 1.0]), &[])
            .unwrap()
            .expect("weights change");
        let w = rw.weights().to_vec();

        assert!(w[0] < 1.0 && w[0] >= 1.0 / MAX_ROUND_ADJUSTMENT);
        assert!(w[1] > 1.0 && w[1] <= MAX_ROUND_ADJUSTMENT);
        assert_eq!(w[2], 1.0);

        let round = &rw.history()[0];
        assert_eq!(round.values[2], None);
        assert!((round.target - 1.05).abs() < 1e-12);

        for (j, r) in new_data.ranges.iter().enumerate() {
            assert_eq!(r.weight, w[j]);
        }
        assert_eq!(new_data.equality.d, vec![w[0], w[0], w[1], w[1], 1.0]);
        assert_eq!(new_data.equality.col_values[3], vec![w[1]]);
    }

    #[test]
    fn test_weights_stay_within_bounds_over_many_rounds() {
        let mut rw = EvenFitReweighter::new(data(), MisfitQuantity::Rmse)
            .unwrap()
            .with_linear_ratios();
        for _ in 0..40 {
            let prev = rw.weights().to_vec();
            rw.reweight(&misfits(&prev), &[]).unwrap();
            for (j, (&w, &p)) in rw.weights().iter().zip(&prev).enumerate() {
                assert!(w >= p / MAX_ROUND_ADJUSTMENT * (1.0 - 1e-12), "range {}", j);
                assert!(w <= p * MAX_ROUND_ADJUSTMENT * (1.0 + 1e-12), "range {}", j);
                assert!(w >= 1.0 / MAX_TOTAL_ADJUSTMENT * (1.0 - 1e-12), "range {}", j);
                assert!(w <= MAX_TOTAL_ADJUSTMENT * (1.0 + 1e-12), "range {}", j);
            }
        }
        let w = rw.weights();
        assert!((w[0] - 1.0 / MAX_TOTAL_ADJUSTMENT).abs() < 1e-12);
        assert!(w[1] > 1.0);
        assert_eq!(w[2], 1.0);
    }

    #[test]
    fn test_perfect_fit_leaves_weights_alone() {
        let mut rw = EvenFitReweighter::new(data(), MisfitQuantity::Mad).unwrap();
        let out = rw.reweight(&[0.0, 0.0, 0.0, 0.0, 0.3], &[]).unwrap();
        assert!(out.is_none());
        assert_eq!(rw.weights(), &[1.0, 1.0, 1.0]);
        assert!(rw.history().is_empty());
    }

    #[test]
    fn test_needs_uncertainty_weighted_range() {
        let mut a = SparseMatrix::new(1, 1);
        a.set(0, 0, 1.0);
        let ranges = vec![range("Other", 0, 1, ConstraintWeightingType::Normalized)];
        let data = Arc::new(AnnealingData::new(&a, &[1.0], None, ranges).unwrap());
        let err = EvenFitReweighter::new(data, MisfitQuantity::Mad);
        assert!(matches!(err, Err(FaultForgeError::Config(_))));
    }
}
