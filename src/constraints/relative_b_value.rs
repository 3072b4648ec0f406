use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Enforces a Gutenberg-Richter slope between consecutive magnitude
/// thresholds without fixing the total rate:
/// `N(>= m2) - 10^(-b (m2 - m1)) N(>= m1) = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeBValueConstraint {
    pub weight: f64,
    pub b_value: f64,
    pub min_mag: f64,
    pub delta: f64,
    pub num_thresholds: usize,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl RelativeBValueConstraint {
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        b_value: f64,
        min_mag: f64,
        delta: f64,
        num_thresholds: usize,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            b_value,
            min_mag,
            delta,
            num_thresholds,
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        let (b_value, delta) = (self.b_value, self.delta);
        if self.num_thresholds < 2 {
            return Err(FaultForgeError::Config(format!(
                "Relative b-value needs at least two thresholds, got {}",
                self.num_thresholds
            )));
        }
        if delta <= 0.0 || !delta.is_finite() || !b_value.is_finite() {
            return Err(FaultForgeError::Config(format!(
                "Invalid b-value {} or threshold spacing {}",
                b_value, delta
            )));
        }

        let ratio = 10f64.powf(-b_value * delta);
        let mut rows = Vec::with_capacity(self.num_thresholds - 1);
        for k in 0..self.num_thresholds - 1 {
            let lower = self.min_mag + k as f64 * delta;
            let upper = lower + delta;
            let mut terms = BTreeMap::new();
            for (r, rup) in rup_set.ruptures().iter().enumerate() {
                if rup.magnitude >= upper {
                    terms.insert(r, 1.0 - ratio);
                } else if rup.magnitude >= lower {
                    terms.insert(r, -ratio);
                }
            }
            rows.push(LinearRow::from_terms(terms, 0.0, 0.0));
        }
        Ok(rows)
    }
}

impl ConstraintEncoder for RelativeBValueConstraint {
    fn name(&self) -> &str {
        "Relative b-value"
    }

    fn short_name(&self) -> &str {
        "RelBValue"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn weighting_type(&self) -> ConstraintWeightingType {
        ConstraintWeightingType::Unnormalized
    }

    fn num_rows(&self) -> usize {
        AttachedRows::num_rows(&self.attached)
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        let rows = self.build_rows(rup_set)?;
        self.attached = Some(AttachedRows::new(rup_set.num_ruptures(), rows));
        Ok(())
    }

    fn set_quick_get_sets(&mut self, quick: bool) {
        self.quick_get_sets = quick;
    }

    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64> {
        let attached = AttachedRows::require(&self.attached, self.name())?;
        encode_linear_rows(
            self.name(),
            &attached.rows,
            self.weight,
            ConstraintWeightingType::Unnormalized,
            attached.num_ruptures,
            self.quick_get_sets,
            a,
            d,
            start_row,
        )
    }
}
