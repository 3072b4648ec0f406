use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smooths section participation rates along each parent fault with a
/// discrete Laplacian: `R[i-1] - 2 R[i] + R[i+1] = 0` for interior sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaplacianSmoothingConstraint {
    pub weight: f64,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl LaplacianSmoothingConstraint {
    pub fn from_rupture_set(rup_set: &RuptureSet, weight: f64) -> FfResult<Self> {
        let mut c = Self {
            weight,
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        let mut rows = Vec::new();
        for sections in rup_set.parent_sections().values() {
            for window in sections.windows(3) {
                let mut terms = BTreeMap::new();
                for (&s, coef) in window.iter().zip([1.0, -2.0, 1.0]) {
                    for &r in rup_set.ruptures_for_section(s) {
                        *terms.entry(r).or_insert(0.0) += coef;
                    }
                }
                rows.push(LinearRow::from_terms(terms, 0.0, 0.0));
            }
        }

        if rows.is_empty() {
            return Err(FaultForgeError::Config(
                "Laplacian smoothing needs a parent fault with at least three sections"
                    .to_string(),
            ));
        }
        Ok(rows)
    }
}

impl ConstraintEncoder for LaplacianSmoothingConstraint {
    fn name(&self) -> &str {
        "Laplacian Smoothing"
    }

    fn short_name(&self) -> &str {
        "Laplacian"
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
