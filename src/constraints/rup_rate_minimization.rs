use super::{
    check_len, encode_linear_rows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};

/// Drives the rates of selected ruptures towards zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RupRateMinimizationConstraint {
    pub weight: f64,
    pub num_ruptures: usize,
    pub ruptures: Vec<usize>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl RupRateMinimizationConstraint {
    pub fn new(weight: f64, num_ruptures: usize, ruptures: Vec<usize>) -> FfResult<Self> {
        let c = Self {
            weight,
            num_ruptures,
            ruptures,
            quick_get_sets: false,
        };
        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> FfResult<()> {
        if self.ruptures.is_empty() {
            return Err(FaultForgeError::Config(
                "Rate minimization has no ruptures".to_string(),
            ));
        }
        if let Some(&r) = self.ruptures.iter().find(|&&r| r >= self.num_ruptures) {
            return Err(FaultForgeError::Validation(format!(
                "Minimized rupture {} out of range ({} ruptures)",
                r, self.num_ruptures
            )));
        }
        Ok(())
    }

    /// Every rupture below `min_mag`.
    pub fn below_magnitude(rup_set: &RuptureSet, weight: f64, min_mag: f64) -> FfResult<Self> {
        let ruptures = rup_set
            .ruptures()
            .iter()
            .enumerate()
            .filter(|(_, rup)| rup.magnitude < min_mag)
            .map(|(r, _)| r)
            .collect();
        Self::new(weight, rup_set.num_ruptures(), ruptures)
    }

    fn rows(&self) -> Vec<LinearRow> {
        self.ruptures
            .iter()
            .map(|&r| LinearRow {
                terms: vec![(r, 1.0)],
                target: 0.0,
                std_dev: 0.0,
            })
            .collect()
    }
}

impl ConstraintEncoder for RupRateMinimizationConstraint {
    fn name(&self) -> &str {
        "Rupture Rate Minimization"
    }

    fn short_name(&self) -> &str {
        "Minimize"
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
        self.ruptures.len()
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        check_len("Minimization rupture count", self.num_ruptures, rup_set.num_ruptures())?;
        self.validate()
    }

    fn set_quick_get_sets(&mut self, quick: bool) {
        self.quick_get_sets = quick;
    }

    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64> {
        encode_linear_rows(
            self.name(),
            &self.rows(),
            self.weight,
            ConstraintWeightingType::Unnormalized,
            self.num_ruptures,
            self.quick_get_sets,
            a,
            d,
            start_row,
        )
    }
}
