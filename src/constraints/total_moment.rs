use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};

/// Matches the total seismic moment release rate (N-m/yr).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalMomentConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub target_moment_rate: f64,
    pub std_dev: f64,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl TotalMomentConstraint {
    pub fn from_rupture_set(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        target_moment_rate: f64,
        std_dev: f64,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            target_moment_rate,
            std_dev,
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        if !self.target_moment_rate.is_finite() || !self.std_dev.is_finite() {
            return Err(FaultForgeError::Validation(
                "Total moment target must be finite".to_string(),
            ));
        }
        let terms = (0..rup_set.num_ruptures())
            .map(|r| (r, rup_set.rupture_moment(r)))
            .collect();
        Ok(vec![LinearRow {
            terms,
            target: self.target_moment_rate,
            std_dev: self.std_dev,
        }])
    }
}

impl ConstraintEncoder for TotalMomentConstraint {
    fn name(&self) -> &str {
        "Total Moment"
    }

    fn short_name(&self) -> &str {
        "TotMoment"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn weighting_type(&self) -> ConstraintWeightingType {
        self.weighting
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
            self.weighting,
            attached.num_ruptures,
            self.quick_get_sets,
            a,
            d,
            start_row,
        )
    }
}
