use super::{
    check_len, encode_linear_rows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};

/// Recurrence rate of the characteristic Parkfield event (1 per 25 years).
pub const PARKFIELD_RATE: f64 = 1.0 / 25.0;

/// Fixes the summed rate of a group of ruptures to an observed recurrence rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkfieldConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub num_ruptures: usize,
    pub ruptures: Vec<usize>,
    pub target_rate: f64,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl ParkfieldConstraint {
    pub fn new(
        weight: f64,
        weighting: ConstraintWeightingType,
        num_ruptures: usize,
        ruptures: Vec<usize>,
        target_rate: f64,
    ) -> FfResult<Self> {
        let c = Self {
            weight,
            weighting,
            num_ruptures,
            ruptures,
            target_rate,
            quick_get_sets: false,
        };
        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> FfResult<()> {
        if self.ruptures.is_empty() {
            return Err(FaultForgeError::Config(
                "Parkfield constraint has no ruptures".to_string(),
            ));
        }
        if let Some(&r) = self.ruptures.iter().find(|&&r| r >= self.num_ruptures) {
            return Err(FaultForgeError::Validation(format!(
                "Parkfield rupture {} out of range ({} ruptures)",
                r, self.num_ruptures
            )));
        }
        if self.weighting == ConstraintWeightingType::NormalizedByUncertainty {
            return Err(FaultForgeError::Config(
                "Parkfield rate carries no uncertainty".to_string(),
            ));
        }
        Ok(())
    }

    /// Ruptures lying entirely on one parent fault.
    pub fn for_parent(
        rup_set: &RuptureSet,
        weight: f64,
        parent_id: usize,
        target_rate: f64,
    ) -> FfResult<Self> {
        let ruptures = rup_set
            .ruptures()
            .iter()
            .enumerate()
            .filter(|(_, rup)| {
                rup.sections
                    .iter()
                    .all(|&s| rup_set.section(s).parent_id == parent_id)
            })
            .map(|(r, _)| r)
            .collect();
        Self::new(
            weight,
            ConstraintWeightingType::Unnormalized,
            rup_set.num_ruptures(),
            ruptures,
            target_rate,
        )
    }

    fn row(&self) -> LinearRow {
        LinearRow {
            terms: self.ruptures.iter().map(|&r| (r, 1.0)).collect(),
            target: self.target_rate,
            std_dev: 0.0,
        }
    }
}

impl ConstraintEncoder for ParkfieldConstraint {
    fn name(&self) -> &str {
        "Parkfield"
    }

    fn short_name(&self) -> &str {
        "Parkfield"
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
        1
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        check_len("Parkfield rupture count", self.num_ruptures, rup_set.num_ruptures())?;
        self.validate()
    }

    fn set_quick_get_sets(&mut self, quick: bool) {
        self.quick_get_sets = quick;
    }

    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64> {
        encode_linear_rows(
            self.name(),
            &[self.row()],
            self.weight,
            self.weighting,
            self.num_ruptures,
            self.quick_get_sets,
            a,
            d,
            start_row,
        )
    }
}
