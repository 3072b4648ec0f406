use super::{
    check_len, encode_linear_rows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ties together the rates of ruptures that differ by a single section at
/// either end: `x[a] - x[b] = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RupRateSmoothingConstraint {
    pub weight: f64,
    pub num_ruptures: usize,
    pub pairs: Vec<(usize, usize)>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl RupRateSmoothingConstraint {
    pub fn from_rupture_set(rup_set: &RuptureSet, weight: f64) -> FfResult<Self> {
        let by_sections: HashMap<&[usize], usize> = rup_set
            .ruptures()
            .iter()
            .enumerate()
            .map(|(r, rup)| (rup.sections.as_slice(), r))
            .collect();

        let mut pairs = BTreeSet::new();
        for (r, rup) in rup_set.ruptures().iter().enumerate() {
            let n = rup.sections.len();
            if n < 2 {
                continue;
            }
            for shorter in [&rup.sections[1..], &rup.sections[..n - 1]] {
                if let Some(&other) = by_sections.get(shorter) {
                    pairs.insert((other.min(r), other.max(r)));
                }
            }
        }

        if pairs.is_empty() {
            return Err(FaultForgeError::Config(
                "No neighboring rupture pairs to smooth".to_string(),
            ));
        }

        Ok(Self {
            weight,
            num_ruptures: rup_set.num_ruptures(),
            pairs: pairs.into_iter().collect(),
            quick_get_sets: false,
        })
    }

    fn rows(&self) -> Vec<LinearRow> {
        self.pairs
            .iter()
            .map(|&(a, b)| LinearRow {
                terms: vec![(a, 1.0), (b, -1.0)],
                target: 0.0,
                std_dev: 0.0,
            })
            .collect()
    }
}

impl ConstraintEncoder for RupRateSmoothingConstraint {
    fn name(&self) -> &str {
        "Rupture Rate Smoothing"
    }

    fn short_name(&self) -> &str {
        "RupSmooth"
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
        self.pairs.len()
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        check_len("Smoothing rupture count", self.num_ruptures, rup_set.num_ruptures())?;
        if self.pairs.is_empty() {
            return Err(FaultForgeError::Config(
                "No neighboring rupture pairs to smooth".to_string(),
            ));
        }
        if let Some(&(a, b)) = self
            .pairs
            .iter()
            .find(|&&(a, b)| a >= self.num_ruptures || b >= self.num_ruptures)
        {
            return Err(FaultForgeError::Validation(format!(
                "Smoothing pair ({}, {}) out of range ({} ruptures)",
                a, b, self.num_ruptures
            )));
        }
        Ok(())
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
