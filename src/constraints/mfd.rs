use super::{
    check_finite, check_len, encode_linear_rows, AttachedRows, ConstraintEncoder,
    ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Incremental magnitude-frequency target. Bin `i` is centered on
/// `min_mag + i * delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfdTarget {
    pub min_mag: f64,
    pub delta: f64,
    pub rates: Vec<f64>,
    #[serde(default)]
    pub std_devs: Vec<f64>,
}

impl MfdTarget {
    pub fn bin_index(&self, magnitude: f64) -> Option<usize> {
        let pos = ((magnitude - self.min_mag) / self.delta + 0.5).floor();
        if pos < 0.0 || pos >= self.rates.len() as f64 {
            None
        } else {
            Some(pos as usize)
        }
    }

    /// Gutenberg-Richter target with the given total rate at or above `min_mag`.
    pub fn gutenberg_richter(
        min_mag: f64,
        delta: f64,
        num_bins: usize,
        b_value: f64,
        total_rate: f64,
    ) -> Self {
        let raw: Vec<f64> = (0..num_bins)
            .map(|i| 10f64.powf(-b_value * (min_mag + i as f64 * delta)))
            .collect();
        let sum: f64 = raw.iter().sum();
        let rates = raw.iter().map(|v| v / sum * total_rate).collect();
        Self {
            min_mag,
            delta,
            rates,
            std_devs: Vec::new(),
        }
    }
}

/// Matches (or bounds from above) the rate of ruptures in each magnitude bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfdConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub inequality: bool,
    pub target: MfdTarget,
    /// Fraction of each rupture inside the target region. All of it when
    /// unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_fractions: Option<Vec<f64>>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl MfdConstraint {
    /// `region_fractions`, when given, scales each rupture's contribution by
    /// the fraction of it inside the target region.
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        inequality: bool,
        target: MfdTarget,
        region_fractions: Option<&[f64]>,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            inequality,
            target,
            region_fractions: region_fractions.map(<[f64]>::to_vec),
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        let target = &self.target;
        if target.rates.is_empty() {
            return Err(FaultForgeError::Config(
                "MFD target has no bins".to_string(),
            ));
        }
        if target.delta <= 0.0 || !target.delta.is_finite() {
            return Err(FaultForgeError::Config(format!(
                "MFD bin width must be positive, got {}",
                target.delta
            )));
        }
        check_finite("MFD target rates", &target.rates)?;
        if !target.std_devs.is_empty() {
            check_len(
                "MFD standard deviations",
                target.std_devs.len(),
                target.rates.len(),
            )?;
            check_finite("MFD standard deviations", &target.std_devs)?;
        } else if self.weighting == ConstraintWeightingType::NormalizedByUncertainty {
            return Err(FaultForgeError::Config(
                "MFD target needs standard deviations for uncertainty weighting".to_string(),
            ));
        }
        let fractions = self.region_fractions.as_deref();
        if let Some(fractions) = fractions {
            check_len("Region fractions", fractions.len(), rup_set.num_ruptures())?;
            check_finite("Region fractions", fractions)?;
        }

        let mut bins: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); target.rates.len()];
        for (r, rup) in rup_set.ruptures().iter().enumerate() {
            let fraction = fractions.map_or(1.0, |f| f[r]);
            if fraction == 0.0 {
                continue;
            }
            if let Some(bin) = target.bin_index(rup.magnitude) {
                *bins[bin].entry(r).or_insert(0.0) += fraction;
            }
        }

        Ok(bins
            .into_iter()
            .enumerate()
            .map(|(i, terms)| {
                let std_dev = target.std_devs.get(i).copied().unwrap_or(0.0);
                LinearRow::from_terms(terms, target.rates[i], std_dev)
            })
            .collect())
    }
}

impl ConstraintEncoder for MfdConstraint {
    fn name(&self) -> &str {
        if self.inequality {
            "MFD Inequality"
        } else {
            "MFD Equality"
        }
    }

    fn short_name(&self) -> &str {
        if self.inequality {
            "MFDInequality"
        } else {
            "MFDEquality"
        }
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

    fn is_inequality(&self) -> bool {
        self.inequality
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_index_centers() {
        let target = MfdTarget {
            min_mag: 6.05,
            delta: 0.1,
            rates: vec![1.0, 0.5, 0.25],
            std_devs: vec![],
        };
        assert_eq!(target.bin_index(6.01), Some(0));
        assert_eq!(target.bin_index(6.14), Some(1));
        assert_eq!(target.bin_index(6.25), Some(2));
        assert_eq!(target.bin_index(6.31), None);
        assert_eq!(target.bin_index(5.9), None);
    }

    #[test]
    fn test_gutenberg_richter_total() {
        let target = MfdTarget::gutenberg_richter(6.0, 0.1, 10, 1.0, 0.2);
        let total: f64 = target.rates.iter().sum();
        assert!((total - 0.2).abs() < 1e-12);
        assert!(target.rates.windows(2).all(|w| w[1] < w[0]));
    }
}
