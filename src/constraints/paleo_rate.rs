use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Paleoseismic event-rate observation on one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaleoSite {
    pub section: usize,
    pub rate: f64,
    pub std_dev: f64,
}

/// Probability that a rupture of the given magnitude breaks the surface and
/// is seen in a trench (Wells and Coppersmith, 1993).
pub fn paleo_visibility(magnitude: f64) -> f64 {
    let e = (-12.51 + 2.053 * magnitude).exp();
    e / (1.0 + e)
}

/// Matches the observable event rate at each paleo site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaleoRateConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub sites: Vec<PaleoSite>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl PaleoRateConstraint {
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        sites: Vec<PaleoSite>,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            sites,
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        if self.sites.is_empty() {
            return Err(FaultForgeError::Config(
                "Paleo rate constraint has no sites".to_string(),
            ));
        }
        let mut rows = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            if site.section >= rup_set.num_sections() {
                return Err(FaultForgeError::Validation(format!(
                    "Paleo site on unknown section {}",
                    site.section
                )));
            }
            if !site.rate.is_finite() || !site.std_dev.is_finite() {
                return Err(FaultForgeError::Validation(format!(
                    "Paleo site on section {} has a non-finite rate or deviation",
                    site.section
                )));
            }
            let mut terms = BTreeMap::new();
            for &r in rup_set.ruptures_for_section(site.section) {
                terms.insert(r, paleo_visibility(rup_set.rupture(r).magnitude));
            }
            rows.push(LinearRow::from_terms(terms, site.rate, site.std_dev));
        }
        Ok(rows)
    }
}

impl ConstraintEncoder for PaleoRateConstraint {
    fn name(&self) -> &str {
        "Paleo Event Rates"
    }

    fn short_name(&self) -> &str {
        "PaleoRate"
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

#[cfg(test)]
mod tests {
    use super::paleo_visibility;

    #[test]
    fn test_visibility_increases_with_magnitude() {
        assert!(paleo_visibility(5.5) < paleo_visibility(6.5));
        assert!(paleo_visibility(6.5) < paleo_visibility(8.0));
        assert!(paleo_visibility(8.0) < 1.0);
    }
}
