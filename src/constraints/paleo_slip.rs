use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slip-rate observation from offset features at a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaleoSlipSite {
    pub section: usize,
    pub slip_rate: f64,
    pub std_dev: f64,
}

/// Matches the slip rate observed at each site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaleoSlipConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub sites: Vec<PaleoSlipSite>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl PaleoSlipConstraint {
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        sites: Vec<PaleoSlipSite>,
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
                "Paleo slip constraint has no sites".to_string(),
            ));
        }
        let mut rows = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            if site.section >= rup_set.num_sections() {
                return Err(FaultForgeError::Validation(format!(
                    "Paleo slip site on unknown section {}",
                    site.section
                )));
            }
            if !site.slip_rate.is_finite() || !site.std_dev.is_finite() {
                return Err(FaultForgeError::Validation(format!(
                    "Paleo slip site on section {} has a non-finite value",
                    site.section
                )));
            }
            let mut terms = BTreeMap::new();
            for &r in rup_set.ruptures_for_section(site.section) {
                if let Some(slip) = rup_set.slip_on_section(r, site.section) {
                    terms.insert(r, slip);
                }
            }
            rows.push(LinearRow::from_terms(terms, site.slip_rate, site.std_dev));
        }
        Ok(rows)
    }
}

impl ConstraintEncoder for PaleoSlipConstraint {
    fn name(&self) -> &str {
        "Paleo Slip"
    }

    fn short_name(&self) -> &str {
        "PaleoSlip"
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
