use super::{
    check_finite, check_len, encode_linear_rows, AttachedRows, ConstraintEncoder,
    ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Matches each section's summed slip (rate times slip of every participating
/// rupture) to its target slip rate. One row per section.
///
/// Without explicit targets the section slip rates and standard deviations
/// of the attached rupture set are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipRateConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_devs: Option<Vec<f64>>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl SlipRateConstraint {
    /// Uses the section slip rates and standard deviations of the rupture set.
    pub fn from_rupture_set(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
    ) -> FfResult<Self> {
        Self::with_payload(rup_set, weight, weighting, None, None)
    }

    pub fn with_targets(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        targets: &[f64],
        std_devs: &[f64],
    ) -> FfResult<Self> {
        Self::with_payload(
            rup_set,
            weight,
            weighting,
            Some(targets.to_vec()),
            Some(std_devs.to_vec()),
        )
    }

    fn with_payload(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        targets: Option<Vec<f64>>,
        std_devs: Option<Vec<f64>>,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            targets,
            std_devs,
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    fn build_rows(&self, rup_set: &RuptureSet) -> FfResult<Vec<LinearRow>> {
        let num_sections = rup_set.num_sections();
        if num_sections == 0 {
            return Err(FaultForgeError::Config(
                "Slip rate constraint needs at least one section".to_string(),
            ));
        }
        let targets = match &self.targets {
            Some(t) => t.clone(),
            None => rup_set.sections().iter().map(|s| s.slip_rate).collect(),
        };
        let std_devs = match &self.std_devs {
            Some(sd) => sd.clone(),
            None => rup_set
                .sections()
                .iter()
                .map(|s| s.slip_rate_std_dev)
                .collect(),
        };
        check_len("Slip rate targets", targets.len(), num_sections)?;
        check_len("Slip rate standard deviations", std_devs.len(), num_sections)?;
        check_finite("Slip rate targets", &targets)?;
        check_finite("Slip rate standard deviations", &std_devs)?;

        Ok((0..num_sections)
            .map(|s| {
                let mut terms = BTreeMap::new();
                for &r in rup_set.ruptures_for_section(s) {
                    if let Some(slip) = rup_set.slip_on_section(r, s) {
                        *terms.entry(r).or_insert(0.0) += slip;
                    }
                }
                LinearRow::from_terms(terms, targets[s], std_devs[s])
            })
            .collect())
    }
}

impl ConstraintEncoder for SlipRateConstraint {
    fn name(&self) -> &str {
        "Slip Rate"
    }

    fn short_name(&self) -> &str {
        "SlipRate"
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
