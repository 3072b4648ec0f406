use super::{
    check_finite, check_len, encode_linear_rows, AttachedRows, ConstraintEncoder,
    ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};

/// Matches the total participation rate of each section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTotalRateConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub targets: Vec<f64>,
    pub std_devs: Vec<f64>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl SectionTotalRateConstraint {
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        targets: &[f64],
        std_devs: &[f64],
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            targets: targets.to_vec(),
            std_devs: std_devs.to_vec(),
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
                "Section rate constraint needs at least one section".to_string(),
            ));
        }
        check_len("Section rate targets", self.targets.len(), num_sections)?;
        check_len(
            "Section rate standard deviations",
            self.std_devs.len(),
            num_sections,
        )?;
        check_finite("Section rate targets", &self.targets)?;
        check_finite("Section rate standard deviations", &self.std_devs)?;

        Ok((0..num_sections)
            .map(|s| LinearRow {
                terms: rup_set
                    .ruptures_for_section(s)
                    .iter()
                    .map(|&r| (r, 1.0))
                    .collect(),
                target: self.targets[s],
                std_dev: self.std_devs[s],
            })
            .collect())
    }
}

impl ConstraintEncoder for SectionTotalRateConstraint {
    fn name(&self) -> &str {
        "Section Total Rate"
    }

    fn short_name(&self) -> &str {
        "SectRate"
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
