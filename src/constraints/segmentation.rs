use super::{
    encode_linear_rows, AttachedRows, ConstraintEncoder, ConstraintWeightingType, LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Limits the slip carried through each jump between parent faults to the
/// conditional probability of taking that jump times the slip rate of the
/// departing section.
///
/// One row per jump. A jump is a pair of consecutive rupture sections on
/// different parents, keyed with the lower section id as the departing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipRateSegmentationConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub inequality: bool,
    pub jump_probability: f64,
    #[serde(skip)]
    jumps: Vec<(usize, usize)>,
    #[serde(skip)]
    attached: Option<AttachedRows>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

impl SlipRateSegmentationConstraint {
    pub fn new(
        rup_set: &RuptureSet,
        weight: f64,
        weighting: ConstraintWeightingType,
        inequality: bool,
        jump_probability: f64,
    ) -> FfResult<Self> {
        let mut c = Self {
            weight,
            weighting,
            inequality,
            jump_probability,
            jumps: Vec::new(),
            attached: None,
            quick_get_sets: false,
        };
        c.set_rupture_set(rup_set)?;
        Ok(c)
    }

    /// `(departing, arriving)` section pairs, one per row. Empty until
    /// attached.
    pub fn jumps(&self) -> &[(usize, usize)] {
        &self.jumps
    }

    fn build_rows(
        &self,
        rup_set: &RuptureSet,
    ) -> FfResult<(Vec<(usize, usize)>, Vec<LinearRow>)> {
        let jump_probability = self.jump_probability;
        if !(0.0..=1.0).contains(&jump_probability) {
            return Err(FaultForgeError::Config(format!(
                "Jump probability must be in [0, 1], got {}",
                jump_probability
            )));
        }

        let mut jump_rups: BTreeMap<(usize, usize), BTreeSet<usize>> = BTreeMap::new();
        for (r, rup) in rup_set.ruptures().iter().enumerate() {
            for pair in rup.sections.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if rup_set.section(a).parent_id != rup_set.section(b).parent_id {
                    jump_rups.entry((a.min(b), a.max(b))).or_default().insert(r);
                }
            }
        }

        if jump_rups.is_empty() {
            return Err(FaultForgeError::Config(
                "Rupture set has no jumps between parent faults".to_string(),
            ));
        }

        let mut departing_counts: HashMap<usize, usize> = HashMap::new();
        for &(from, _) in jump_rups.keys() {
            *departing_counts.entry(from).or_default() += 1;
        }

        let parents = rup_set.parent_sections();
        let mut jumps = Vec::with_capacity(jump_rups.len());
        let mut rows = Vec::with_capacity(jump_rups.len());

        for (&(from, to), rups) in &jump_rups {
            let siblings = &parents[&rup_set.section(from).parent_id];
            let pos = siblings.iter().position(|&s| s == from).unwrap_or(0);
            let mut denominator = departing_counts[&from] as f64 * jump_probability;
            if pos > 0 && pos + 1 < siblings.len() {
                // continuing along the same fault is the competing option
                denominator += 1.0;
            } else {
                // leftover probability at a fault end is termination
                denominator = denominator.max(1.0);
            }
            let conditional = jump_probability / denominator;
            let target = conditional * rup_set.section(from).slip_rate;

            let mut terms = BTreeMap::new();
            for &r in rups {
                if let Some(slip) = rup_set.slip_on_section(r, from) {
                    terms.insert(r, slip);
                }
            }
            jumps.push((from, to));
            rows.push(LinearRow::from_terms(terms, target, 0.0));
        }
        Ok((jumps, rows))
    }
}

impl ConstraintEncoder for SlipRateSegmentationConstraint {
    fn name(&self) -> &str {
        "Slip Rate Segmentation"
    }

    fn short_name(&self) -> &str {
        "SlipSeg"
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
        let (jumps, rows) = self.build_rows(rup_set)?;
        self.jumps = jumps;
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
