use super::{
    check_finite, check_len, encode_linear_rows, ConstraintEncoder, ConstraintWeightingType,
    LinearRow,
};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};

/// Pulls individual rupture rates towards a prior estimate.
///
/// Rows depend only on the prior rates, so they are rebuilt while
/// deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAPriori")]
pub struct APrioriConstraint {
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
    pub rates: Vec<f64>,
    pub include_zeros: bool,
    #[serde(skip)]
    rows: Vec<LinearRow>,
    #[serde(skip)]
    pub quick_get_sets: bool,
}

#[derive(Deserialize)]
struct RawAPriori {
    weight: f64,
    weighting: ConstraintWeightingType,
    rates: Vec<f64>,
    #[serde(default)]
    include_zeros: bool,
}

impl TryFrom<RawAPriori> for APrioriConstraint {
    type Error = FaultForgeError;

    fn try_from(raw: RawAPriori) -> FfResult<Self> {
        APrioriConstraint::new(raw.weight, raw.weighting, &raw.rates, raw.include_zeros)
    }
}

impl APrioriConstraint {
    /// One row per rupture with a positive prior rate. With `include_zeros`,
    /// ruptures with a zero prior get a row too.
    pub fn new(
        weight: f64,
        weighting: ConstraintWeightingType,
        rates: &[f64],
        include_zeros: bool,
    ) -> FfResult<Self> {
        if weighting == ConstraintWeightingType::NormalizedByUncertainty {
            return Err(FaultForgeError::Config(
                "A-priori rates carry no uncertainty".to_string(),
            ));
        }
        let rows = build_rows(rates, include_zeros)?;
        Ok(Self {
            weight,
            weighting,
            rates: rates.to_vec(),
            include_zeros,
            rows,
            quick_get_sets: false,
        })
    }
}

fn build_rows(rates: &[f64], include_zeros: bool) -> FfResult<Vec<LinearRow>> {
    check_finite("A-priori rates", rates)?;
    if let Some(r) = rates.iter().position(|&v| v < 0.0) {
        return Err(FaultForgeError::Validation(format!(
            "Negative a-priori rate for rupture {}",
            r
        )));
    }

    let rows: Vec<LinearRow> = rates
        .iter()
        .enumerate()
        .filter(|&(_, &rate)| rate > 0.0 || include_zeros)
        .map(|(r, &rate)| LinearRow {
            terms: vec![(r, 1.0)],
            target: rate,
            std_dev: 0.0,
        })
        .collect();

    if rows.is_empty() {
        return Err(FaultForgeError::Config(
            "No a-priori rates to constrain".to_string(),
        ));
    }
    Ok(rows)
}

impl ConstraintEncoder for APrioriConstraint {
    fn name(&self) -> &str {
        "A Priori"
    }

    fn short_name(&self) -> &str {
        "APriori"
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
        self.rows.len()
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        check_len("A-priori rates", self.rates.len(), rup_set.num_ruptures())?;
        self.rows = build_rows(&self.rates, self.include_zeros)?;
        Ok(())
    }

    fn set_quick_get_sets(&mut self, quick: bool) {
        self.quick_get_sets = quick;
    }

    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64> {
        encode_linear_rows(
            self.name(),
            &self.rows,
            self.weight,
            self.weighting,
            self.rates.len(),
            self.quick_get_sets,
            a,
            d,
            start_row,
        )
    }
}
