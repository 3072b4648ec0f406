pub mod a_priori;
pub mod laplacian;
pub mod mfd;
pub mod paleo_rate;
pub mod paleo_slip;
pub mod parkfield;
pub mod relative_b_value;
pub mod rup_rate_minimization;
pub mod rup_rate_smoothing;
pub mod section_total_rate;
pub mod segmentation;
pub mod slip_rate;
pub mod total_moment;

pub use a_priori::APrioriConstraint;
pub use laplacian::LaplacianSmoothingConstraint;
pub use mfd::{MfdConstraint, MfdTarget};
pub use paleo_rate::{paleo_visibility, PaleoRateConstraint, PaleoSite};
pub use paleo_slip::{PaleoSlipConstraint, PaleoSlipSite};
pub use parkfield::ParkfieldConstraint;
pub use relative_b_value::RelativeBValueConstraint;
pub use rup_rate_minimization::RupRateMinimizationConstraint;
pub use rup_rate_smoothing::RupRateSmoothingConstraint;
pub use section_total_rate::SectionTotalRateConstraint;
pub use segmentation::SlipRateSegmentationConstraint;
pub use slip_rate::SlipRateConstraint;
pub use total_moment::TotalMomentConstraint;

use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use crate::rupture_set::RuptureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::debug;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintWeightingType {
    /// Global weight only.
    Unnormalized,
    /// Each row divided by its own target.
    Normalized,
    /// Each row divided by its standard deviation.
    NormalizedByUncertainty,
}

impl ConstraintWeightingType {
    /// Coefficient scalar and data value for a row with the given target.
    ///
    /// Returns `None` for a degenerate row (zero target when normalizing by
    /// target, missing or zero standard deviation when normalizing by
    /// uncertainty). Degenerate rows are left empty.
    pub fn row_scale(self, target: f64, std_dev: f64) -> Option<(f64, f64)> {
        match self {
            Self::Unnormalized => Some((1.0, target)),
            Self::Normalized => {
                if target != 0.0 && target.is_finite() {
                    Some((1.0 / target, 1.0))
                } else {
                    None
                }
            }
            Self::NormalizedByUncertainty => {
                if std_dev > 0.0 && std_dev.is_finite() {
                    Some((1.0 / std_dev, target / std_dev))
                } else {
                    None
                }
            }
        }
    }
}

/// One linear equation: `sum(coef * x[col]) = target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRow {
    pub terms: Vec<(usize, f64)>,
    pub target: f64,
    #[serde(default)]
    pub std_dev: f64,
}

impl LinearRow {
    /// Builds a row from accumulated coefficients, dropping exact zeros.
    pub fn from_terms(terms: BTreeMap<usize, f64>, target: f64, std_dev: f64) -> Self {
        Self {
            terms: terms.into_iter().filter(|&(_, v)| v != 0.0).collect(),
            target,
            std_dev,
        }
    }
}

/// A contiguous block of rows belonging to one constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRange {
    pub name: String,
    pub short_name: String,
    pub start_row: usize,
    /// Exclusive
    pub end_row: usize,
    pub inequality: bool,
    pub weight: f64,
    pub weighting: ConstraintWeightingType,
}

impl ConstraintRange {
    pub fn contains(&self, row: usize, inequality: bool) -> bool {
        self.inequality == inequality && row >= self.start_row && row < self.end_row
    }

    pub fn num_rows(&self) -> usize {
        self.end_row - self.start_row
    }
}

/// Common contract of every constraint kind.
pub trait ConstraintEncoder {
    fn name(&self) -> &str;
    fn short_name(&self) -> &str;
    fn weight(&self) -> f64;
    fn set_weight(&mut self, weight: f64);
    fn weighting_type(&self) -> ConstraintWeightingType;

    fn is_inequality(&self) -> bool {
        false
    }

    fn num_rows(&self) -> usize;

    /// Rebuilds the encoded rows from the serialized payload against
    /// `rup_set`. Constructors do this already; a constraint read back from
    /// JSON carries only its payload and encodes nothing until attached.
    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()>;

    /// Skips per-cell bounds checks while encoding. The row window itself is
    /// always validated.
    fn set_quick_get_sets(&mut self, quick: bool);

    /// Writes rows `[start_row, start_row + num_rows())` of `a` and `d`,
    /// returning the number of non-zero coefficients written.
    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64>;
}

/// Row-relative writer that keeps every write inside a constraint's window.
pub(crate) struct RowWriter<'a> {
    a: &'a mut SparseMatrix,
    d: &'a mut [f64],
    start_row: usize,
    num_rows: usize,
    checked: bool,
    count: u64,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(
        a: &'a mut SparseMatrix,
        d: &'a mut [f64],
        start_row: usize,
        num_rows: usize,
        num_cols: usize,
        checked: bool,
    ) -> FfResult<Self> {
        if num_rows == 0 {
            return Err(FaultForgeError::Config(
                "Constraint encodes zero rows".to_string(),
            ));
        }
        if a.num_cols() != num_cols {
            return Err(FaultForgeError::Config(format!(
                "Matrix has {} columns, constraint expects {}",
                a.num_cols(),
                num_cols
            )));
        }
        let end = start_row + num_rows;
        if end > a.num_rows() || end > d.len() {
            return Err(FaultForgeError::Config(format!(
                "Rows [{}, {}) fall outside a system with {} matrix rows and {} data rows",
                start_row,
                end,
                a.num_rows(),
                d.len()
            )));
        }
        Ok(Self {
            a,
            d,
            start_row,
            num_rows,
            checked,
            count: 0,
        })
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) -> FfResult<()> {
        if self.checked {
            if row >= self.num_rows {
                return Err(FaultForgeError::Validation(format!(
                    "Local row {} outside window of {} rows",
                    row, self.num_rows
                )));
            }
            if col >= self.a.num_cols() {
                return Err(FaultForgeError::Validation(format!(
                    "Column {} outside matrix with {} columns",
                    col,
                    self.a.num_cols()
                )));
            }
        }
        if value != 0.0 {
            self.count += 1;
        }
        self.a.set(self.start_row + row, col, value);
        Ok(())
    }

    pub(crate) fn set_d(&mut self, row: usize, value: f64) -> FfResult<()> {
        if self.checked && row >= self.num_rows {
            return Err(FaultForgeError::Validation(format!(
                "Local row {} outside window of {} rows",
                row, self.num_rows
            )));
        }
        self.d[self.start_row + row] = value;
        Ok(())
    }

    pub(crate) fn finish(self) -> u64 {
        self.count
    }
}

/// Rows derived from a constraint's payload and the rupture set it was
/// attached to. Never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachedRows {
    pub num_ruptures: usize,
    pub rows: Vec<LinearRow>,
}

impl AttachedRows {
    pub(crate) fn new(num_ruptures: usize, rows: Vec<LinearRow>) -> Self {
        Self { num_ruptures, rows }
    }

    pub(crate) fn num_rows(attached: &Option<Self>) -> usize {
        attached.as_ref().map_or(0, |a| a.rows.len())
    }

    /// The attached rows, or an error naming the constraint that was never
    /// given a rupture set.
    pub(crate) fn require<'a>(attached: &'a Option<Self>, name: &str) -> FfResult<&'a Self> {
        attached.as_ref().ok_or_else(|| {
            FaultForgeError::UnsupportedState(format!(
                "{} constraint is not attached to a rupture set",
                name
            ))
        })
    }
}

/// Shared encoding for constraints expressed as linear rows.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_linear_rows(
    name: &str,
    rows: &[LinearRow],
    weight: f64,
    weighting: ConstraintWeightingType,
    num_cols: usize,
    quick: bool,
    a: &mut SparseMatrix,
    d: &mut [f64],
    start_row: usize,
) -> FfResult<u64> {
    let mut writer = RowWriter::new(a, d, start_row, rows.len(), num_cols, !quick)?;
    let mut degenerate = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let Some((scalar, d_value)) = weighting.row_scale(row.target, row.std_dev) else {
            degenerate += 1;
            continue;
        };
        for &(col, coef) in &row.terms {
            writer.set(i, col, weight * coef * scalar)?;
        }
        writer.set_d(i, weight * d_value)?;
    }
    if degenerate > 0 {
        debug!(constraint = name, degenerate, "Left degenerate rows empty");
    }
    Ok(writer.finish())
}

/// Fails fast when a per-item input does not line up with the rupture set.
pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> FfResult<()> {
    if actual != expected {
        return Err(FaultForgeError::Validation(format!(
            "{} has {} values, expected {}",
            what, actual, expected
        )));
    }
    Ok(())
}

pub(crate) fn check_finite(what: &str, values: &[f64]) -> FfResult<()> {
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(FaultForgeError::Validation(format!(
            "{} has a non-finite value at index {}",
            what, pos
        )));
    }
    Ok(())
}

/// Tagged constraint family. Serialized as JSON keyed by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InversionConstraint {
    APriori(APrioriConstraint),
    SlipRate(SlipRateConstraint),
    Mfd(MfdConstraint),
    LaplacianSmoothing(LaplacianSmoothingConstraint),
    PaleoRate(PaleoRateConstraint),
    PaleoSlip(PaleoSlipConstraint),
    Parkfield(ParkfieldConstraint),
    RupRateMinimization(RupRateMinimizationConstraint),
    RupRateSmoothing(RupRateSmoothingConstraint),
    TotalMoment(TotalMomentConstraint),
    SlipRateSegmentation(SlipRateSegmentationConstraint),
    RelativeBValue(RelativeBValueConstraint),
    SectionTotalRate(SectionTotalRateConstraint),
}

impl InversionConstraint {
    fn inner(&self) -> &dyn ConstraintEncoder {
        match self {
            Self::APriori(c) => c,
            Self::SlipRate(c) => c,
            Self::Mfd(c) => c,
            Self::LaplacianSmoothing(c) => c,
            Self::PaleoRate(c) => c,
            Self::PaleoSlip(c) => c,
            Self::Parkfield(c) => c,
            Self::RupRateMinimization(c) => c,
            Self::RupRateSmoothing(c) => c,
            Self::TotalMoment(c) => c,
            Self::SlipRateSegmentation(c) => c,
            Self::RelativeBValue(c) => c,
            Self::SectionTotalRate(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ConstraintEncoder {
        match self {
            Self::APriori(c) => c,
            Self::SlipRate(c) => c,
            Self::Mfd(c) => c,
            Self::LaplacianSmoothing(c) => c,
            Self::PaleoRate(c) => c,
            Self::PaleoSlip(c) => c,
            Self::Parkfield(c) => c,
            Self::RupRateMinimization(c) => c,
            Self::RupRateSmoothing(c) => c,
            Self::TotalMoment(c) => c,
            Self::SlipRateSegmentation(c) => c,
            Self::RelativeBValue(c) => c,
            Self::SectionTotalRate(c) => c,
        }
    }

    /// Reads a JSON constraint list and attaches every entry to `rup_set`.
    pub fn load_list<P: AsRef<std::path::Path>>(
        path: P,
        rup_set: &RuptureSet,
    ) -> FfResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        let mut constraints: Vec<Self> = serde_json::from_str(&content)?;
        for c in &mut constraints {
            c.set_rupture_set(rup_set)?;
        }
        Ok(constraints)
    }
}

impl ConstraintEncoder for InversionConstraint {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn short_name(&self) -> &str {
        self.inner().short_name()
    }

    fn weight(&self) -> f64 {
        self.inner().weight()
    }

    fn set_weight(&mut self, weight: f64) {
        self.inner_mut().set_weight(weight)
    }

    fn weighting_type(&self) -> ConstraintWeightingType {
        self.inner().weighting_type()
    }

    fn is_inequality(&self) -> bool {
        self.inner().is_inequality()
    }

    fn num_rows(&self) -> usize {
        self.inner().num_rows()
    }

    fn set_rupture_set(&mut self, rup_set: &RuptureSet) -> FfResult<()> {
        self.inner_mut().set_rupture_set(rup_set)
    }

    fn set_quick_get_sets(&mut self, quick: bool) {
        self.inner_mut().set_quick_get_sets(quick)
    }

    fn encode(&self, a: &mut SparseMatrix, d: &mut [f64], start_row: usize) -> FfResult<u64> {
        self.inner().encode(a, d, start_row)
    }
}

macro_rules! impl_from_constraint {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for InversionConstraint {
                fn from(c: $ty) -> Self {
                    Self::$variant(c)
                }
            }
        )*
    };
}

impl_from_constraint! {
    APriori => APrioriConstraint,
    SlipRate => SlipRateConstraint,
    Mfd => MfdConstraint,
    LaplacianSmoothing => LaplacianSmoothingConstraint,
    PaleoRate => PaleoRateConstraint,
    PaleoSlip => PaleoSlipConstraint,
    Parkfield => ParkfieldConstraint,
    RupRateMinimization => RupRateMinimizationConstraint,
    RupRateSmoothing => RupRateSmoothingConstraint,
    TotalMoment => TotalMomentConstraint,
    SlipRateSegmentation => SlipRateSegmentationConstraint,
    RelativeBValue => RelativeBValueConstraint,
    SectionTotalRate => SectionTotalRateConstraint,
}

/// Divides each constraint's weight by the square root of its row count so
/// that large row blocks do not dominate the energy by size alone.
pub fn normalize_weights_by_row_count(constraints: &mut [InversionConstraint]) {
    for c in constraints.iter_mut() {
        let rows = c.num_rows();
        if rows > 1 {
            let w = c.weight() / (rows as f64).sqrt();
            c.set_weight(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_scale_degenerate_cases() {
        assert_eq!(
            ConstraintWeightingType::Normalized.row_scale(0.0, 1.0),
            None
        );
        assert_eq!(
            ConstraintWeightingType::NormalizedByUncertainty.row_scale(2.0, 0.0),
            None
        );
        assert_eq!(
            ConstraintWeightingType::Normalized.row_scale(4.0, 0.0),
            Some((0.25, 1.0))
        );
        assert_eq!(
            ConstraintWeightingType::NormalizedByUncertainty.row_scale(3.0, 2.0),
            Some((0.5, 1.5))
        );
    }

    #[test]
    fn test_weighting_names() {
        assert_eq!(
            ConstraintWeightingType::NormalizedByUncertainty.to_string(),
            "NORMALIZED_BY_UNCERTAINTY"
        );
        let parsed: ConstraintWeightingType = "UNNORMALIZED".parse().unwrap();
        assert_eq!(parsed, ConstraintWeightingType::Unnormalized);
    }

    #[test]
    fn test_range_contains_respects_bucket() {
        let range = ConstraintRange {
            name: "Test".into(),
            short_name: "T".into(),
            start_row: 2,
            end_row: 5,
            inequality: false,
            weight: 1.0,
            weighting: ConstraintWeightingType::Unnormalized,
        };
        assert!(range.contains(2, false));
        assert!(range.contains(4, false));
        assert!(!range.contains(5, false));
        assert!(!range.contains(3, true));
    }
}
