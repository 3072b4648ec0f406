//! Energy vector layout and full (non-incremental) energy evaluation.
//!
//! An energy vector is `[total, equality, entropy, inequality, range...]`
//! with one trailing entry per tracked constraint range.

use crate::constraints::ConstraintRange;
use crate::error::{FaultForgeError, FfResult};
use tracing::warn;

pub const TOTAL: usize = 0;
pub const EQUALITY: usize = 1;
pub const ENTROPY: usize = 2;
pub const INEQUALITY: usize = 3;
pub const NUM_BASE_TYPES: usize = 4;

const ENTROPY_CONSTANT: f64 = 500.0;

pub fn energy_type_names(ranges: &[ConstraintRange]) -> Vec<String> {
    let mut names: Vec<String> = ["Total", "Equality", "Entropy", "Inequality"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    names.extend(ranges.iter().map(|r| r.short_name.clone()));
    names
}

#[inline]
pub fn sum_squares(misfit: &[f64]) -> f64 {
    misfit.iter().fold(0.0, |acc, &v| v.mul_add(v, acc))
}

/// Only positive misfits (exceedances) count for inequality rows.
#[inline]
pub fn sum_squares_ineq(misfit: &[f64]) -> f64 {
    misfit
        .iter()
        .filter(|&&v| v > 0.0)
        .fold(0.0, |acc, &v| v.mul_add(v, acc))
}

/// `weight / entropy(x)`, so a more even distribution of rates has lower
/// energy.
pub fn calc_entropy_energy(solution: &[f64], relative_smoothness_wt: f64) -> FfResult<f64> {
    let total_entropy: f64 = solution.iter().map(|&x| entropy_term(x)).sum();
    if total_entropy == 0.0 {
        warn!("Solution has zero entropy");
    }
    entropy_energy(total_entropy, relative_smoothness_wt)
}

/// Contribution of one rate to the total entropy.
#[inline]
pub fn entropy_term(x: f64) -> f64 {
    if x > 0.0 {
        -ENTROPY_CONSTANT * x * (ENTROPY_CONSTANT * x).ln()
    } else {
        0.0
    }
}

/// Entropy energy from an already summed total entropy. Zero entropy is
/// treated as 0.0001.
pub fn entropy_energy(total_entropy: f64, relative_smoothness_wt: f64) -> FfResult<f64> {
    let total_entropy = if total_entropy == 0.0 {
        0.0001
    } else {
        total_entropy
    };
    if total_entropy < 0.0 {
        return Err(FaultForgeError::Numerical(format!(
            "Negative entropy {}",
            total_entropy
        )));
    }
    let energy = relative_smoothness_wt / total_entropy;
    if energy.is_nan() {
        return Err(FaultForgeError::Numerical(
            "Entropy energy is NaN".to_string(),
        ));
    }
    Ok(energy)
}

/// Full energy from equality and inequality misfits. Range entries are
/// filled only when `ranges` is non-empty.
pub fn calculate_energy(
    solution: &[f64],
    misfit: &[f64],
    misfit_ineq: &[f64],
    ranges: &[ConstraintRange],
    relative_smoothness_wt: f64,
) -> FfResult<Vec<f64>> {
    let mut energy = vec![0.0; NUM_BASE_TYPES + ranges.len()];

    let equality = if ranges.is_empty() {
        sum_squares(misfit)
    } else {
        let mut sum = 0.0;
        for (row, &m) in misfit.iter().enumerate() {
            let val = m * m;
            sum += val;
            for (j, range) in ranges.iter().enumerate() {
                if range.contains(row, false) {
                    energy[NUM_BASE_TYPES + j] += val;
                }
            }
        }
        sum
    };
    if equality.is_nan() {
        return Err(FaultForgeError::Numerical(
            "Equality energy is NaN".to_string(),
        ));
    }
    energy[EQUALITY] = equality;

    if relative_smoothness_wt > 0.0 {
        energy[ENTROPY] = calc_entropy_energy(solution, relative_smoothness_wt)?;
    }

    let inequality = if ranges.is_empty() {
        sum_squares_ineq(misfit_ineq)
    } else {
        let mut sum = 0.0;
        for (row, &m) in misfit_ineq.iter().enumerate() {
            if m > 0.0 {
                let val = m * m;
                sum += val;
                for (j, range) in ranges.iter().enumerate() {
                    if range.contains(row, true) {
                        energy[NUM_BASE_TYPES + j] += val;
                    }
                }
            }
        }
        sum
    };
    if inequality.is_nan() {
        return Err(FaultForgeError::Numerical(
            "Inequality energy is NaN".to_string(),
        ));
    }
    energy[INEQUALITY] = inequality;

    energy[TOTAL] = energy[EQUALITY] + energy[ENTROPY] + energy[INEQUALITY];
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintWeightingType;

    fn range(name: &str, start: usize, end: usize, inequality: bool) -> ConstraintRange {
        ConstraintRange {
            name: name.to_string(),
            short_name: name.to_string(),
            start_row: start,
            end_row: end,
            inequality,
            weight: 1.0,
            weighting: ConstraintWeightingType::Unnormalized,
        }
    }

    #[test]
    fn test_inequality_ignores_negative_misfit() {
        assert_eq!(sum_squares_ineq(&[-3.0, 2.0, 0.0]), 4.0);
    }

    #[test]
    fn test_energy_breakdown_by_range() {
        let ranges = vec![
            range("A", 0, 1, false),
            range("B", 1, 2, false),
            range("C", 0, 1, true),
        ];
        let e = calculate_energy(&[1.0], &[1.0, 2.0], &[3.0], &ranges, 0.0).unwrap();
        assert_eq!(e.len(), 7);
        assert_eq!(e[EQUALITY], 5.0);
        assert_eq!(e[INEQUALITY], 9.0);
        assert_eq!(e[TOTAL], 14.0);
        assert_eq!(&e[4..], &[1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_zero_entropy_is_clamped() {
        let e = calc_entropy_energy(&[0.0, 0.0], 1.0).unwrap();
        assert!((e - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_names_follow_ranges() {
        let names = energy_type_names(&[range("SlipRate", 0, 3, false)]);
        assert_eq!(names, vec!["Total", "Equality", "Entropy", "Inequality", "SlipRate"]);
    }
}
