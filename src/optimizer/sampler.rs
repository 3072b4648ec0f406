use crate::error::{FaultForgeError, FfResult};
use crate::matrix::ColumnData;
use fastrand::Rng;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Floor added to every energy weight so no rupture is starved.
const ENERGY_WEIGHT_FLOOR: f64 = 1e-12;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplerType {
    Uniform,
    /// Caller-supplied relative weights.
    Weighted,
    /// Proportional to how much each rupture's column touches the current
    /// misfit, refreshed periodically.
    EnergyWeighted,
}

/// Chooses which rupture to perturb next.
#[derive(Debug, Clone)]
pub enum RuptureSampler {
    Uniform {
        num_ruptures: usize,
    },
    Weighted {
        cumulative: Vec<f64>,
    },
    EnergyWeighted {
        cumulative: Vec<f64>,
        refresh_interval: u64,
        last_refresh: u64,
    },
}

fn cumulative_weights(weights: &[f64]) -> FfResult<Vec<f64>> {
    let mut total = 0.0;
    let mut cumulative = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        if !(w >= 0.0 && w.is_finite()) {
            return Err(FaultForgeError::Validation(format!(
                "Sampler weight {} for rupture {} must be finite and non-negative",
                w, i
            )));
        }
        total += w;
        cumulative.push(total);
    }
    if total <= 0.0 {
        return Err(FaultForgeError::Validation(
            "Sampler weights sum to zero".to_string(),
        ));
    }
    Ok(cumulative)
}

fn pick_cumulative(cumulative: &[f64], rng: &mut Rng) -> usize {
    let total = cumulative.last().copied().unwrap_or(0.0);
    let target = rng.f64() * total;
    let idx = cumulative.partition_point(|&c| c <= target);
    // Rounding can push the target onto the last edge.
    idx.min(cumulative.len() - 1)
}

impl RuptureSampler {
    pub fn uniform(num_ruptures: usize) -> Self {
        Self::Uniform { num_ruptures }
    }

    pub fn weighted(weights: &[f64]) -> FfResult<Self> {
        Ok(Self::Weighted {
            cumulative: cumulative_weights(weights)?,
        })
    }

    pub fn energy_weighted(num_ruptures: usize, refresh_interval: u64) -> Self {
        Self::EnergyWeighted {
            cumulative: (1..=num_ruptures).map(|i| i as f64).collect(),
            refresh_interval: refresh_interval.max(1),
            last_refresh: 0,
        }
    }

    #[inline]
    pub fn sample(&self, rng: &mut Rng) -> usize {
        match self {
            Self::Uniform { num_ruptures } => rng.usize(0..*num_ruptures),
            Self::Weighted { cumulative } | Self::EnergyWeighted { cumulative, .. } => {
                pick_cumulative(cumulative, rng)
            }
        }
    }

    /// Recomputes energy weights from the current misfit when due.
    pub fn maybe_refresh(
        &mut self,
        iteration: u64,
        eq: &ColumnData,
        misfit: &[f64],
        ineq: Option<(&ColumnData, &[f64])>,
    ) {
        let Self::EnergyWeighted {
            cumulative,
            refresh_interval,
            last_refresh,
        } = self
        else {
            return;
        };
        if *last_refresh != 0 && iteration < *last_refresh + *refresh_interval {
            return;
        }
        *last_refresh = iteration.max(1);

        let mut total = 0.0;
        for (col, slot) in cumulative.iter_mut().enumerate() {
            let mut w = ENERGY_WEIGHT_FLOOR;
            for (&r, &a) in eq.col_rows[col].iter().zip(&eq.col_values[col]) {
                w += (a * misfit[r]).abs();
            }
            if let Some((cols, m)) = ineq {
                for (&r, &a) in cols.col_rows[col].iter().zip(&cols.col_values[col]) {
                    if m[r] > 0.0 {
                        w += (a * m[r]).abs();
                    }
                }
            }
            total += w;
            *slot = total;
        }
    }
}
