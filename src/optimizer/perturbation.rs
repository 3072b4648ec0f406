use fastrand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use strum_macros::{Display, EnumIter, EnumString};

const MAX_LIMIT_REDRAWS: usize = 1000;
const ZERO_BASIS: f64 = 1e-8;

/// Shape of the random step added to a rupture rate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum GenerationFunctionType {
    #[strum(serialize = "UNIFORM_NO_TEMP_DEPENDENCE")]
    #[serde(rename = "UNIFORM_NO_TEMP_DEPENDENCE")]
    UniformNoTempDependence,
    #[strum(serialize = "UNIFORM_0P0001")]
    #[serde(rename = "UNIFORM_0P0001")]
    Uniform0p0001,
    /// Scaled by the per-rupture basis.
    #[strum(serialize = "VARIABLE_NO_TEMP_DEPENDENCE")]
    #[serde(rename = "VARIABLE_NO_TEMP_DEPENDENCE")]
    VariableNoTempDependence,
    #[strum(serialize = "GAUSSIAN")]
    #[serde(rename = "GAUSSIAN")]
    Gaussian,
    #[strum(serialize = "TANGENT")]
    #[serde(rename = "TANGENT")]
    Tangent,
    #[strum(serialize = "POWER_LAW")]
    #[serde(rename = "POWER_LAW")]
    PowerLaw,
    #[strum(serialize = "EXPONENTIAL")]
    #[serde(rename = "EXPONENTIAL")]
    Exponential,
    /// Random sign, basis times a log-uniform factor in `[0.01, 100)`.
    #[strum(serialize = "VARIABLE_EXPONENTIAL_SCALE")]
    #[serde(rename = "VARIABLE_EXPONENTIAL_SCALE")]
    VariableExponentialScale,
}

impl GenerationFunctionType {
    pub fn needs_basis(self) -> bool {
        matches!(
            self,
            Self::VariableNoTempDependence | Self::VariableExponentialScale
        )
    }
}

/// How a proposal that would take a rate below zero is handled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NonnegativityConstraintType {
    /// Zero rates keep re-drawing until positive; others clamp to zero.
    TryZeroRatesOften,
    /// Re-draw a bounded number of times, then clamp to zero.
    LimitZeroRates,
    /// Rates stay strictly positive; moves away from zero are always kept.
    PreventZeroRates,
}

/// Standard normal draw via Box-Muller.
fn standard_normal(rng: &mut Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// One raw step, ignoring non-negativity. Never returns a non-finite value.
pub fn raw_perturbation(
    kind: GenerationFunctionType,
    rng: &mut Rng,
    temperature: f64,
    basis: Option<f64>,
) -> f64 {
    let basis = basis.map(|b| if b == 0.0 { ZERO_BASIS } else { b });
    let r = rng.f64();
    let p = match (kind, basis) {
        (GenerationFunctionType::UniformNoTempDependence, _) => (r - 0.5) * 0.001,
        (GenerationFunctionType::Uniform0p0001, _)
        | (GenerationFunctionType::VariableNoTempDependence, None)
        | (GenerationFunctionType::VariableExponentialScale, None) => (r - 0.5) * 0.0001,
        (GenerationFunctionType::VariableNoTempDependence, Some(b)) => (r - 0.5) * b * 1000.0,
        (GenerationFunctionType::Gaussian, _) => {
            (1.0 / temperature.sqrt())
                * standard_normal(rng)
                * 0.0001
                * (1.0 / (2.0 * temperature)).exp()
        }
        (GenerationFunctionType::Tangent, _) => temperature * 0.001 * (PI * r - PI / 2.0).tan(),
        (GenerationFunctionType::PowerLaw, _) => {
            let r2 = rng.f64();
            let sign = if r2 < 0.5 { -1.0 } else { 1.0 };
            let u = (2.0 * r2 - 1.0).abs();
            sign * temperature * 0.001 * ((1.0 + 1.0 / temperature).powf(u) - 1.0)
        }
        (GenerationFunctionType::Exponential, _) => {
            let r2 = rng.f64();
            10f64.powf(r2) * temperature * 0.001
        }
        (GenerationFunctionType::VariableExponentialScale, Some(b)) => {
            let sign = if r < 0.5 { -1.0 } else { 1.0 };
            let exponent = 4.0 * rng.f64() - 2.0;
            sign * b * 10f64.powf(exponent)
        }
    };
    if p.is_finite() {
        p
    } else {
        0.0
    }
}

/// Step that respects the non-negativity rule for a rate currently at `x`.
pub fn constrained_perturbation(
    kind: GenerationFunctionType,
    rule: NonnegativityConstraintType,
    rng: &mut Rng,
    temperature: f64,
    x: f64,
    basis: Option<f64>,
) -> f64 {
    match rule {
        NonnegativityConstraintType::TryZeroRatesOften => {
            let mut p = raw_perturbation(kind, rng, temperature, basis);
            if x == 0.0 {
                let mut tries = 0;
                while x + p < 0.0 && tries < MAX_LIMIT_REDRAWS {
                    p = raw_perturbation(kind, rng, temperature, basis);
                    tries += 1;
                }
            }
            if x + p < 0.0 {
                p = -x;
            }
            p
        }
        NonnegativityConstraintType::LimitZeroRates => {
            let mut p = raw_perturbation(kind, rng, temperature, basis);
            let mut tries = 0;
            while x + p < 0.0 && tries < MAX_LIMIT_REDRAWS {
                p = raw_perturbation(kind, rng, temperature, basis);
                tries += 1;
            }
            if x + p < 0.0 {
                p = -x;
            }
            p
        }
        NonnegativityConstraintType::PreventZeroRates => {
            let r = rng.f64();
            if x > 0.0 {
                (r - 0.5) * 2.0 * x
            } else {
                r * ZERO_BASIS
            }
        }
    }
}
