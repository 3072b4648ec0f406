use crate::config::AnnealingParams;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::debug;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum CoolingScheduleType {
    /// `1 / ln(i + 1)`
    #[strum(serialize = "CLASSICAL_SA")]
    #[serde(rename = "CLASSICAL_SA")]
    ClassicalSa,
    /// `1 / i`
    #[strum(serialize = "FAST_SA")]
    #[serde(rename = "FAST_SA")]
    FastSa,
    /// `exp(-(i - 1))`
    #[strum(serialize = "VERYFAST_SA")]
    #[serde(rename = "VERYFAST_SA")]
    VeryfastSa,
    /// `1 - i / span`
    #[strum(serialize = "LINEAR")]
    #[serde(rename = "LINEAR")]
    Linear,
    /// `decay^(i - 1)`
    #[strum(serialize = "EXPONENTIAL")]
    #[serde(rename = "EXPONENTIAL")]
    Exponential,
}

/// Temperature as a function of iteration.
///
/// The iteration is first divided by the slowdown factor. When adaptive
/// cooling is on, [`CoolingSchedule::observe`] shrinks an extra multiplier
/// each time the energy stops improving over a window; the multiplier only
/// ever decreases, so the schedule stays non-increasing.
#[derive(Debug, Clone)]
pub struct CoolingSchedule {
    kind: CoolingScheduleType,
    slowdown: f64,
    linear_span: f64,
    decay: f64,
    adaptive: Option<Adaptive>,
}

#[derive(Debug, Clone)]
struct Adaptive {
    window: u64,
    tolerance: f64,
    factor: f64,
    scale: f64,
    window_start_iter: u64,
    window_start_energy: f64,
}

impl CoolingSchedule {
    pub fn new(kind: CoolingScheduleType) -> Self {
        Self {
            kind,
            slowdown: 1.0,
            linear_span: 100_000.0,
            decay: 0.9999,
            adaptive: None,
        }
    }

    pub fn from_params(params: &AnnealingParams) -> Self {
        let mut schedule = Self::new(params.cooling_schedule)
            .with_slowdown(params.cooling_slowdown)
            .with_linear_span(params.linear_span)
            .with_decay(params.exponential_decay);
        if let Some(window) = params.adaptive_window {
            schedule =
                schedule.with_adaptive(window, params.adaptive_tolerance, params.adaptive_factor);
        }
        schedule
    }

    pub fn with_slowdown(mut self, slowdown: f64) -> Self {
        self.slowdown = slowdown;
        self
    }

    pub fn with_linear_span(mut self, span: f64) -> Self {
        self.linear_span = span;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_adaptive(mut self, window: u64, tolerance: f64, factor: f64) -> Self {
        self.adaptive = Some(Adaptive {
            window: window.max(1),
            tolerance,
            factor,
            scale: 1.0,
            window_start_iter: 0,
            window_start_energy: f64::INFINITY,
        });
        self
    }

    pub fn kind(&self) -> CoolingScheduleType {
        self.kind
    }

    pub fn adaptive_scale(&self) -> f64 {
        self.adaptive.as_ref().map_or(1.0, |a| a.scale)
    }

    /// Temperature at a 1-based iteration. Always strictly positive.
    pub fn temperature(&self, iteration: u64) -> f64 {
        let iter = iteration.max(1);
        let cool_iter = (iter - 1) as f64 / self.slowdown + 1.0;
        let base = match self.kind {
            CoolingScheduleType::ClassicalSa => 1.0 / (cool_iter + 1.0).ln(),
            CoolingScheduleType::FastSa => 1.0 / cool_iter,
            CoolingScheduleType::VeryfastSa => (-(cool_iter - 1.0)).exp(),
            CoolingScheduleType::Linear => 1.0 - cool_iter / self.linear_span,
            CoolingScheduleType::Exponential => self.decay.powf(cool_iter - 1.0),
        };
        (base * self.adaptive_scale()).max(f64::MIN_POSITIVE)
    }

    /// Feeds the current best energy. A window whose relative improvement
    /// falls under the tolerance multiplies the temperature by the factor.
    pub fn observe(&mut self, iteration: u64, best_energy: f64) {
        let Some(a) = self.adaptive.as_mut() else {
            return;
        };
        if a.window_start_energy.is_infinite() {
            a.window_start_iter = iteration;
            a.window_start_energy = best_energy;
            return;
        }
        if iteration < a.window_start_iter + a.window {
            return;
        }
        let prev = a.window_start_energy;
        let improvement = if prev.abs() > 0.0 {
            (prev - best_energy) / prev.abs()
        } else {
            0.0
        };
        if improvement < a.tolerance {
            a.scale *= a.factor;
            debug!(iteration, scale = a.scale, "Energy plateaued; cooling faster");
        }
        a.window_start_iter = iteration;
        a.window_start_energy = best_energy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_all_schedules_non_increasing_and_positive() {
        for kind in CoolingScheduleType::iter() {
            let s = CoolingSchedule::new(kind).with_slowdown(3.0);
            let mut prev = f64::INFINITY;
            for i in 1..300_000u64 {
                let t = s.temperature(i);
                assert!(t > 0.0, "{} at {}", kind, i);
                assert!(t <= prev, "{} increased at {}", kind, i);
                prev = t;
            }
        }
    }

    #[test]
    fn test_fast_sa_with_slowdown() {
        let s = CoolingSchedule::new(CoolingScheduleType::FastSa).with_slowdown(10.0);
        assert_eq!(s.temperature(1), 1.0);
        // Slowed iterations stay fractional: 1 + 5 / 10 = 1.5.
        assert!((s.temperature(6) - 1.0 / 1.5).abs() < 1e-12);
        assert_eq!(s.temperature(11), 0.5);
        assert!(s.temperature(10) < 1.0);
    }

    #[test]
    fn test_adaptive_only_cools() {
        let mut s = CoolingSchedule::new(CoolingScheduleType::FastSa).with_adaptive(10, 0.01, 0.5);
        s.observe(1, 100.0);
        s.observe(11, 100.0);
        assert_eq!(s.adaptive_scale(), 0.5);
        s.observe(21, 10.0);
        assert_eq!(s.adaptive_scale(), 0.5);
    }

    #[test]
    fn test_names_parse() {
        assert_eq!(
            "VERYFAST_SA".parse::<CoolingScheduleType>().unwrap(),
            CoolingScheduleType::VeryfastSa
        );
        assert_eq!(CoolingScheduleType::FastSa.to_string(), "FAST_SA");
    }
}
