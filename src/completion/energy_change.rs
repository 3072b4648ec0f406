use super::{lock, CompletionCriteria, InversionState};
use std::fmt;
use std::sync::Mutex;

/// Satisfied when the energy has stopped improving: over the last
/// `look_back_millis`, the absolute drop is at most `max_abs_change` and the
/// relative drop is at most `max_percent_change` percent.
#[derive(Debug)]
pub struct EnergyChangeCompletionCriteria {
    look_back_millis: u64,
    max_percent_change: f64,
    max_abs_change: f64,
    curve: Mutex<Vec<(u64, f64)>>,
}

impl EnergyChangeCompletionCriteria {
    pub fn new(look_back_millis: u64, max_percent_change: f64, max_abs_change: f64) -> Self {
        Self {
            look_back_millis,
            max_percent_change,
            max_abs_change,
            curve: Mutex::new(Vec::new()),
        }
    }

    pub fn look_back_millis(&self) -> u64 {
        self.look_back_millis
    }

    pub fn max_percent_change(&self) -> f64 {
        self.max_percent_change
    }

    pub fn max_abs_change(&self) -> f64 {
        self.max_abs_change
    }
}

/// Linear interpolation of the energy at `time` along `curve`, which is
/// sorted by time and starts at or before `time`.
fn interpolate(curve: &[(u64, f64)], time: u64) -> f64 {
    let idx = curve.partition_point(|&(t, _)| t <= time);
    if idx == 0 {
        return curve[0].1;
    }
    let (t0, e0) = curve[idx - 1];
    if idx == curve.len() || t0 == time {
        return e0;
    }
    let (t1, e1) = curve[idx];
    let frac = (time - t0) as f64 / (t1 - t0) as f64;
    e0 + (e1 - e0) * frac
}

impl CompletionCriteria for EnergyChangeCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        let now = state.elapsed_millis;
        let energy = state.total_energy();
        let mut curve = lock(&self.curve);

        match curve.last() {
            Some(&(t, _)) if t >= now => {}
            _ => curve.push((now, energy)),
        }

        if now < self.look_back_millis {
            return false;
        }
        let target = now - self.look_back_millis;

        // Drop points older than the window but keep one at or before it.
        let first_inside = curve.partition_point(|&(t, _)| t <= target);
        if first_inside > 1 {
            curve.drain(..first_inside - 1);
        }

        let prev = interpolate(&curve, target);
        let diff = prev - energy;
        let percent = if prev == 0.0 {
            if diff == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (diff / prev).abs() * 100.0
        };
        diff <= self.max_abs_change && percent <= self.max_percent_change
    }

    fn to_arg(&self) -> Option<String> {
        Some(format!(
            "{},{},{}",
            super::time::get_time_str(self.look_back_millis),
            self.max_percent_change,
            self.max_abs_change
        ))
    }
}

impl fmt::Display for EnergyChangeCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EnergyChangeCompletionCriteria(lookBack: {}, maxPercent: {}, maxAbs: {})",
            super::time::get_time_str(self.look_back_millis),
            self.max_percent_change,
            self.max_abs_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(ms: u64, e: f64) -> InversionState {
        InversionState {
            elapsed_millis: ms,
            iterations: ms,
            energy: vec![e],
            num_perturbs_kept: 0,
            num_worse_kept: 0,
            num_non_zero: 0,
        }
    }

    #[test]
    fn test_interpolates_between_points() {
        let curve = vec![(0, 10.0), (100, 0.0)];
        assert!((interpolate(&curve, 25) - 7.5).abs() < 1e-12);
        assert_eq!(interpolate(&curve, 100), 0.0);
    }

    #[test]
    fn test_still_improving_is_not_satisfied() {
        let c = EnergyChangeCompletionCriteria::new(100, 1.0, 1.0);
        for t in (0..=500).step_by(50) {
            let e = 1000.0 - t as f64;
            assert!(!c.is_satisfied(&state(t, e)));
        }
    }

    #[test]
    fn test_prunes_old_points() {
        let c = EnergyChangeCompletionCriteria::new(100, 1.0, 1.0);
        for t in 0..1000 {
            c.is_satisfied(&state(t, 1.0));
        }
        assert!(lock(&c.curve).len() <= 102);
    }

    #[test]
    fn test_zero_energy_plateau_satisfied() {
        let c = EnergyChangeCompletionCriteria::new(10, 0.0, 0.0);
        assert!(!c.is_satisfied(&state(0, 0.0)));
        assert!(c.is_satisfied(&state(20, 0.0)));
    }
}
