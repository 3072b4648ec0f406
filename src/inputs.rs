use crate::constraints::{ConstraintEncoder, ConstraintRange, InversionConstraint};
use crate::error::{FaultForgeError, FfResult};
use crate::matrix::SparseMatrix;
use std::time::Instant;
use tracing::{debug, info};

/// Assembled linear system handed to the annealer.
#[derive(Debug, Clone)]
pub struct InversionInputs {
    pub a: SparseMatrix,
    pub d: Vec<f64>,
    pub a_ineq: SparseMatrix,
    pub d_ineq: Vec<f64>,
    pub initial: Vec<f64>,
    pub water_level: Option<Vec<f64>>,
    pub ranges: Vec<ConstraintRange>,
}

impl InversionInputs {
    pub fn num_ruptures(&self) -> usize {
        self.a.num_cols()
    }

    pub fn has_inequality(&self) -> bool {
        self.a_ineq.num_rows() > 0
    }

    /// Adds the water level back onto an annealed solution.
    pub fn adjust_solution_for_water_level(&self, solution: &[f64]) -> Vec<f64> {
        match &self.water_level {
            Some(wl) => solution.iter().zip(wl).map(|(x, w)| x + w).collect(),
            None => solution.to_vec(),
        }
    }
}

/// Lays constraints out in stacked row blocks. Equality and inequality
/// constraints get separate row counters since they live in separate systems.
pub fn build_constraint_ranges(
    constraints: &[InversionConstraint],
) -> FfResult<Vec<ConstraintRange>> {
    let mut eq_row = 0;
    let mut ineq_row = 0;
    let mut ranges = Vec::with_capacity(constraints.len());
    for c in constraints {
        let rows = c.num_rows();
        if rows == 0 {
            return Err(FaultForgeError::Config(format!(
                "Constraint '{}' has no rows (is it attached to a rupture set?)",
                c.name()
            )));
        }
        let counter = if c.is_inequality() {
            &mut ineq_row
        } else {
            &mut eq_row
        };
        let start_row = *counter;
        *counter += rows;
        ranges.push(ConstraintRange {
            name: c.name().to_string(),
            short_name: c.short_name().to_string(),
            start_row,
            end_row: start_row + rows,
            inequality: c.is_inequality(),
            weight: c.weight(),
            weighting: c.weighting_type(),
        });
    }
    Ok(ranges)
}

pub struct InputGenerator {
    num_ruptures: usize,
    constraints: Vec<InversionConstraint>,
    initial: Option<Vec<f64>>,
    water_level: Option<Vec<f64>>,
}

impl InputGenerator {
    pub fn new(num_ruptures: usize, constraints: Vec<InversionConstraint>) -> Self {
        Self {
            num_ruptures,
            constraints,
            initial: None,
            water_level: None,
        }
    }

    pub fn with_initial(mut self, initial: Vec<f64>) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Minimum rates every rupture keeps; the annealer solves for the excess.
    pub fn with_water_level(mut self, water_level: Vec<f64>) -> Self {
        self.water_level = Some(water_level);
        self
    }

    pub fn constraints(&self) -> &[InversionConstraint] {
        &self.constraints
    }

    pub fn generate(&self) -> FfResult<InversionInputs> {
        if self.constraints.is_empty() {
            return Err(FaultForgeError::Config(
                "No constraints to encode".to_string(),
            ));
        }
        let n = self.num_ruptures;
        let initial = match &self.initial {
            Some(v) => {
                check_rupture_len("Initial solution", v, n)?;
                if v.iter().any(|&x| !(x >= 0.0 && x.is_finite())) {
                    return Err(FaultForgeError::Validation(
                        "Initial rates must be finite and non-negative".to_string(),
                    ));
                }
                v.clone()
            }
            None => vec![0.0; n],
        };
        if let Some(wl) = &self.water_level {
            check_rupture_len("Water level", wl, n)?;
            if wl.iter().any(|&w| w < 0.0) {
                return Err(FaultForgeError::Validation(
                    "Water level rates must be non-negative".to_string(),
                ));
            }
        }

        let ranges = build_constraint_ranges(&self.constraints)?;
        let eq_rows: usize = ranges
            .iter()
            .filter(|r| !r.inequality)
            .map(ConstraintRange::num_rows)
            .sum();
        let ineq_rows: usize = ranges
            .iter()
            .filter(|r| r.inequality)
            .map(ConstraintRange::num_rows)
            .sum();
        info!(
            ruptures = n,
            equality_rows = eq_rows,
            inequality_rows = ineq_rows,
            "Encoding {} constraints",
            self.constraints.len()
        );

        let mut a = SparseMatrix::new(eq_rows, n);
        let mut d = vec![0.0; eq_rows];
        let mut a_ineq = SparseMatrix::new(ineq_rows, n);
        let mut d_ineq = vec![0.0; ineq_rows];

        for (c, range) in self.constraints.iter().zip(&ranges) {
            let start = Instant::now();
            let count = if range.inequality {
                c.encode(&mut a_ineq, &mut d_ineq, range.start_row)?
            } else {
                c.encode(&mut a, &mut d, range.start_row)?
            };
            let cells = (range.num_rows() * n).max(1);
            debug!(
                constraint = c.name(),
                rows = range.num_rows(),
                non_zero = count,
                density = count as f64 / cells as f64,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Encoded constraint"
            );
        }

        let total_cells = ((eq_rows + ineq_rows) * n).max(1);
        info!(
            non_zero = a.nnz() + a_ineq.nnz(),
            density = (a.nnz() + a_ineq.nnz()) as f64 / total_cells as f64,
            "Assembled constraint system"
        );

        let mut initial = initial;
        if let Some(wl) = &self.water_level {
            for (di, shift) in d.iter_mut().zip(a.mult(wl)) {
                *di -= shift;
            }
            for (di, shift) in d_ineq.iter_mut().zip(a_ineq.mult(wl)) {
                *di -= shift;
            }
            for (x, w) in initial.iter_mut().zip(wl) {
                *x = (*x - w).max(0.0);
            }
        }

        Ok(InversionInputs {
            a,
            d,
            a_ineq,
            d_ineq,
            initial,
            water_level: self.water_level.clone(),
            ranges,
        })
    }
}

fn check_rupture_len(what: &str, values: &[f64], n: usize) -> FfResult<()> {
    if values.len() != n {
        return Err(FaultForgeError::Validation(format!(
            "{} has {} values for {} ruptures",
            what,
            values.len(),
            n
        )));
    }
    Ok(())
}
