use crate::error::{FaultForgeError, FfResult};
use tracing::warn;

/// Row-major sparse matrix used while assembling constraint blocks.
///
/// Each row keeps its non-zero entries sorted by column, so lookups are a
/// binary search and enumeration is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<Vec<(usize, f64)>>,
    num_cols: usize,
}

impl SparseMatrix {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            rows: vec![Vec::new(); num_rows],
            num_cols,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let entries = &self.rows[row];
        match entries.binary_search_by_key(&col, |&(c, _)| c) {
            Ok(pos) => entries[pos].1,
            Err(_) => 0.0,
        }
    }

    /// Sets a cell. Writing zero removes the entry.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(
            col < self.num_cols,
            "column {} out of bounds ({} columns)",
            col,
            self.num_cols
        );
        let entries = &mut self.rows[row];
        match entries.binary_search_by_key(&col, |&(c, _)| c) {
            Ok(pos) => {
                if value == 0.0 {
                    entries.remove(pos);
                } else {
                    entries[pos].1 = value;
                }
            }
            Err(pos) => {
                if value != 0.0 {
                    entries.insert(pos, (col, value));
                }
            }
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let current = self.get(row, col);
        self.set(row, col, current + value);
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn row(&self, row: usize) -> &[(usize, f64)] {
        &self.rows[row]
    }

    /// All non-zero cells as `(row, col, value)`, row-major.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, entries)| entries.iter().map(move |&(c, v)| (r, c, v)))
    }

    /// Computes `A * x`.
    pub fn mult(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|entries| entries.iter().map(|&(c, v)| v * x[c]).sum())
            .collect()
    }
}

/// Column-organized, read-only view of an assembled system, used by the
/// annealing inner loop to update only the rows a perturbed column touches.
#[derive(Debug, Clone)]
pub struct ColumnData {
    pub num_rows: usize,
    pub num_cols: usize,
    pub col_rows: Vec<Vec<usize>>,
    pub col_values: Vec<Vec<f64>>,
    pub d: Vec<f64>,
    pub max_rows_per_col: usize,
    pub empty_rows: usize,
}

impl ColumnData {
    /// Builds the column view. Targets of rows with no coefficients are zeroed
    /// so those rows contribute no energy.
    pub fn new(a: &SparseMatrix, d: &[f64]) -> FfResult<Self> {
        if d.len() != a.num_rows() {
            return Err(FaultForgeError::Validation(format!(
                "Data vector has {} entries for {} matrix rows",
                d.len(),
                a.num_rows()
            )));
        }

        let num_cols = a.num_cols();
        let mut col_rows = vec![Vec::new(); num_cols];
        let mut col_values = vec![Vec::new(); num_cols];
        let mut d = d.to_vec();
        let mut empty_rows = 0;

        for r in 0..a.num_rows() {
            let entries = a.row(r);
            if entries.is_empty() {
                d[r] = 0.0;
                empty_rows += 1;
                continue;
            }
            for &(c, v) in entries {
                if !v.is_finite() {
                    return Err(FaultForgeError::Numerical(format!(
                        "Non-finite coefficient at row {}, column {}",
                        r, c
                    )));
                }
                col_rows[c].push(r);
                col_values[c].push(v);
            }
        }

        if empty_rows > 0 {
            warn!(empty_rows, "Matrix has rows with no coefficients; they carry no energy");
        }

        let max_rows_per_col = col_rows.iter().map(Vec::len).max().unwrap_or(0);

        Ok(Self {
            num_rows: a.num_rows(),
            num_cols,
            col_rows,
            col_values,
            d,
            max_rows_per_col,
            empty_rows,
        })
    }

    pub fn misfit(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_rows];
        self.misfit_into(x, &mut out);
        out
    }

    /// Writes `A * x - d` into `out`.
    pub fn misfit_into(&self, x: &[f64], out: &mut [f64]) {
        for (o, &d) in out.iter_mut().zip(&self.d) {
            *o = -d;
        }
        for (c, &xc) in x.iter().enumerate() {
            if xc == 0.0 {
                continue;
            }
            for (&r, &v) in self.col_rows[c].iter().zip(&self.col_values[c]) {
                out[r] = v.mul_add(xc, out[r]);
            }
        }
    }

    /// Copy with every coefficient and target of row `r` multiplied by
    /// `scalars[r]`.
    pub fn scale_rows(&self, scalars: &[f64]) -> FfResult<Self> {
        if scalars.len() != self.num_rows {
            return Err(FaultForgeError::Validation(format!(
                "{} row scalars for {} rows",
                scalars.len(),
                self.num_rows
            )));
        }
        if let Some(r) = scalars.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(FaultForgeError::Numerical(format!(
                "Row scalar {} for row {} must be finite and positive",
                scalars[r], r
            )));
        }
        let mut scaled = self.clone();
        for (rows, values) in scaled.col_rows.iter().zip(scaled.col_values.iter_mut()) {
            for (&r, v) in rows.iter().zip(values.iter_mut()) {
                *v *= scalars[r];
            }
        }
        for (d, &s) in scaled.d.iter_mut().zip(scalars) {
            *d *= s;
        }
        Ok(scaled)
    }
}
