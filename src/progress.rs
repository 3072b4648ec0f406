use crate::error::{FaultForgeError, FfResult};
use std::fmt::Display;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

const FIXED_HEADERS: [&str; 4] = ["Iteration", "Time (ms)", "# Perturbations", "# Non-Zero"];

/// Append-only time series of annealing snapshots.
///
/// Energies are kept in single precision, which is also what the CSV holds.
/// Values below `f32::MIN_POSITIVE` or above `f32::MAX` lose precision or
/// saturate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnealingProgress {
    energy_types: Vec<String>,
    iterations: Vec<u64>,
    times: Vec<u64>,
    perturbations: Vec<u64>,
    non_zeros: Vec<u32>,
    energies: Vec<Vec<f32>>,
}

impl AnnealingProgress {
    pub fn new(energy_types: Vec<String>) -> Self {
        Self {
            energy_types,
            ..Default::default()
        }
    }

    pub fn energy_types(&self) -> &[String] {
        &self.energy_types
    }

    /// Replaces the energy labels. Only allowed before anything is recorded
    /// or when the count does not change.
    pub fn set_energy_types(&mut self, energy_types: Vec<String>) -> FfResult<()> {
        if !self.is_empty() && energy_types.len() != self.energy_types.len() {
            return Err(FaultForgeError::Validation(format!(
                "Cannot change from {} to {} energy types after recording",
                self.energy_types.len(),
                energy_types.len()
            )));
        }
        self.energy_types = energy_types;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn add_progress(
        &mut self,
        iterations: u64,
        time_millis: u64,
        perturbations: u64,
        energies: &[f64],
        num_non_zero: u32,
    ) -> FfResult<()> {
        if energies.len() != self.energy_types.len() {
            return Err(FaultForgeError::Validation(format!(
                "Expected {} energy values, got {}",
                self.energy_types.len(),
                energies.len()
            )));
        }
        if let (Some(&last_iter), Some(&last_time)) = (self.iterations.last(), self.times.last()) {
            if iterations < last_iter || time_millis < last_time {
                return Err(FaultForgeError::Validation(format!(
                    "Progress went backwards: iteration {} at {} ms after iteration {} at {} ms",
                    iterations, time_millis, last_iter, last_time
                )));
            }
        }
        self.iterations.push(iterations);
        self.times.push(time_millis);
        self.perturbations.push(perturbations);
        self.non_zeros.push(num_non_zero);
        self.energies
            .push(energies.iter().map(|&e| e as f32).collect());
        Ok(())
    }

    pub fn iterations(&self, index: usize) -> u64 {
        self.iterations[index]
    }

    pub fn time_millis(&self, index: usize) -> u64 {
        self.times[index]
    }

    pub fn num_perturbations(&self, index: usize) -> u64 {
        self.perturbations[index]
    }

    pub fn num_non_zero(&self, index: usize) -> u32 {
        self.non_zeros[index]
    }

    pub fn energies(&self, index: usize) -> &[f32] {
        &self.energies[index]
    }

    /// Lowest total energy recorded up to and including `index`.
    pub fn min_energy_so_far(&self, index: usize) -> f32 {
        self.energies[..=index]
            .iter()
            .map(|e| e[0])
            .fold(f32::INFINITY, f32::min)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> FfResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header: Vec<&str> = FIXED_HEADERS.to_vec();
        header.extend(self.energy_types.iter().map(String::as_str));
        wtr.write_record(&header)?;

        for i in 0..self.len() {
            let mut record = vec![
                self.iterations[i].to_string(),
                self.times[i].to_string(),
                self.perturbations[i].to_string(),
                self.non_zeros[i].to_string(),
            ];
            record.extend(self.energies[i].iter().map(|e| e.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> FfResult<()> {
        let file = File::create(path)?;
        self.write_csv(file)
    }

    pub fn read_csv<R: Read>(reader: R) -> FfResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.len() < FIXED_HEADERS.len()
            || headers.iter().zip(FIXED_HEADERS).any(|(h, e)| h != e)
        {
            return Err(FaultForgeError::Validation(format!(
                "Unexpected progress header: {:?}",
                headers
            )));
        }
        let energy_types = headers
            .iter()
            .skip(FIXED_HEADERS.len())
            .map(str::to_string)
            .collect();
        let mut progress = Self::new(energy_types);

        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let iterations: u64 = parse_field(&record, line, 0)?;
            let time: u64 = parse_field(&record, line, 1)?;
            let perturbs: u64 = parse_field(&record, line, 2)?;
            let non_zero: u32 = parse_field(&record, line, 3)?;
            let energies = (FIXED_HEADERS.len()..record.len())
                .map(|i| parse_field::<f64>(&record, line, i))
                .collect::<FfResult<Vec<f64>>>()?;
            progress.add_progress(iterations, time, perturbs, &energies, non_zero)?;
        }
        Ok(progress)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FfResult<Self> {
        let file = File::open(path)?;
        Self::read_csv(file)
    }
}

fn parse_field<T>(record: &csv::StringRecord, line: usize, column: usize) -> FfResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = record.get(column).ok_or_else(|| {
        FaultForgeError::Parse(format!("Progress row {} is missing column {}", line, column))
    })?;
    raw.trim().parse::<T>().map_err(|e| {
        FaultForgeError::Parse(format!("Progress row {}, column {}: {}", line, column, e))
    })
}
