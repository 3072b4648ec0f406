use crate::error::{FaultForgeError, FfResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct RateRecord {
    #[serde(rename = "Rupture")]
    rupture: usize,
    #[serde(rename = "Rate")]
    rate: f64,
}

pub fn write_rates<W: Write>(writer: W, rates: &[f64]) -> FfResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (rupture, &rate) in rates.iter().enumerate() {
        wtr.serialize(RateRecord { rupture, rate })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_rates_file<P: AsRef<Path>>(path: P, rates: &[f64]) -> FfResult<()> {
    write_rates(File::create(path)?, rates)
}

/// Reads a `Rupture,Rate` table. Rows must list ruptures `0..n` in order.
pub fn read_rates<R: Read>(reader: R) -> FfResult<Vec<f64>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rates = Vec::new();
    for record in rdr.deserialize() {
        let record: RateRecord = record?;
        if record.rupture != rates.len() {
            return Err(FaultForgeError::Validation(format!(
                "Expected rupture {} but found {}",
                rates.len(),
                record.rupture
            )));
        }
        rates.push(record.rate);
    }
    Ok(rates)
}

pub fn read_rates_file<P: AsRef<Path>>(path: P) -> FfResult<Vec<f64>> {
    read_rates(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_rows_rejected() {
        let csv = "Rupture,Rate\n0,0.1\n2,0.3\n";
        assert!(matches!(
            read_rates(csv.as_bytes()),
            Err(FaultForgeError::Validation(_))
        ));
    }

    #[test]
    fn test_header_written() {
        let mut buf = Vec::new();
        write_rates(&mut buf, &[0.5, 0.0]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().next(), Some("Rupture,Rate"));
        assert_eq!(read_rates(text.as_bytes()).unwrap(), vec![0.5, 0.0]);
    }
}
