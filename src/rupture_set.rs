use crate::error::{FaultForgeError, FfResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Shear modulus used for moment calculations (Pa).
pub const SHEAR_MODULUS: f64 = 3.0e10;

/// Seismic moment (N-m) for a moment magnitude.
pub fn magnitude_to_moment(magnitude: f64) -> f64 {
    10f64.powf(1.5 * magnitude + 9.05)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultSection {
    pub id: usize,
    pub parent_id: usize,
    pub name: String,
    /// Target slip rate (m/yr)
    pub slip_rate: f64,
    #[serde(default)]
    pub slip_rate_std_dev: f64,
    /// Section area (m^2)
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    /// Section indices, ordered along the rupture trace.
    pub sections: Vec<usize>,
    pub magnitude: f64,
    /// Average slip (m) on each participating section. Empty means uniform
    /// slip derived from the rupture moment.
    #[serde(default)]
    pub slips: Vec<f64>,
}

/// Ruptures built from fault subsections, plus the participation lookups
/// every constraint builder needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRuptureSet")]
pub struct RuptureSet {
    sections: Vec<FaultSection>,
    ruptures: Vec<Rupture>,
    #[serde(skip)]
    section_ruptures: Vec<Vec<usize>>,
}

#[derive(Deserialize)]
struct RawRuptureSet {
    sections: Vec<FaultSection>,
    ruptures: Vec<Rupture>,
}

impl TryFrom<RawRuptureSet> for RuptureSet {
    type Error = FaultForgeError;

    fn try_from(raw: RawRuptureSet) -> FfResult<Self> {
        RuptureSet::new(raw.sections, raw.ruptures)
    }
}

impl RuptureSet {
    pub fn new(sections: Vec<FaultSection>, ruptures: Vec<Rupture>) -> FfResult<Self> {
        for (i, s) in sections.iter().enumerate() {
            if s.id != i {
                return Err(FaultForgeError::Validation(format!(
                    "Section at index {} has id {}; ids must match positions",
                    i, s.id
                )));
            }
            if !s.slip_rate.is_finite() || s.slip_rate < 0.0 {
                return Err(FaultForgeError::Validation(format!(
                    "Section {} has invalid slip rate {}",
                    i, s.slip_rate
                )));
            }
            if !s.area.is_finite() || s.area <= 0.0 {
                return Err(FaultForgeError::Validation(format!(
                    "Section {} has invalid area {}",
                    i, s.area
                )));
            }
        }

        let mut section_ruptures = vec![Vec::new(); sections.len()];
        for (r, rup) in ruptures.iter().enumerate() {
            if rup.sections.is_empty() {
                return Err(FaultForgeError::Validation(format!(
                    "Rupture {} has no sections",
                    r
                )));
            }
            if !rup.magnitude.is_finite() {
                return Err(FaultForgeError::Validation(format!(
                    "Rupture {} has non-finite magnitude",
                    r
                )));
            }
            if !rup.slips.is_empty() && rup.slips.len() != rup.sections.len() {
                return Err(FaultForgeError::Validation(format!(
                    "Rupture {} has {} slips for {} sections",
                    r,
                    rup.slips.len(),
                    rup.sections.len()
                )));
            }
            for &s in &rup.sections {
                let list = section_ruptures.get_mut(s).ok_or_else(|| {
                    FaultForgeError::Validation(format!(
                        "Rupture {} references unknown section {}",
                        r, s
                    ))
                })?;
                list.push(r);
            }
        }

        Ok(Self {
            sections,
            ruptures,
            section_ruptures,
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> FfResult<Self> {
        let content = fs::read_to_string(path)?;
        let set = serde_json::from_str(&content)?;
        Ok(set)
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn num_ruptures(&self) -> usize {
        self.ruptures.len()
    }

    pub fn sections(&self) -> &[FaultSection] {
        &self.sections
    }

    pub fn ruptures(&self) -> &[Rupture] {
        &self.ruptures
    }

    pub fn section(&self, index: usize) -> &FaultSection {
        &self.sections[index]
    }

    pub fn rupture(&self, index: usize) -> &Rupture {
        &self.ruptures[index]
    }

    pub fn ruptures_for_section(&self, section: usize) -> &[usize] {
        &self.section_ruptures[section]
    }

    pub fn rupture_area(&self, rupture: usize) -> f64 {
        self.ruptures[rupture]
            .sections
            .iter()
            .map(|&s| self.sections[s].area)
            .sum()
    }

    pub fn rupture_moment(&self, rupture: usize) -> f64 {
        magnitude_to_moment(self.ruptures[rupture].magnitude)
    }

    /// Slip (m) on each section of a rupture, in rupture order.
    pub fn section_slips(&self, rupture: usize) -> Vec<f64> {
        let rup = &self.ruptures[rupture];
        if !rup.slips.is_empty() {
            return rup.slips.clone();
        }
        let ave = self.rupture_moment(rupture) / (SHEAR_MODULUS * self.rupture_area(rupture));
        vec![ave; rup.sections.len()]
    }

    /// Slip of a rupture on one of its sections, or `None` if the rupture
    /// does not touch the section.
    pub fn slip_on_section(&self, rupture: usize, section: usize) -> Option<f64> {
        let rup = &self.ruptures[rupture];
        let pos = rup.sections.iter().position(|&s| s == section)?;
        Some(self.section_slips(rupture)[pos])
    }

    /// Sections grouped by parent fault, each group in id order.
    pub fn parent_sections(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for s in &self.sections {
            map.entry(s.parent_id).or_default().push(s.id);
        }
        map
    }
}
