#![allow(dead_code)]

use faultforge::rupture_set::{FaultSection, Rupture, RuptureSet};

pub fn section(id: usize, parent_id: usize, slip_rate: f64) -> FaultSection {
    FaultSection {
        id,
        parent_id,
        name: format!("Section {}", id),
        slip_rate,
        slip_rate_std_dev: slip_rate * 0.1,
        area: 1.0e8,
    }
}

pub fn rupture(sections: &[usize], magnitude: f64) -> Rupture {
    Rupture {
        sections: sections.to_vec(),
        magnitude,
        slips: Vec::new(),
    }
}

/// One rupture per section with unit slip, so section `i`'s slip rate is
/// matched exactly by rate `targets[i]` on rupture `i`.
pub fn single_section_set(targets: &[f64]) -> RuptureSet {
    let sections = targets
        .iter()
        .enumerate()
        .map(|(i, &t)| section(i, 0, t))
        .collect();
    let ruptures = (0..targets.len())
        .map(|i| Rupture {
            sections: vec![i],
            magnitude: 6.0 + 0.1 * i as f64,
            slips: vec![1.0],
        })
        .collect();
    RuptureSet::new(sections, ruptures).unwrap()
}

/// Two parent faults: parent 0 with four sections, parent 1 with two, joined
/// at sections 3 and 4. Ruptures are every contiguous run of up to three
/// sections on parent 0, each parent 1 section alone and as a pair, and two
/// ruptures jumping from parent 0 onto parent 1.
pub fn two_fault_set() -> RuptureSet {
    let sections = vec![
        section(0, 0, 0.010),
        section(1, 0, 0.012),
        section(2, 0, 0.011),
        section(3, 0, 0.009),
        section(4, 1, 0.004),
        section(5, 1, 0.005),
    ];
    let mut ruptures = Vec::new();
    for len in 1..=3 {
        for start in 0..=(4 - len) {
            let secs: Vec<usize> = (start..start + len).collect();
            ruptures.push(rupture(&secs, 6.0 + 0.3 * len as f64));
        }
    }
    ruptures.push(rupture(&[4], 6.1));
    ruptures.push(rupture(&[5], 6.2));
    ruptures.push(rupture(&[4, 5], 6.5));
    ruptures.push(rupture(&[3, 4], 6.6));
    ruptures.push(rupture(&[2, 3, 4], 6.9));
    RuptureSet::new(sections, ruptures).unwrap()
}
