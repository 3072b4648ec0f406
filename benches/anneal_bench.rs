use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use faultforge::completion::IterationCompletionCriteria;
use faultforge::config::AnnealingParams;
use faultforge::constraints::{
    ConstraintWeightingType, InversionConstraint, LaplacianSmoothingConstraint, MfdConstraint,
    MfdTarget, SlipRateConstraint,
};
use faultforge::inputs::{InputGenerator, InversionInputs};
use faultforge::optimizer::{AnnealingData, Replica};
use faultforge::rupture_set::{FaultSection, Rupture, RuptureSet};
use std::hint::black_box;
use std::sync::Arc;

/// A single 60-section fault with every contiguous rupture of up to eight
/// sections.
fn setup_inputs() -> InversionInputs {
    let num_sections = 60;
    let sections: Vec<FaultSection> = (0..num_sections)
        .map(|id| FaultSection {
            id,
            parent_id: id / 10,
            name: format!("Section {}", id),
            slip_rate: 0.005 + 0.0001 * (id % 7) as f64,
            slip_rate_std_dev: 0.001,
            area: 1.0e8,
        })
        .collect();
    let mut ruptures = Vec::new();
    for len in 1..=8 {
        for start in 0..=(num_sections - len) {
            ruptures.push(Rupture {
                sections: (start..start + len).collect(),
                magnitude: 6.0 + 0.15 * len as f64,
                slips: Vec::new(),
            });
        }
    }
    let rs = RuptureSet::new(sections, ruptures).expect("Failed to build rupture set");

    let constraints: Vec<InversionConstraint> = vec![
        SlipRateConstraint::from_rupture_set(&rs, 1.0, ConstraintWeightingType::Normalized)
            .expect("slip rate")
            .into(),
        MfdConstraint::new(
            &rs,
            1.0,
            ConstraintWeightingType::Normalized,
            true,
            MfdTarget::gutenberg_richter(6.1, 0.1, 13, 1.0, 0.1),
            None,
        )
        .expect("mfd")
        .into(),
        LaplacianSmoothingConstraint::from_rupture_set(&rs, 0.1)
            .expect("smoothing")
            .into(),
    ];
    InputGenerator::new(rs.num_ruptures(), constraints)
        .generate()
        .expect("Failed to generate inputs")
}

fn criterion_benchmark(c: &mut Criterion) {
    let inputs = setup_inputs();
    let n = inputs.num_ruptures();
    let data = Arc::new(
        AnnealingData::from_inputs(&inputs)
            .expect("annealing data")
            .with_basis(vec![1e-3; n])
            .expect("basis"),
    );
    let params = AnnealingParams {
        seed: Some(7),
        ..Default::default()
    };

    c.bench_function("iterate (10k perturbations)", |b| {
        b.iter_batched(
            || {
                Replica::new(data.clone(), params.clone(), &inputs.initial, Some(7))
                    .expect("replica")
            },
            |mut r| {
                r.iterate(None, &IterationCompletionCriteria::new(10_000))
                    .expect("iterate")
            },
            BatchSize::SmallInput,
        )
    });

    let replica = Replica::new(data.clone(), params, &inputs.initial, Some(7)).expect("replica");
    let rates = vec![1e-4; n];
    c.bench_function("calculate_energy (full)", |b| {
        b.iter(|| replica.calculate_energy(black_box(&rates)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
