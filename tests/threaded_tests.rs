mod common;

use common::two_fault_set;
use faultforge::completion::{
    EnergyCompletionCriteria, IterationCompletionCriteria, SubCompletion,
    TimeCompletionCriteria, VariableSubTimeCompletionCriteria,
};
use faultforge::config::AnnealingParams;
use faultforge::constraints::{
    ConstraintWeightingType, InversionConstraint, MfdConstraint, MfdTarget,
    SectionTotalRateConstraint, SlipRateConstraint,
};
use faultforge::energy::TOTAL;
use faultforge::error::FaultForgeError;
use faultforge::inputs::{InputGenerator, InversionInputs};
use faultforge::optimizer::solution::read_rates_file;
use faultforge::optimizer::reweight::{MAX_ROUND_ADJUSTMENT, MAX_TOTAL_ADJUSTMENT};
use faultforge::optimizer::{AnnealingData, MisfitQuantity, ThreadedAnnealer};
use std::sync::Arc;
use tempfile::tempdir;

fn inputs() -> InversionInputs {
    let rs = two_fault_set();
    let constraints: Vec<InversionConstraint> = vec![
        SlipRateConstraint::from_rupture_set(&rs, 1.0, ConstraintWeightingType::Normalized)
            .unwrap()
            .into(),
        MfdConstraint::new(
            &rs,
            1.0,
            ConstraintWeightingType::Normalized,
            true,
            MfdTarget::gutenberg_richter(6.0, 0.1, 16, 1.0, 0.05),
            None,
        )
        .unwrap()
        .into(),
    ];
    InputGenerator::new(rs.num_ruptures(), constraints)
        .generate()
        .unwrap()
}

fn annealer(threads: usize, sub: SubCompletion, seed: u64) -> (ThreadedAnnealer, InversionInputs) {
    let inputs = inputs();
    let data = Arc::new(
        AnnealingData::from_inputs(&inputs)
            .unwrap()
            .with_basis(vec![1e-3; inputs.num_ruptures()])
            .unwrap(),
    );
    let params = AnnealingParams {
        seed: Some(seed),
        ..Default::default()
    };
    let a = ThreadedAnnealer::new(data, params, &inputs.initial, threads, sub).unwrap();
    (a, inputs)
}

#[test]
fn test_rounds_run_until_global_criteria() {
    let (mut a, _) = annealer(3, SubCompletion::Iterations(500), 1);
    let start = a.best_energy()[TOTAL];
    let end = a.iterate(&IterationCompletionCriteria::new(3_000)).unwrap();

    assert!(end.iterations >= 3_000);
    assert!(end.energy[TOTAL] < start);
    assert_eq!(end.energy, a.best_energy());
    for r in a.replicas() {
        assert_eq!(r.best_solution(), a.best_solution());
        assert_eq!(r.iteration, end.iterations);
    }
}

#[test]
fn test_best_mode_is_reproducible_with_seed() {
    let run = || {
        let (mut a, _) = annealer(2, SubCompletion::Iterations(400), 17);
        a.iterate(&IterationCompletionCriteria::new(2_000)).unwrap();
        a.best_solution().to_vec()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_average_mode_shares_the_mean() {
    let (a, _) = annealer(4, SubCompletion::Iterations(300), 5);
    let mut a = a.with_average(true);
    let end = a.iterate(&IterationCompletionCriteria::new(900)).unwrap();

    let first = a.replicas()[0].best_solution().to_vec();
    for r in a.replicas() {
        assert_eq!(r.best_solution(), first.as_slice());
    }
    let full = a.replicas()[0].calculate_energy(&first).unwrap();
    assert!((full[TOTAL] - end.energy[TOTAL]).abs() <= 1e-9 * full[TOTAL].max(1.0));
    assert!(end.num_perturbs_kept > 0);
}

#[test]
fn test_checkpoints_are_written() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("run");
    let (a, inputs) = annealer(2, SubCompletion::Time(TimeCompletionCriteria::new(15)), 3);
    let mut a = a.with_checkpoints(10, &prefix, None);
    a.iterate(&TimeCompletionCriteria::new(60)).unwrap();

    let checkpoints: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("run_checkpoint_") && name.ends_with(".csv"))
        .collect();
    assert!(!checkpoints.is_empty());

    let rates = read_rates_file(dir.path().join(&checkpoints[0])).unwrap();
    assert_eq!(rates.len(), inputs.num_ruptures());
}

#[test]
fn test_variable_sub_time_needs_bounded_global() {
    let sub = SubCompletion::VariableTime(Arc::new(
        VariableSubTimeCompletionCriteria::new(50, 10).unwrap(),
    ));
    let (mut a, _) = annealer(2, sub, 1);
    let err = a.iterate(&EnergyCompletionCriteria::new(0.0));
    assert!(matches!(err, Err(FaultForgeError::UnsupportedState(_))));
}

#[test]
fn test_zero_threads_rejected() {
    let inputs = inputs();
    let data = Arc::new(AnnealingData::from_inputs(&inputs).unwrap());
    let err = ThreadedAnnealer::new(
        data,
        AnnealingParams::default(),
        &inputs.initial,
        0,
        SubCompletion::Iterations(10),
    );
    assert!(matches!(err, Err(FaultForgeError::Config(_))));
}

#[test]
fn test_reweighting_moves_uncertainty_weights_within_bounds() {
    let rs = two_fault_set();
    let nbu = ConstraintWeightingType::NormalizedByUncertainty;
    let n = rs.num_sections();
    let constraints: Vec<InversionConstraint> = vec![
        SlipRateConstraint::from_rupture_set(&rs, 1.0, nbu).unwrap().into(),
        SectionTotalRateConstraint::new(&rs, 1.0, nbu, &vec![0.02; n], &vec![0.002; n])
            .unwrap()
            .into(),
    ];
    let inputs = InputGenerator::new(rs.num_ruptures(), constraints)
        .generate()
        .unwrap();
    let data = Arc::new(
        AnnealingData::from_inputs(&inputs)
            .unwrap()
            .with_basis(vec![1e-3; inputs.num_ruptures()])
            .unwrap(),
    );
    let params = AnnealingParams {
        seed: Some(9),
        ..Default::default()
    };
    let sub = SubCompletion::Iterations(300);
    let mut a = ThreadedAnnealer::new(data, params, &inputs.initial, 2, sub)
        .unwrap()
        .with_reweighting(MisfitQuantity::Mad)
        .unwrap();
    let end = a.iterate(&IterationCompletionCriteria::new(1_200)).unwrap();

    let history = a.reweighter().unwrap().history();
    assert!(!history.is_empty());
    let mut prev = vec![1.0, 1.0];
    for round in history {
        for (&w, &p) in round.weights.iter().zip(&prev) {
            assert!(w >= p / MAX_ROUND_ADJUSTMENT * (1.0 - 1e-12));
            assert!(w <= p * MAX_ROUND_ADJUSTMENT * (1.0 + 1e-12));
            assert!(w >= 1.0 / MAX_TOTAL_ADJUSTMENT && w <= MAX_TOTAL_ADJUSTMENT);
        }
        prev = round.weights.clone();
    }
    let weights: Vec<f64> = a.constraint_ranges().iter().map(|r| r.weight).collect();
    assert_eq!(weights, prev);
    assert!(weights.iter().any(|&w| w != 1.0));

    // Final energy is measured against the re-weighted system.
    let full = a.replicas()[0].calculate_energy(a.best_solution()).unwrap();
    assert!((full[TOTAL] - end.energy[TOTAL]).abs() <= 1e-9 * full[TOTAL].max(1.0));
}

#[test]
fn test_reweighting_needs_uncertainty_weighted_constraints() {
    let (a, _) = annealer(1, SubCompletion::Iterations(100), 1);
    assert!(matches!(
        a.with_reweighting(MisfitQuantity::Rmse),
        Err(FaultForgeError::Config(_))
    ));
}
