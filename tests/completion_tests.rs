use faultforge::completion::time::{get_time_str, parse_time_string};
use faultforge::completion::*;
use faultforge::error::FaultForgeError;
use rstest::rstest;
use std::sync::Arc;

const MINUTE: u64 = 60_000;

fn state(elapsed_millis: u64, iterations: u64, energy: f64) -> InversionState {
    InversionState {
        elapsed_millis,
        iterations,
        energy: vec![energy, energy, 0.0, 0.0],
        num_perturbs_kept: 0,
        num_worse_kept: 0,
        num_non_zero: 0,
    }
}

#[rstest]
#[case("2h", 7_200_000)]
#[case("90s", 90_000)]
#[case("30m", 1_800_000)]
#[case("250mi", 250)]
#[case("1500", 1_500)]
#[case(" 5M ", 300_000)]
fn test_time_string_grammar(#[case] input: &str, #[case] millis: u64) {
    assert_eq!(parse_time_string(input).unwrap(), millis);
}

#[rstest]
#[case("")]
#[case("h")]
#[case("1.5h")]
#[case("-3s")]
#[case("99999999999999999999h")]
fn test_time_string_rejects_garbage(#[case] input: &str) {
    assert!(matches!(
        parse_time_string(input),
        Err(FaultForgeError::Parse(_))
    ));
}

#[test]
fn test_time_string_formats_back() {
    assert_eq!(get_time_str(7_200_000), "2h");
    assert_eq!(get_time_str(90_000), "90s");
    let t = TimeCompletionCriteria::from_time_string("2h").unwrap();
    assert_eq!(t.millis(), 7_200_000);
    assert_eq!(t.to_arg().as_deref(), Some("2h"));
    assert_eq!(TimeCompletionCriteria::in_minutes(120), t);
}

#[rstest]
#[case("10m", "10m")]
#[case("2h", "2h")]
#[case("0.5e", "0.5e")]
#[case("1000i", "1000i")]
#[case("1000", "1000i")]
fn test_completion_arg_round_trip(#[case] input: &str, #[case] arg: &str) {
    let c = parse_completion_arg(input).unwrap();
    assert_eq!(c.to_arg().as_deref(), Some(arg));
}

#[test]
fn test_completion_arg_kinds() {
    let energy = parse_completion_arg("0.5e").unwrap();
    assert!(energy.is_satisfied(&state(0, 0, 0.5)));
    assert!(!energy.is_satisfied(&state(0, 0, 0.6)));

    let iters = parse_completion_arg("100i").unwrap();
    assert!(!iters.is_satisfied(&state(0, 99, 1.0)));
    assert!(iters.is_satisfied(&state(0, 100, 1.0)));

    let time = parse_completion_arg("1s").unwrap();
    assert!(!time.is_satisfied(&state(999, 0, 1.0)));
    assert!(time.is_satisfied(&state(1_000, 0, 1.0)));

    assert!(parse_completion_arg("abc").is_err());
    assert!(parse_completion_arg("").is_err());
}

#[test]
fn test_energy_change_flat_after_ten_minutes() {
    let c = EnergyChangeCompletionCriteria::new(5 * MINUTE, 0.1, 0.5);
    let step = MINUTE / 2;
    let mut first_satisfied = None;
    let mut t = 0;
    while t <= 20 * MINUTE {
        // Improves by 10 per minute, flat from minute 10 on.
        let energy = 1000.0 - 10.0 * (t.min(10 * MINUTE) as f64 / MINUTE as f64);
        let satisfied = c.is_satisfied(&state(t, t, energy));
        if t < 15 * MINUTE {
            assert!(!satisfied, "satisfied early at {} ms", t);
        } else {
            assert!(satisfied, "unsatisfied at {} ms", t);
            first_satisfied.get_or_insert(t);
        }
        t += step;
    }
    assert_eq!(first_satisfied, Some(15 * MINUTE));
}

#[test]
fn test_energy_change_needs_full_window() {
    let c = EnergyChangeCompletionCriteria::new(MINUTE, 100.0, 1e9);
    assert!(!c.is_satisfied(&state(0, 0, 5.0)));
    assert!(!c.is_satisfied(&state(MINUTE - 1, 1, 5.0)));
    assert!(c.is_satisfied(&state(MINUTE, 2, 5.0)));
}

#[test]
fn test_energy_change_parse() {
    let c = parse_energy_change("5m, 0.1, 0.5").unwrap();
    assert_eq!(c.look_back_millis(), 5 * MINUTE);
    assert_eq!(c.max_percent_change(), 0.1);
    assert_eq!(c.max_abs_change(), 0.5);
    assert_eq!(c.to_arg().as_deref(), Some("5m,0.1,0.5"));

    assert!(parse_energy_change("5m,0.1").is_err());
    assert!(parse_energy_change("5m,x,0.5").is_err());
}

#[test]
fn test_compound_is_or() {
    let c = CompoundCompletionCriteria::new(vec![
        Arc::new(IterationCompletionCriteria::new(100)),
        Arc::new(EnergyCompletionCriteria::new(1.0)),
    ]);
    assert!(!c.is_satisfied(&state(0, 50, 2.0)));
    assert!(c.is_satisfied(&state(0, 100, 2.0)));
    assert!(c.is_satisfied(&state(0, 50, 1.0)));
    assert!(c.is_satisfied(&state(0, 100, 1.0)));
    assert_eq!(
        c.to_string(),
        "IterationCompletionCriteria(iterations: 100) OR EnergyCompletionCriteria(energy: 1)"
    );
}

#[test]
fn test_cancel_flag_stops_compound() {
    let cancel = CancelCompletionCriteria::new();
    let c = CompoundCompletionCriteria::new(vec![
        Arc::new(IterationCompletionCriteria::new(u64::MAX)),
        Arc::new(cancel.clone()),
    ]);
    assert!(!c.is_satisfied(&state(0, 10, 1.0)));
    cancel.cancel();
    assert!(c.is_satisfied(&state(0, 11, 1.0)));
}

#[test]
fn test_variable_sub_time_interpolates() {
    let v = VariableSubTimeCompletionCriteria::new(100_000, 10_000).unwrap();
    v.set_global_criteria(&TimeCompletionCriteria::new(100_000))
        .unwrap();

    v.set_global_state(state(0, 0, 1.0));
    assert_eq!(v.threshold_millis(), 100_000);
    assert!(!v.is_satisfied(&state(99_999, 0, 1.0)));
    assert!(v.is_satisfied(&state(100_000, 0, 1.0)));

    v.set_global_state(state(50_000, 0, 1.0));
    assert_eq!(v.threshold_millis(), 55_000);

    v.set_global_state(state(100_000, 0, 1.0));
    assert_eq!(v.threshold_millis(), 10_000);

    v.set_global_state(state(500_000, 0, 1.0));
    assert_eq!(v.threshold_millis(), 10_000);
}

#[test]
fn test_variable_sub_time_follows_iteration_budget() {
    let v = VariableSubTimeCompletionCriteria::new(2_000, 1_000).unwrap();
    v.set_global_criteria(&IterationCompletionCriteria::new(1_000))
        .unwrap();
    v.set_global_state(state(0, 250, 1.0));
    assert_eq!(v.threshold_millis(), 1_750);
}

#[test]
fn test_variable_sub_time_rejects_unbounded_global() {
    let v = VariableSubTimeCompletionCriteria::new(2_000, 1_000).unwrap();
    let err = v.set_global_criteria(&EnergyCompletionCriteria::new(1.0));
    assert!(matches!(err, Err(FaultForgeError::UnsupportedState(_))));
    assert!(VariableSubTimeCompletionCriteria::new(1_000, 2_000).is_err());
}

#[rstest]
#[case("2m,30s", "2m,30s")]
#[case("5s", "5s")]
#[case("10000", "10000")]
#[case("500i", "500")]
fn test_sub_completion_grammar(#[case] input: &str, #[case] arg: &str) {
    let sub = parse_sub_completion(input).unwrap();
    assert_eq!(sub.to_arg().as_deref(), Some(arg));
}

#[test]
fn test_sub_completion_variants() {
    assert!(matches!(
        parse_sub_completion("2m,30s").unwrap(),
        SubCompletion::VariableTime(_)
    ));
    assert!(matches!(
        parse_sub_completion("5s").unwrap(),
        SubCompletion::Time(_)
    ));
    assert!(matches!(
        parse_sub_completion("1000").unwrap(),
        SubCompletion::Iterations(1000)
    ));
    assert!(parse_sub_completion("30s,2m").is_err());
}

#[test]
fn test_progress_tracking_records_and_delegates() {
    let tracking = ProgressTrackingCompletionCriteria::new(Arc::new(
        IterationCompletionCriteria::new(3),
    ));
    for i in 0..=3 {
        let done = tracking.is_satisfied(&state(i * 10, i, 10.0 - i as f64));
        assert_eq!(done, i >= 3);
    }
    let progress = tracking.progress();
    assert_eq!(progress.len(), 4);
    assert_eq!(progress.iterations(3), 3);
    assert_eq!(progress.energies(3)[0], 7.0);
    assert_eq!(tracking.to_arg().as_deref(), Some("3i"));
}
