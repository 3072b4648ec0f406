use faultforge::completion::{
    CompletionCriteria, InversionState, IterationCompletionCriteria, ProgressListener,
    ProgressTrackingCompletionCriteria,
};
use faultforge::error::{FaultForgeError, FfResult};
use faultforge::progress::AnnealingProgress;
use std::fs;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn names() -> Vec<String> {
    ["Total", "Equality", "Entropy", "Inequality", "SlipRate"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn state(i: u64, energy: f64) -> InversionState {
    InversionState {
        elapsed_millis: i * 5,
        iterations: i,
        energy: vec![energy, energy, 0.0, 0.0, energy],
        num_perturbs_kept: i / 2,
        num_worse_kept: 0,
        num_non_zero: 3,
    }
}

#[test]
fn test_csv_header_and_reload() {
    let mut p = AnnealingProgress::new(names());
    p.add_progress(10, 50, 4, &[2.5, 2.0, 0.0, 0.5, 2.0], 7).unwrap();
    p.add_progress(20, 90, 9, &[1.25, 1.0, 0.0, 0.25, 1.0], 8).unwrap();

    let mut buf = Vec::new();
    p.write_csv(&mut buf).unwrap();
    let text = String::from_utf8(buf.clone()).unwrap();
    assert_eq!(
        text.lines().next().unwrap(),
        "Iteration,Time (ms),# Perturbations,# Non-Zero,Total,Equality,Entropy,Inequality,SlipRate"
    );
    assert_eq!(text.lines().nth(2).unwrap(), "20,90,9,8,1.25,1,0,0.25,1");

    let back = AnnealingProgress::read_csv(Cursor::new(buf)).unwrap();
    assert_eq!(back, p);
}

#[test]
fn test_energies_kept_in_single_precision() {
    let mut p = AnnealingProgress::new(vec!["Total".to_string()]);
    let precise = 0.1f64 + 1e-12;
    p.add_progress(1, 1, 1, &[precise], 1).unwrap();
    assert_eq!(p.energies(0)[0], 0.1f32);
}

#[test]
fn test_bad_header_is_rejected() {
    let csv = "Iter,Time,Perturbs,NonZero,Total\n1,1,1,1,1.0\n";
    let err = AnnealingProgress::read_csv(Cursor::new(csv)).unwrap_err();
    assert!(matches!(err, FaultForgeError::Validation(_)));
}

#[test]
fn test_ragged_row_is_rejected() {
    let csv = "Iteration,Time (ms),# Perturbations,# Non-Zero,Total\n1,1,1,1\n";
    assert!(AnnealingProgress::read_csv(Cursor::new(csv)).is_err());
}

#[test]
fn test_tracking_writes_file_once_satisfied() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress.csv");
    let tracking = ProgressTrackingCompletionCriteria::new(Arc::new(
        IterationCompletionCriteria::new(4),
    ))
    .with_energy_types(names())
    .with_progress_file(&path);

    for i in 0..4 {
        assert!(!tracking.is_satisfied(&state(i, 10.0 - i as f64)));
        assert!(!path.exists());
    }
    assert!(tracking.is_satisfied(&state(4, 6.0)));
    assert!(path.exists());

    let loaded = AnnealingProgress::load(&path).unwrap();
    assert_eq!(loaded.len(), 5);
    assert_eq!(loaded.energy_types(), names().as_slice());
    assert_eq!(loaded.min_energy_so_far(4), 6.0);
}

#[test]
fn test_record_interval_thins_points() {
    let tracking = ProgressTrackingCompletionCriteria::new(Arc::new(
        IterationCompletionCriteria::new(u64::MAX),
    ))
    .with_energy_types(names())
    .with_record_interval(20);

    for i in 0..20 {
        tracking.is_satisfied(&state(i, 1.0));
    }
    // elapsed runs 0, 5, ... 95 ms; one point per 20 ms
    let p = tracking.progress();
    assert_eq!(p.len(), 5);
    assert_eq!(p.time_millis(1), 20);
}

#[test]
fn test_unwritable_progress_file_is_swallowed_then_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("progress.csv");
    let tracking = ProgressTrackingCompletionCriteria::new(Arc::new(
        IterationCompletionCriteria::new(1),
    ))
    .with_energy_types(names())
    .with_progress_file(&path);

    assert!(tracking.is_satisfied(&state(1, 1.0)));
    assert!(matches!(
        tracking.write_progress(),
        Err(FaultForgeError::Io(_))
    ));

    fs::create_dir(dir.path().join("missing")).unwrap();
    tracking.write_progress().unwrap();
    assert_eq!(AnnealingProgress::load(&path).unwrap().len(), 1);
}

struct FailingListener {
    calls: AtomicUsize,
}

impl ProgressListener for FailingListener {
    fn refresh(&self, progress: &AnnealingProgress) -> FfResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FaultForgeError::Validation(format!(
            "cannot draw {} points",
            progress.len()
        )))
    }
}

#[test]
fn test_listener_errors_do_not_stop_tracking() {
    let listener = Arc::new(FailingListener {
        calls: AtomicUsize::new(0),
    });
    let tracking = ProgressTrackingCompletionCriteria::new(Arc::new(
        IterationCompletionCriteria::new(3),
    ))
    .with_energy_types(names())
    .with_listener(listener.clone(), Duration::ZERO);

    for i in 0..3 {
        assert!(!tracking.is_satisfied(&state(i, 1.0)));
    }
    assert!(tracking.is_satisfied(&state(3, 1.0)));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 4);
    assert_eq!(tracking.progress().len(), 4);
}
