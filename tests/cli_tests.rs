mod common;

use common::two_fault_set;
use faultforge::constraints::{ConstraintEncoder, InversionConstraint};
use faultforge::optimizer::solution::read_rates_file;
use faultforge::progress::AnnealingProgress;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct TestContext {
    dir: TempDir,
    rupture_set: PathBuf,
    constraints: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let rupture_set = dir.path().join("ruptures.json");
        fs::write(&rupture_set, serde_json::to_string(&two_fault_set()).unwrap()).unwrap();
        let constraints = dir.path().join("constraints.json");
        Self {
            dir,
            rupture_set,
            constraints,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_constraints(&self) -> Output {
        run(&[
            "constraints",
            "--rupture-set",
            self.rupture_set.to_str().unwrap(),
            "--output",
            self.constraints.to_str().unwrap(),
            "--mfd-total-rate",
            "0.05",
            "--mfd-inequality",
            "--smoothing-weight",
            "0.5",
        ])
    }
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_faultforge"))
        .args(args)
        .output()
        .expect("Failed to execute binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_cli_constraints_writes_list_and_table() {
    let ctx = TestContext::new();
    let output = ctx.write_constraints();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let constraints = InversionConstraint::load_list(&ctx.constraints, &two_fault_set()).unwrap();
    assert_eq!(constraints.len(), 3);
    assert!(constraints[1].is_inequality());

    let text = stdout(&output);
    let slip_row = Regex::new(r"\|\s*Slip Rate\s*\|\s*eq\s*\|\s*6\s*\|\s*0\s*\|\s*6\s*\|").unwrap();
    assert!(slip_row.is_match(&text), "STDOUT:\n{}", text);
    assert!(text.contains("MFD Inequality"));
}

#[test]
fn test_cli_invert_writes_rates_and_progress() {
    let ctx = TestContext::new();
    assert!(ctx.write_constraints().status.success());
    let rates = ctx.path("rates.csv");
    let progress = ctx.path("progress.csv");

    let output = run(&[
        "invert",
        "--rupture-set",
        ctx.rupture_set.to_str().unwrap(),
        "--constraints",
        ctx.constraints.to_str().unwrap(),
        "--completion",
        "2000i",
        "--sub-completion",
        "500",
        "--threads",
        "2",
        "--seed",
        "1",
        "--progress",
        progress.to_str().unwrap(),
        "--output",
        rates.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = fs::read_to_string(&rates).unwrap();
    assert_eq!(text.lines().next(), Some("Rupture,Rate"));
    let solution = read_rates_file(&rates).unwrap();
    assert_eq!(solution.len(), two_fault_set().num_ruptures());
    assert!(solution.iter().all(|&x| x >= 0.0));

    let recorded = AnnealingProgress::load(&progress).unwrap();
    assert!(recorded.len() >= 2);
    assert!(recorded.iterations(recorded.len() - 1) >= 2000);

    let out = stdout(&output);
    let total = Regex::new(r"\|\s*Total\s*\|\s*([0-9.eE+-]+)\s*\|").unwrap();
    let caps = total.captures(&out).expect("energy table has a total row");
    let energy: f64 = caps[1].parse().unwrap();
    assert!(energy.is_finite() && energy >= 0.0);

    let summary = run(&["progress", progress.to_str().unwrap(), "--rows", "3"]);
    assert!(summary.status.success());
    assert!(stdout(&summary).contains("Min Total"));
}

#[test]
fn test_cli_rejects_bad_completion() {
    let ctx = TestContext::new();
    assert!(ctx.write_constraints().status.success());
    let output = run(&[
        "invert",
        "--rupture-set",
        ctx.rupture_set.to_str().unwrap(),
        "--constraints",
        ctx.constraints.to_str().unwrap(),
        "--completion",
        "soon",
        "--output",
        ctx.path("rates.csv").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(!ctx.path("rates.csv").exists());
}

#[test]
fn test_cli_progress_missing_file_fails() {
    let ctx = TestContext::new();
    let output = run(&["progress", ctx.path("nope.csv").to_str().unwrap()]);
    assert!(!output.status.success());
}
