//! End-to-end checks of the `vcmd` binary against the simulated stand.

use assert_cmd::Command;
use predicates::prelude::*;

fn vcmd() -> Command {
    Command::cargo_bin("vcmd").unwrap()
}

#[test]
fn demo_curve_round_trips_through_check() {
    let dir = tempfile::tempdir().unwrap();
    let curve = dir.path().join("demo.curve");

    vcmd()
        .args(["write-demo-curve"])
        .arg(&curve)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 points"));

    vcmd()
        .args(["check-curve"])
        .arg(&curve)
        .assert()
        .success()
        .stdout(predicate::str::contains("demo angle sweep"))
        .stdout(predicate::str::contains("form:     angle"));
}

#[test]
fn check_curve_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let curve = dir.path().join("bad.curve");
    std::fs::write(&curve, b"not a curve").unwrap();

    vcmd()
        .args(["check-curve"])
        .arg(&curve)
        .assert()
        .failure();
}

#[test]
fn fast_run_completes_and_writes_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let curve = dir.path().join("demo.curve");
    let telemetry = dir.path().join("telemetry.csv");

    vcmd()
        .args(["write-demo-curve", "--thrust"])
        .arg(&curve)
        .assert()
        .success();

    vcmd()
        .arg("run")
        .arg(&curve)
        .arg("--out")
        .arg(&telemetry)
        .args(["--yes", "--fast", "--go-after-ms", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run complete"));

    let text = std::fs::read_to_string(&telemetry).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("elapsed_s,segment,thrust_cmd_lbf"));
    // 3000 ms of run at a 5 ms log cadence.
    assert_eq!(lines.count(), 600);
}

#[test]
fn run_refuses_missing_curve_file() {
    vcmd()
        .args(["run", "/nonexistent/curve.bin", "--yes", "--fast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading curve file"));
}
