use std::fmt::Write as _;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("forest-spi").unwrap()
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn localities_csv(valid: bool) -> String {
    let mut csv = String::from("locality;stratum;config\n");
    for locality in 1..=4 {
        writeln!(csv, "{locality};S1;K1").unwrap();
    }
    if !valid {
        csv.push_str("-5;S1;K1\n");
    }
    csv
}

/// Korf-shaped diameter/height sample with decimal commas.
fn sample_csv() -> String {
    let mut csv = String::from("dbh;height\n");
    for i in 0..40 {
        let d = 8.0 + 1.3 * i as f64;
        let noise = if i % 2 == 0 { 0.08 } else { -0.08 };
        let h = 1.3 + 5.0 * f64::powf(d, 0.2) + noise;
        let (d, h) = (format!("{d:.1}"), format!("{h:.2}"));
        writeln!(csv, "{};{}", d.replace('.', ","), h.replace('.', ",")).unwrap();
    }
    csv
}

#[test]
fn test_validate_passing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "localities.csv", &localities_csv(true));
    cmd()
        .args(["validate", "--dataset", "localities", "--input", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 rows, 0 failure cases"));
}

#[test]
fn test_validate_failing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "localities.csv", &localities_csv(false));
    cmd()
        .args(["validate", "--dataset", "localities", "--input", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1 failure cases"))
        .stdout(predicate::str::contains("locality"));
}

#[test]
fn test_validate_unknown_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "roads.csv", "id;name\n1;north\n");
    cmd()
        .args(["validate", "--dataset", "roads", "--input", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no rules"))
        .stderr(predicate::str::contains("model_heights_prev"));
}

#[test]
fn test_fit_chooses_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "sample.csv", &sample_csv());
    cmd()
        .args(["fit", "--input", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("40 complete diameter/height pairs"))
        .stdout(predicate::str::contains("Michajlov function"))
        .stdout(predicate::str::contains("Chosen model:"));
}

#[test]
fn test_fit_forced_function() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "sample.csv", &sample_csv());
    cmd()
        .args(["fit", "--input", path.to_str().unwrap(), "--function", "Petersen"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chosen model:"))
        .stdout(predicate::str::contains("Petersen function"))
        .stdout(predicate::str::contains("Korf function").not());
}

#[test]
fn test_fit_unknown_function() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "sample.csv", &sample_csv());
    cmd()
        .args(["fit", "--input", path.to_str().unwrap(), "--function", "spline"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("spline"));
}

#[test]
fn test_fit_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "sample.csv", &sample_csv());
    cmd()
        .args(["fit", "--input", path.to_str().unwrap(), "--height-column", "h_m"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Column 'h_m' not found"));
}

#[test]
fn test_fit_too_few_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "sample.csv", "dbh;height\n20;18\n");
    cmd()
        .args(["fit", "--input", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no usable height model"));
}

#[test]
fn test_run_missing_configuration() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["run", "--unit", "LHC01", "--config-dir", dir.path().to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_missing_file() {
    cmd()
        .args(["validate", "--dataset", "trees", "--input", "nonexistent.csv"])
        .assert()
        .failure();
}

#[test]
fn test_no_subcommand() {
    cmd().assert().failure();
}

#[test]
fn test_help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Statistical forest inventory"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("forest-spi"));
}
