use assert_cmd::Command;
use predicates::prelude::predicate;

#[test]
fn test_self_symbols() {
    let mut cmd = Command::cargo_bin("tracesym-tests").unwrap();

    cmd.arg("self");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("resolved: tracesym_tests_marker +0x0"))
        .stdout(predicate::str::contains("address matches: true"));
}

#[test]
fn test_kernel_sorted() {
    let mut cmd = Command::cargo_bin("tracesym-tests").unwrap();

    cmd.arg("kernel");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sorted: true"));
}

#[test]
fn test_self_maps() {
    let mut cmd = Command::cargo_bin("tracesym-tests").unwrap();

    cmd.arg("maps");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("self mapped: true"));
}

#[test]
fn test_self_probes() {
    let mut cmd = Command::cargo_bin("tracesym-tests").unwrap();

    cmd.arg("usdt");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("loaded: true"));
}

#[test]
fn test_unknown_scenario() {
    let mut cmd = Command::cargo_bin("tracesym-tests").unwrap();

    cmd.arg("nope");
    cmd.assert().failure();
}
