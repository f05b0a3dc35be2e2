use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn pe() -> Command {
    let mut cmd = Command::cargo_bin("pe").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn exam_prints_summary() {
    pe().arg("exam")
        .arg("--formula")
        .arg(fixture("exam_formula.json"))
        .arg("--scores")
        .arg(fixture("exam_scores.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("exam score: 88.00"));
}

#[test]
fn exam_writes_result_with_input_digests() {
    let out = tempfile::tempdir().unwrap();
    pe().args(["--quiet", "exam"])
        .arg("--formula")
        .arg(fixture("exam_formula.json"))
        .arg("--scores")
        .arg(fixture("exam_scores.json"))
        .arg("--out")
        .arg(out.path().join("run1"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = fs::read_to_string(out.path().join("run1/result.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["kind"], "exam");
    assert_eq!(doc["result"]["score"], 88.0);
    assert_eq!(doc["result"]["score_text"], "88.00");
    assert_eq!(doc["inputs"]["formula_sha256"].as_str().unwrap().len(), 64);
    assert!(doc["result"]["log"].as_array().unwrap().len() > 3);
}

#[test]
fn rejected_special_formula_exits_validation() {
    pe().arg("exam")
        .arg("--formula")
        .arg(fixture("exam_formula_rejected.json"))
        .arg("--scores")
        .arg(fixture("exam_scores.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("special formula"));
}

#[test]
fn practical_scores_legacy_submission() {
    pe().arg("practical")
        .arg("--formula")
        .arg(fixture("practical_formula.json"))
        .arg("--submission")
        .arg(fixture("practical_legacy_submission.json"))
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("practical score: 380.00"))
        .stdout(predicate::str::contains("upgraded legacy submission"));
}

#[test]
fn practical_without_submission_scores_zero() {
    pe().arg("practical")
        .arg("--formula")
        .arg(fixture("practical_formula.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("practical score: 0.00"));
}

#[test]
fn formula_validate_reports_verdict() {
    pe().args(["formula", "validate", "({kor_std} + {math_std}) / 2 * 1.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""valid":true"#));

    pe().args(["formula", "validate", "{kor_std} + require('fs')"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains(r#""valid":false"#));
}

#[test]
fn formula_vars_flags_unknown_names() {
    pe().args(["formula", "vars", "{kor_std} * 2 + {mystery}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kor_std\n"))
        .stdout(predicate::str::contains("mystery\t(unknown)"));

    pe().args(["formula", "vars"])
        .assert()
        .success()
        .stdout(predicate::str::contains("top2_avg_pct"));
}

#[test]
fn interpolate_between_cuts() {
    pe().arg("interpolate")
        .arg("--cuts")
        .arg(fixture("grade_cuts.json"))
        .args(["--raw", "90"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""standard":127.0"#))
        .stdout(predicate::str::contains(r#""grade":2"#));
}

#[test]
fn missing_input_is_a_validation_error() {
    pe().args(["exam", "--formula", "no/such/formula.json", "--scores"])
        .arg(fixture("exam_scores.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("file not found: --formula"));
}

#[test]
fn unwritable_output_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    pe().arg("practical")
        .arg("--formula")
        .arg(fixture("practical_formula.json"))
        .arg("--out")
        .arg(blocker.join("out"))
        .assert()
        .code(4);
}

#[test]
fn malformed_json_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{\"total_score\": ").unwrap();
    pe().arg("exam")
        .arg("--formula")
        .arg(&bad)
        .arg("--scores")
        .arg(fixture("exam_scores.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("json"));
}
