//! End-to-end scoring scenarios over JSON-shaped inputs.

use pe_algo::interpolate_score;
use pe_core::{FormulaData, GradeCut, PracticalFormulaData, PracticalSubmission, StudentScores};
use pe_pipeline::{calculate_practical_score, calculate_score};
use serde_json::json;

fn practical(v: serde_json::Value) -> PracticalFormulaData {
    serde_json::from_value(v).unwrap()
}

fn submission(v: serde_json::Value) -> PracticalSubmission {
    serde_json::from_value(v).unwrap()
}

#[test]
fn grade_cut_interpolation() {
    let table: Vec<GradeCut> = serde_json::from_value(json!([
        {"grade": 1, "raw": 94, "standard": 131, "percentile": 96},
        {"grade": 2, "raw": 88, "standard": 125, "percentile": 89}
    ]))
    .unwrap();
    let r = interpolate_score(90.0, &table).unwrap();
    assert_eq!(r.standard, 127.0);
    assert_eq!(r.percentile, 91.0);
    assert_eq!(r.grade, 2);
}

fn two_event_table() -> serde_json::Value {
    json!([
        {"event": "제자리멀리뛰기", "gender": "common", "record": "280", "score": 100},
        {"event": "제자리멀리뛰기", "gender": "common", "record": "260", "score": 90},
        {"event": "제자리멀리뛰기", "gender": "common", "record": "240", "score": 80},
        {"event": "20m왕복달리기", "gender": "common", "record": "30", "score": 80},
        {"event": "20m왕복달리기", "gender": "common", "record": "50", "score": 90},
        {"event": "20m왕복달리기", "gender": "common", "record": "70", "score": 100}
    ])
}

#[test]
fn basic_mode_rescale() {
    let mut formula = practical(json!({"target_max": "400", "table": two_event_table()}));
    // Shuttle laps: more is better despite the name.
    formula
        .directions
        .insert("20m왕복달리기".into(), pe_core::Direction::HigherIsBetter);
    let sub = submission(json!({"gender": "남", "records": [
        {"event": "제자리멀리뛰기", "value": 283},
        {"event": "20m왕복달리기", "value": "55"}
    ]}));
    let r = calculate_practical_score(&formula, Some(&sub));
    assert_eq!(r.breakdown["제자리멀리뛰기"], Some(100.0));
    assert_eq!(r.breakdown["20m왕복달리기"], Some(90.0));
    assert_eq!(r.score, 380.0);
    assert_eq!(r.score_text, "380.00");
}

fn pass_count_formula() -> PracticalFormulaData {
    practical(json!({
        "mode": "special",
        "institution_id": "P204",
        "table": [
            {"event": "윗몸일으키기", "gender": "common", "record": "40", "score": "PASS"},
            {"event": "윗몸일으키기", "gender": "common", "record": "0", "score": "FAIL"},
            {"event": "턱걸이", "gender": "common", "record": "10", "score": "PASS"},
            {"event": "턱걸이", "gender": "common", "record": "0", "score": "FAIL"}
        ]
    }))
}

#[test]
fn pass_count_special_rule() {
    let formula = pass_count_formula();
    let one = submission(json!({"gender": "female", "records": [
        {"event": "윗몸일으키기", "value": "45"},
        {"event": "턱걸이", "value": "3"}
    ]}));
    assert_eq!(calculate_practical_score(&formula, Some(&one)).score, 300.0);

    let none = submission(json!({"gender": "female", "records": [
        {"event": "윗몸일으키기", "value": "12"},
        {"event": "턱걸이", "value": "3"}
    ]}));
    assert_eq!(calculate_practical_score(&formula, Some(&none)).score, 200.0);
}

#[test]
fn legacy_submission_is_upgraded_before_scoring() {
    let formula = pass_count_formula();
    let legacy = submission(json!([
        {"종목명": "윗몸일으키기", "기록": 41, "성별": "여"},
        {"종목명": "턱걸이", "기록": 11, "성별": "여"}
    ]));
    let r = calculate_practical_score(&formula, Some(&legacy));
    assert_eq!(r.score, 400.0);
    assert!(r.log.mentions("upgraded legacy submission"));
}

#[test]
fn top_two_of_four_plus_history() {
    let formula: FormulaData =
        serde_json::from_value(json!({"institution_id": "U101", "total_score": 1000})).unwrap();
    let scores: StudentScores = serde_json::from_value(json!([
        {"subject": "국어", "grade": 1},
        {"subject": "수학", "grade": "2"},
        {"subject": "영어", "grade": 3},
        {"subject": "한국사", "grade": 2},
        {"subject": "탐구", "name": "생활과윤리", "grade": 4},
        {"subject": "탐구", "name": "사회문화", "grade": 5}
    ]))
    .unwrap();
    let r = calculate_score(&formula, &scores, None).unwrap();
    assert_eq!(r.breakdown["top_k"], Some(193.0));
    assert_eq!(r.breakdown["history"], Some(10.0));
    assert_eq!(r.score, 203.0);
}

fn gendered_jump_table() -> PracticalFormulaData {
    practical(json!({
        "target_max": 100,
        "table": [
            {"event": "제자리멀리뛰기", "gender": "남", "record": "280", "score": 100},
            {"event": "제자리멀리뛰기", "gender": "남", "record": "260", "score": 90},
            {"event": "제자리멀리뛰기", "gender": "여", "record": "200", "score": 100},
            {"event": "제자리멀리뛰기", "gender": "여", "record": "180", "score": 90}
        ]
    }))
}

#[test]
fn unknown_gender_is_not_scored_against_either_table() {
    let formula = gendered_jump_table();
    let unknown = submission(json!({"gender": "??", "records": [
        {"event": "제자리멀리뛰기", "value": "210"}
    ]}));
    let r = calculate_practical_score(&formula, Some(&unknown));
    assert_eq!(r.score, 0.0);
    assert!(r.breakdown.is_empty());
    assert!(r.log.mentions("no recognizable gender"));

    let female = submission(json!({"gender": "여", "records": [
        {"event": "제자리멀리뛰기", "value": "210"}
    ]}));
    assert_eq!(calculate_practical_score(&formula, Some(&female)).score, 100.0);

    let male = submission(json!({"gender": "남", "records": [
        {"event": "제자리멀리뛰기", "value": "210"}
    ]}));
    let r = calculate_practical_score(&formula, Some(&male));
    assert_eq!(r.breakdown["제자리멀리뛰기"], Some(0.0));
    assert_eq!(r.score, 0.0);
}

#[test]
fn np_and_unparseable_grades_score_zero() {
    let mut formula = practical(json!({
        "table": [
            {"event": "윗몸일으키기", "gender": "common", "record": "40", "score": "PASS"},
            {"event": "윗몸일으키기", "gender": "common", "record": "20", "score": "B"},
            {"event": "윗몸일으키기", "gender": "common", "record": "0", "score": "NP"}
        ]
    }));
    formula.directions.insert("윗몸일으키기".into(), pe_core::Direction::HigherIsBetter);
    let score_for = |value: &str| {
        let sub = submission(json!({"gender": "male", "records": [
            {"event": "윗몸일으키기", "value": value}
        ]}));
        calculate_practical_score(&formula, Some(&sub))
    };

    let pass = score_for("45");
    assert_eq!(pass.breakdown["윗몸일으키기"], Some(100.0));
    assert_eq!(pass.breakdown["윗몸일으키기.tier"], Some(0.0));

    let np = score_for("12");
    assert_eq!(np.breakdown["윗몸일으키기"], Some(0.0));
    assert_eq!(np.breakdown["윗몸일으키기.tier"], Some(1.0));
    assert_eq!(np.score, 0.0);

    let unparseable = score_for("25");
    assert_eq!(unparseable.breakdown["윗몸일으키기"], Some(0.0));
}
