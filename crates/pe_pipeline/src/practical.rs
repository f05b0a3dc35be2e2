//! Practical Test Engine entry point.
//!
//! adapt submission → per-event lookup → basic rescale or special-rule dispatch.

use std::collections::BTreeMap;

use pe_algo::{lookup_event, practical::event_max, EventScore};
use pe_core::{
    Breakdown, CalcLog, CalculationResult, PracticalFormulaData, PracticalMode, PracticalSubmission,
};

use crate::legacy::adapt_submission;
use crate::special_rules::{builtin_practical_registry, PracticalRegistry, RuleInput};

/// Score a practical submission with the built-in special-rule registry.
pub fn calculate_practical_score(
    formula: &PracticalFormulaData,
    submission: Option<&PracticalSubmission>,
) -> CalculationResult {
    calculate_practical_score_with(builtin_practical_registry(), formula, submission)
}

pub fn calculate_practical_score_with(
    registry: &PracticalRegistry,
    formula: &PracticalFormulaData,
    submission: Option<&PracticalSubmission>,
) -> CalculationResult {
    let mut log = CalcLog::new();
    let Some(student) = adapt_submission(submission, &mut log) else {
        return CalculationResult::empty(log);
    };
    let gender = student.gender;
    log.push(format!("practical: gender {gender}, mode {}", formula.mode.as_str()));

    let mut breakdown = Breakdown::new();
    let mut events: Vec<EventScore> = Vec::new();
    let mut maxima: BTreeMap<String, f64> = BTreeMap::new();
    for event in formula.events() {
        let value = student.record(&event).and_then(|r| r.value.as_deref());
        let scored = lookup_event(formula, &event, gender, value, &mut log);
        breakdown.insert(event.clone(), scored.points);
        breakdown.insert(format!("{event}.tier"), scored.tier.map(f64::from));
        if let Some(m) = event_max(formula, &event, gender) {
            maxima.insert(event.clone(), m);
        }
        events.push(scored);
    }
    for r in &student.records {
        if !events.iter().any(|e| e.event == r.event) {
            log.push(format!("{}: not in this table, ignored", r.event));
        }
    }

    let total = match formula.mode {
        PracticalMode::Basic => basic_total(formula, &events, &maxima, &mut log),
        PracticalMode::Special => {
            let input = RuleInput {
                events: &events,
                maxima: &maxima,
                formula,
            };
            special_total(registry, formula.institution_id.as_deref(), &input, &mut log)
        }
    };
    breakdown.insert("total".into(), Some(total));
    log.push(format!("final practical score = {total:.2}"));
    CalculationResult::new(total, breakdown, log)
}

/// (Σ event points + base) × target / Σ table maxima.
fn basic_total(
    formula: &PracticalFormulaData,
    events: &[EventScore],
    maxima: &BTreeMap<String, f64>,
    log: &mut CalcLog,
) -> f64 {
    let sum: f64 = events.iter().map(EventScore::points_or_zero).sum();
    let raw = sum + formula.base_score;
    log.push(format!("sum {sum} + base {} = {raw}", formula.base_score));

    if formula.target_max <= 0.0 {
        log.push("no target maximum, not rescaled");
        return raw;
    }
    let denom: f64 = maxima.values().sum();
    if denom <= 0.0 {
        log.push("error: table maxima sum to 0, returning the base score alone");
        tracing::error!(events = events.len(), "practical table has no positive maxima");
        return formula.base_score;
    }
    let total = raw * formula.target_max / denom;
    log.push(format!("{raw} x {} / {denom} = {total:.4}", formula.target_max));
    total
}

fn special_total(
    registry: &PracticalRegistry,
    id: Option<&str>,
    input: &RuleInput<'_>,
    log: &mut CalcLog,
) -> f64 {
    let Some(id) = id else {
        log.push("special mode without an institution ID, score 0");
        tracing::warn!("practical special mode without institution id");
        return 0.0;
    };
    match registry.get(id) {
        Some(rule) => {
            log.push(format!("institution {id}: special rule"));
            rule.total(input, log)
        }
        None => {
            log.push(format!("institution {id}: no special rule registered, score 0"));
            tracing::warn!(institution = id, "no practical special rule");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pe_core::{EventRecord, Gender, PracticalRow, StudentPracticalData};

    fn formula() -> PracticalFormulaData {
        PracticalFormulaData {
            target_max: 400.0,
            table: vec![
                PracticalRow::new("제자리멀리뛰기", Gender::Common, "280", 100.0),
                PracticalRow::new("제자리멀리뛰기", Gender::Common, "260", 90.0),
                PracticalRow::new("제자리멀리뛰기", Gender::Common, "240", 80.0),
                PracticalRow::new("메디신볼던지기", Gender::Common, "12", 100.0),
                PracticalRow::new("메디신볼던지기", Gender::Common, "10", 90.0),
                PracticalRow::new("메디신볼던지기", Gender::Common, "8", 80.0),
            ],
            ..PracticalFormulaData::default()
        }
    }

    fn submit(records: Vec<EventRecord>) -> PracticalSubmission {
        PracticalSubmission::Current(StudentPracticalData::new(Gender::Male, records))
    }

    #[test]
    fn basic_mode_rescales_to_target() {
        let sub = submit(vec![
            EventRecord::new("제자리멀리뛰기", "285"),
            EventRecord::new("메디신볼던지기", "10.4"),
        ]);
        let r = calculate_practical_score(&formula(), Some(&sub));
        assert_eq!(r.score, 380.0);
        assert_eq!(r.breakdown["메디신볼던지기"], Some(90.0));
        assert_eq!(r.breakdown["메디신볼던지기.tier"], Some(1.0));
    }

    #[test]
    fn missing_record_is_none_in_breakdown() {
        let sub = submit(vec![EventRecord::new("제자리멀리뛰기", "285")]);
        let r = calculate_practical_score(&formula(), Some(&sub));
        assert_eq!(r.breakdown["메디신볼던지기"], None);
        assert_eq!(r.score, 200.0);
    }

    #[test]
    fn absent_submission_is_empty() {
        let r = calculate_practical_score(&formula(), None);
        assert_eq!(r.score, 0.0);
        assert!(r.breakdown.is_empty());
        assert!(r.log.mentions("no student data"));
    }

    #[test]
    fn zero_denominator_returns_base() {
        let mut f = formula();
        f.base_score = 20.0;
        for row in &mut f.table {
            row.score = pe_core::ScoreCell::Points(0.0);
        }
        let sub = submit(vec![EventRecord::new("제자리멀리뛰기", "285")]);
        let r = calculate_practical_score(&f, Some(&sub));
        assert_eq!(r.score, 20.0);
        assert!(r.log.mentions("maxima sum to 0"));
    }

    #[test]
    fn special_mode_unknown_institution_scores_zero() {
        let mut f = formula();
        f.mode = PracticalMode::Special;
        f.institution_id = Some("Z999".into());
        let sub = submit(vec![EventRecord::new("제자리멀리뛰기", "285")]);
        let r = calculate_practical_score(&f, Some(&sub));
        assert_eq!(r.score, 0.0);
        assert!(r.log.mentions("no special rule registered"));
    }
}
