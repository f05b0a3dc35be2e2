//! Exam Score Orchestrator.
//!
//! Per call, exactly one path runs:
//! 1. institution registry hit → bespoke algorithm
//! 2. special formula configured → context + sandboxed evaluation
//! 3. generic composite: normalize → selection rules → exam ratio → history
//!    and English adjustments

use std::collections::BTreeMap;

use pe_algo::{compose, evaluate_special_formula, normalize::grade_table_score, resolve_subjects};
use pe_core::{
    Breakdown, CalcLog, CalculationResult, FormulaData, HighestScoreMap, StudentScores, Subject,
};

use crate::context::build_context;
use crate::institutions::{builtin_registry, ExamRegistry};
use crate::PipelineError;

/// Compute the exam score with the built-in institution registry.
pub fn calculate_score(
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
) -> Result<CalculationResult, PipelineError> {
    calculate_score_with(builtin_registry(), formula, scores, highest)
}

/// Compute the exam score against a caller-supplied institution registry.
pub fn calculate_score_with(
    registry: &ExamRegistry,
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
) -> Result<CalculationResult, PipelineError> {
    let mut log = CalcLog::new();

    if let Some(id) = formula.institution_id.as_deref() {
        if let Some(algorithm) = registry.get(id) {
            log.push(format!("institution {id}: bespoke algorithm"));
            tracing::debug!(institution = id, "exam: bespoke institution algorithm");
            let out = algorithm.score(formula, scores, &mut log);
            log.push(format!("final score = {:.2}", out.score));
            return Ok(CalculationResult::new(out.score, out.breakdown, log));
        }
        log.push(format!("institution {id}: no bespoke algorithm, continuing"));
    }

    if let Some(expr) = formula.special_formula() {
        log.push("special formula path");
        let ctx = build_context(formula, scores, highest, &mut log);
        let score = evaluate_special_formula(expr, &ctx, &mut log)?;
        let mut breakdown = Breakdown::new();
        breakdown.insert("special_formula".into(), Some(score));
        log.push(format!("final score = {score:.2}"));
        return Ok(CalculationResult::new(score, breakdown, log));
    }

    let (score, breakdown) = generic_composite(formula, scores, highest, &mut log);
    log.push(format!("final score = {score:.2}"));
    Ok(CalculationResult::new(score, breakdown, log))
}

/// Ratio/selection path. Infallible: every anomaly is logged and absorbed.
pub fn generic_composite(
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
    log: &mut CalcLog,
) -> (f64, Breakdown) {
    let mut breakdown = Breakdown::new();
    let values = resolve_subjects(formula, scores, highest, log);
    for v in values.values() {
        breakdown.insert(format!("{}_norm", v.subject), v.picked.map(|_| v.normalized));
    }

    let norms: BTreeMap<Subject, f64> = values.iter().map(|(s, v)| (*s, v.normalized)).collect();
    let composite = compose(
        &norms,
        &formula.ratios,
        &formula.selection_rules,
        formula.total_score,
        log,
    );
    for o in &composite.rules {
        breakdown.insert(format!("rule_{}", o.rule_index), Some(o.contribution));
    }
    breakdown.insert("base_pool".into(), Some(composite.base_contribution));

    let mut raw_total = composite.raw_total;

    // History outside the pool: pre-ratio when prioritized, else a post-ratio bonus.
    let mut history_bonus = 0.0;
    if formula.ratios.history <= 0.0 {
        let hist = grade_table_score(&formula.history_scores, scores.grade_of(Subject::History));
        if let Some(h) = hist {
            if formula.history_priority {
                raw_total += h;
                log.push(format!(
                    "history priority: +{h} before exam ratio, raw total = {raw_total:.4}"
                ));
                log.push("history priority: post-ratio history bonus set to 0");
                breakdown.insert("history_pre_ratio".into(), Some(h));
            } else {
                history_bonus = h;
            }
        }
    }
    breakdown.insert("raw_total".into(), Some(raw_total));

    let exam = raw_total * formula.exam_ratio / 100.0;
    log.push(format!("exam = {raw_total:.4} x {}% = {exam:.4}", formula.exam_ratio));
    breakdown.insert("exam".into(), Some(exam));

    if history_bonus != 0.0 {
        log.push(format!("history bonus +{history_bonus}"));
    }
    breakdown.insert("history_bonus".into(), Some(history_bonus));

    // English outside the pool only; a pooled English grade already counts via its ratio.
    let mut english_bonus = 0.0;
    let english_grade = scores.grade_of(Subject::English).filter(|_| formula.ratios.english <= 0.0);
    if let Some(g) = english_grade {
        let table = formula.english_bonus.get(&g).copied().unwrap_or(0.0);
        let fixed = formula.english_fixed_bonus.unwrap_or(0.0);
        english_bonus = table + fixed;
        if english_bonus != 0.0 {
            log.push(format!("english grade {g}: bonus {table} + fixed {fixed} = {english_bonus}"));
        }
    }
    breakdown.insert("english_bonus".into(), Some(english_bonus));

    let total = exam + history_bonus + english_bonus;
    breakdown.insert("total".into(), Some(total));
    (total, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pe_algo::FormulaError;
    use pe_core::{MaxMethod, ScoreType, ScoreTypeRule, SelectionRule, SubjectRatios, SubjectScore};

    fn scores() -> StudentScores {
        StudentScores::new(vec![
            SubjectScore::new(Subject::Language).with_standard(120.0).with_percentile(90.0),
            SubjectScore::new(Subject::Math).with_standard(100.0).with_percentile(70.0),
            SubjectScore::new(Subject::English).with_grade(2),
            SubjectScore::new(Subject::History).with_grade(3),
            SubjectScore::new(Subject::Elective).named("지구과학1").with_percentile(80.0),
            SubjectScore::new(Subject::Elective).named("사회문화").with_percentile(60.0),
        ])
    }

    fn pct_formula() -> FormulaData {
        let mut f = FormulaData::default();
        f.total_score = 100.0;
        f.ratios = SubjectRatios {
            language: 50.0,
            math: 0.0,
            english: 0.0,
            elective: 50.0,
            history: 0.0,
        };
        let pct = ScoreTypeRule::new(ScoreType::Percentile, MaxMethod::Fixed);
        f.score_types.language = pct.clone();
        f.score_types.elective = pct;
        f.history_scores = [(1, 10.0), (2, 10.0), (3, 9.0)].into_iter().collect();
        f.english_bonus = [(1, 0.0), (2, -1.0)].into_iter().collect();
        f
    }

    #[test]
    fn generic_path_adds_history_and_english_after_ratio() {
        let f = pct_formula();
        let r = calculate_score(&f, &scores(), None).unwrap();
        // pool: (0.9 + 0.7) / 2 x 100 = 80; + history 9; english -1
        assert_eq!(r.score, 88.0);
        assert_eq!(r.breakdown["history_bonus"], Some(9.0));
        assert_eq!(r.breakdown["english_bonus"], Some(-1.0));
        assert_eq!(r.score_text, "88.00");
    }

    #[test]
    fn history_priority_folds_into_raw_total() {
        let mut f = pct_formula();
        f.history_priority = true;
        f.exam_ratio = 50.0;
        let r = calculate_score(&f, &scores(), None).unwrap();
        // (80 + 9) x 0.5 - 1
        assert_eq!(r.score, 43.5);
        assert_eq!(r.breakdown["history_bonus"], Some(0.0));
        assert!(r.log.mentions("post-ratio history bonus set to 0"));
    }

    #[test]
    fn history_priority_with_selection_rule() {
        let mut f = pct_formula();
        f.history_priority = true;
        f.exam_ratio = 50.0;
        f.selection_rules = vec![SelectionRule::SelectN {
            from: vec![Subject::Language, Subject::Elective],
            count: 1,
            ratio: Some(60.0),
        }];
        let r = calculate_score(&f, &scores(), None).unwrap();
        // rule: 0.9 x 60; base pool: elective 0.7 x 40; (54 + 28 + 9) x 0.5 - 1
        assert_eq!(r.score, 44.5);
        assert_eq!(r.breakdown["history_pre_ratio"], Some(9.0));
        assert_eq!(r.breakdown["history_bonus"], Some(0.0));
        assert!(r.log.mentions("select_n"));
        assert!(r.log.mentions("post-ratio history bonus set to 0"));
    }

    #[test]
    fn english_fixed_bonus_only_outside_the_pool() {
        let mut f = pct_formula();
        f.english_fixed_bonus = Some(5.0);
        let outside = calculate_score(&f, &scores(), None).unwrap();
        assert_eq!(outside.breakdown["english_bonus"], Some(4.0));
        assert_eq!(outside.score, 93.0);

        f.ratios.english = 20.0;
        f.english_scores = [(1, 100.0), (2, 95.0)].into_iter().collect();
        let pooled = calculate_score(&f, &scores(), None).unwrap();
        assert_eq!(pooled.breakdown["english_bonus"], Some(0.0));
        assert!(!pooled.log.mentions("fixed 5"));
    }

    #[test]
    fn special_formula_path() {
        let mut f = pct_formula();
        f.special_formula = Some("{kor_pct} * 2 + {hist_score}".into());
        let r = calculate_score(&f, &scores(), None).unwrap();
        assert_eq!(r.score, 189.0);
        assert_eq!(r.breakdown["special_formula"], Some(189.0));
    }

    #[test]
    fn rejected_formula_is_fatal() {
        let mut f = pct_formula();
        f.special_formula = Some("{kor_pct} + DROP".into());
        let err = calculate_score(&f, &scores(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Formula(FormulaError::RejectedToken { .. })));
    }

    #[test]
    fn unknown_institution_falls_through() {
        let mut f = pct_formula();
        f.institution_id = Some("nowhere".into());
        let r = calculate_score(&f, &scores(), None).unwrap();
        assert_eq!(r.score, 88.0);
        assert!(r.log.mentions("no bespoke algorithm"));
    }
}
