//! Score Normalizer: picks the configured raw value per subject, resolves the
//! subject's maximum, and maps it into [0, 1].
//!
//! - `pick_by_type`: standard for `standard`/`converted`, percentile otherwise
//! - `resolve_max`: fixed constant, cohort-year highest, or elective table maximum
//! - `elective_representative`: top-N average over the attempted electives
//! - `resolve_subjects`: one `SubjectValue` per subject for the composite

use std::collections::BTreeMap;

use pe_core::{
    BonusRule, BonusTarget, CalcLog, ConversionTables, ElectiveGroup, FormulaData, GradeTable,
    HighestScoreMap, MaxMethod, ScoreType, ScoreTypeRule, StudentScores, Subject, SubjectScore,
};

use crate::interpolate::{percentile_to_converted, table_max};

/// Default maximum for `fixed` when no constant is configured.
pub const DEFAULT_FIXED_MAX: f64 = 200.0;
/// Maximum of any percentile-typed subject.
pub const PERCENTILE_MAX: f64 = 100.0;

/// Resolved view of one subject.
#[derive(Clone, Debug, PartialEq)]
pub struct SubjectValue {
    pub subject: Subject,
    /// Configured raw value after bonus rules; `None` when the student has no usable value.
    pub picked: Option<f64>,
    /// Resolved maximum; `None` when it could not be resolved.
    pub max: Option<f64>,
    /// `picked / max` clamped to [0, 1]; 0 when either side is missing.
    pub normalized: f64,
}

impl SubjectValue {
    fn absent(subject: Subject) -> Self {
        Self {
            subject,
            picked: None,
            max: None,
            normalized: 0.0,
        }
    }
}

pub type SubjectValues = BTreeMap<Subject, SubjectValue>;

// ----------------------------- Primitives ----------------------------------------------

/// `min(1, max(0, raw / max))`; a non-positive or non-finite max yields 0.
pub fn normalize(raw: f64, max: f64) -> f64 {
    if !(max.is_finite() && max > 0.0) || !raw.is_finite() {
        return 0.0;
    }
    (raw / max).clamp(0.0, 1.0)
}

/// Raw value of an entry for the configured score type.
pub fn pick_by_type(entry: &SubjectScore, ty: ScoreType) -> Option<f64> {
    match ty {
        ScoreType::Standard | ScoreType::ConvertedStandard => entry.standard,
        ScoreType::Percentile => entry.percentile,
    }
}

/// Elective value under the configured type. For converted scores the entry's
/// own converted value wins, then the group conversion table applied to the
/// percentile, then the standard score.
pub fn elective_value(
    entry: &SubjectScore,
    ty: ScoreType,
    tables: &ConversionTables,
) -> Option<f64> {
    match ty {
        ScoreType::ConvertedStandard => entry
            .converted
            .or_else(|| {
                let table = tables.get(&entry.elective_group())?;
                percentile_to_converted(entry.percentile?, table)
            })
            .or(entry.standard),
        other => pick_by_type(entry, other),
    }
}

/// Multiplier from every bonus rule of `target` that matches the entry's name.
pub fn bonus_multiplier(entry: &SubjectScore, target: BonusTarget, rules: &[BonusRule]) -> f64 {
    let pct: f64 = rules
        .iter()
        .filter(|r| r.target == target && r.matches(entry.name.as_deref()))
        .map(|r| r.percent)
        .sum();
    1.0 + pct / 100.0
}

/// Points for a grade in a grade table.
pub fn grade_table_score(table: &GradeTable, grade: Option<u8>) -> Option<f64> {
    table.get(&grade?).copied()
}

/// Largest value in a grade table.
pub fn grade_table_max(table: &GradeTable) -> Option<f64> {
    table.values().copied().reduce(f64::max)
}

fn highest_lookup(highest: Option<&HighestScoreMap>, keys: &[&str]) -> Option<f64> {
    let map = highest?;
    keys.iter().find_map(|k| map.get(*k).copied()).filter(|v| *v > 0.0)
}

fn group_keys(group: ElectiveGroup) -> [&'static str; 2] {
    match group {
        ElectiveGroup::Science => ["과탐", "science"],
        ElectiveGroup::Social => ["사탐", "social"],
    }
}

/// Maximum attainable score for one entry under its subject's rule.
pub fn resolve_max(
    subject: Subject,
    entry: Option<&SubjectScore>,
    rule: &ScoreTypeRule,
    highest: Option<&HighestScoreMap>,
    tables: &ConversionTables,
) -> Option<f64> {
    if rule.score_type == ScoreType::Percentile {
        return Some(match rule.max {
            MaxMethod::Fixed => rule.fixed_max.unwrap_or(PERCENTILE_MAX),
            MaxMethod::CohortHighest | MaxMethod::ElectiveTable => PERCENTILE_MAX,
        });
    }
    match rule.max {
        MaxMethod::Fixed => Some(rule.fixed_max.unwrap_or(DEFAULT_FIXED_MAX)),
        MaxMethod::CohortHighest => {
            let name = entry.and_then(|e| e.name.as_deref()).unwrap_or_default();
            let mut keys: Vec<&str> = vec![name];
            if subject == Subject::Elective {
                let g = entry.map(SubjectScore::elective_group).unwrap_or(ElectiveGroup::Social);
                keys.extend(group_keys(g));
            }
            keys.extend([subject.korean_name(), subject.as_str()]);
            keys.retain(|k| !k.is_empty());
            highest_lookup(highest, &keys)
        }
        MaxMethod::ElectiveTable => {
            let g = entry.map(SubjectScore::elective_group).unwrap_or(ElectiveGroup::Social);
            tables.get(&g).and_then(|t| table_max(t))
        }
    }
}

fn mean(xs: &[f64]) -> Option<f64> {
    (!xs.is_empty()).then(|| xs.iter().sum::<f64>() / xs.len() as f64)
}

fn note_unresolved(subject: Subject, log: &mut CalcLog) {
    tracing::warn!(
        subject = subject.as_str(),
        "maximum score unresolvable; subject does not contribute"
    );
    log.push(format!(
        "{subject}: maximum unresolvable, treated as non-contributing (normalized 0)"
    ));
}

// ----------------------------- Representatives -----------------------------------------

fn single_subject(
    subject: Subject,
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
    log: &mut CalcLog,
) -> SubjectValue {
    let Some(entry) = scores.first(subject) else {
        log.push(format!("{subject}: no score entry"));
        return SubjectValue::absent(subject);
    };
    let rule = formula.score_types.for_subject(subject);
    let Some(raw) = pick_by_type(entry, rule.score_type) else {
        log.push(format!("{subject}: no {} value", rule.score_type.as_str()));
        return SubjectValue::absent(subject);
    };
    let mult = match subject {
        Subject::Math => bonus_multiplier(entry, BonusTarget::Math, &formula.bonus_rules),
        _ => 1.0,
    };
    let picked = raw * mult;
    if mult != 1.0 {
        log.push(format!("{subject}: bonus x{mult:.4} on {raw} = {picked:.4}"));
    }
    let max = resolve_max(subject, Some(entry), &rule, highest, &formula.elective_conversion);
    let normalized = match max {
        Some(m) => {
            let n = normalize(picked, m);
            log.push(format!("{subject}: {picked:.4} / {m} = {n:.4}"));
            n
        }
        None => {
            note_unresolved(subject, log);
            0.0
        }
    };
    SubjectValue {
        subject,
        picked: Some(picked),
        max,
        normalized,
    }
}

fn table_subject(
    subject: Subject,
    table: &GradeTable,
    scores: &StudentScores,
    log: &mut CalcLog,
) -> SubjectValue {
    let grade = scores.grade_of(subject);
    let Some(points) = grade_table_score(table, grade) else {
        log.push(format!("{subject}: no table score for grade {grade:?}"));
        return SubjectValue::absent(subject);
    };
    let max = grade_table_max(table);
    let normalized = max.map(|m| normalize(points, m)).unwrap_or(0.0);
    log.push(format!(
        "{subject}: grade {} → {points} / {} = {normalized:.4}",
        grade.unwrap_or_default(),
        max.unwrap_or_default()
    ));
    SubjectValue {
        subject,
        picked: Some(points),
        max,
        normalized,
    }
}

/// Representative elective: the top `elective_count` (minimum 1) electives by
/// configured value, averaged.
///
/// Under `converted` + `highest`, each selected elective is normalized against
/// its own maximum and the normalized values are averaged; electives without a
/// resolvable maximum are left out of that average.
pub fn elective_representative(
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
    log: &mut CalcLog,
) -> SubjectValue {
    let rule = &formula.score_types.elective;
    let tables = &formula.elective_conversion;

    let mut valued: Vec<(&SubjectScore, f64)> = Vec::new();
    for e in scores.electives() {
        match elective_value(e, rule.score_type, tables) {
            Some(v) => {
                let mult = bonus_multiplier(e, BonusTarget::Elective, &formula.bonus_rules);
                if mult != 1.0 {
                    log.push(format!("{}: bonus x{mult:.4} on {v}", e.label()));
                }
                valued.push((e, v * mult));
            }
            None => log.push(format!(
                "{}: no {} value, skipped",
                e.label(),
                rule.score_type.as_str()
            )),
        }
    }
    if valued.is_empty() {
        log.push("elective: no usable elective scores");
        return SubjectValue::absent(Subject::Elective);
    }

    valued.sort_by(|a, b| b.1.total_cmp(&a.1));
    let n = usize::from(formula.elective_count.max(1));
    valued.truncate(n);
    let values: Vec<f64> = valued.iter().map(|(_, v)| *v).collect();
    let picked = mean(&values);
    let labels: Vec<String> = valued.iter().map(|(e, _)| e.label()).collect();
    log.push(format!(
        "elective: top {} of attempted [{}] avg = {:.4}",
        valued.len(),
        labels.join(", "),
        picked.unwrap_or_default()
    ));

    let maxima: Vec<(f64, Option<f64>)> = valued
        .iter()
        .map(|(e, v)| (*v, resolve_max(Subject::Elective, Some(*e), rule, highest, tables)))
        .collect();
    let resolved: Vec<f64> = maxima.iter().filter_map(|(_, m)| *m).collect();

    let per_subject =
        rule.score_type == ScoreType::ConvertedStandard && rule.max == MaxMethod::CohortHighest;
    let normalized = if per_subject {
        let norms: Vec<f64> = maxima
            .iter()
            .filter_map(|(v, m)| m.map(|m| normalize(*v, m)))
            .collect();
        if norms.len() < maxima.len() {
            log.push(format!(
                "elective: {} of {} electives lack a cohort maximum and are excluded",
                maxima.len() - norms.len(),
                maxima.len()
            ));
        }
        match mean(&norms) {
            Some(n) => {
                log.push(format!("elective: per-subject normalized avg = {n:.4}"));
                n
            }
            None => {
                note_unresolved(Subject::Elective, log);
                0.0
            }
        }
    } else {
        match (picked, mean(&resolved)) {
            (Some(p), Some(m)) => {
                let n = normalize(p, m);
                log.push(format!("elective: {p:.4} / {m} = {n:.4}"));
                n
            }
            _ => {
                note_unresolved(Subject::Elective, log);
                0.0
            }
        }
    };

    SubjectValue {
        subject: Subject::Elective,
        picked,
        max: mean(&resolved),
        normalized,
    }
}

/// Resolve every subject of the composite: representative value, maximum,
/// and normalized ratio.
pub fn resolve_subjects(
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
    log: &mut CalcLog,
) -> SubjectValues {
    let mut out = SubjectValues::new();
    for subject in Subject::ALL {
        let v = match subject {
            Subject::Language | Subject::Math => {
                single_subject(subject, formula, scores, highest, log)
            }
            Subject::Elective => elective_representative(formula, scores, highest, log),
            Subject::English => table_subject(subject, &formula.english_scores, scores, log),
            Subject::History => table_subject(subject, &formula.history_scores, scores, log),
        };
        out.insert(subject, v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pe_core::ConversionRow;

    #[test]
    fn normalize_bounds() {
        assert_eq!(normalize(50.0, 0.0), 0.0);
        assert_eq!(normalize(50.0, -3.0), 0.0);
        assert_eq!(normalize(250.0, 200.0), 1.0);
        assert_eq!(normalize(-5.0, 200.0), 0.0);
        assert_eq!(normalize(100.0, 200.0), 0.5);
    }

    #[test]
    fn pick_standard_for_converted_type() {
        let e = SubjectScore::new(Subject::Language).with_standard(131.0).with_percentile(96.0);
        assert_eq!(pick_by_type(&e, ScoreType::ConvertedStandard), Some(131.0));
        assert_eq!(pick_by_type(&e, ScoreType::Percentile), Some(96.0));
    }

    #[test]
    fn maxima_follow_method() {
        let tables = ConversionTables::new();
        let mut highest = HighestScoreMap::new();
        highest.insert("국어".into(), 147.0);
        let e = SubjectScore::new(Subject::Language).named("언어와매체");

        let rule = ScoreTypeRule::new(ScoreType::Standard, MaxMethod::CohortHighest);
        assert_eq!(
            resolve_max(Subject::Language, Some(&e), &rule, Some(&highest), &tables),
            Some(147.0)
        );
        assert_eq!(resolve_max(Subject::Language, Some(&e), &rule, None, &tables), None);

        let pct = ScoreTypeRule::new(ScoreType::Percentile, MaxMethod::CohortHighest);
        assert_eq!(resolve_max(Subject::Language, Some(&e), &pct, None, &tables), Some(100.0));

        let fixed = ScoreTypeRule::default();
        assert_eq!(resolve_max(Subject::Math, None, &fixed, None, &tables), Some(200.0));
    }

    #[test]
    fn elective_average_of_top_n_with_conversion() {
        let mut formula = FormulaData::default();
        formula.elective_count = 1;
        formula.score_types.elective =
            ScoreTypeRule::new(ScoreType::ConvertedStandard, MaxMethod::ElectiveTable);
        formula.elective_conversion.insert(
            ElectiveGroup::Social,
            vec![
                ConversionRow { percentile: 100.0, converted: 70.0 },
                ConversionRow { percentile: 50.0, converted: 50.0 },
            ],
        );
        let scores = StudentScores::new(vec![
            SubjectScore::new(Subject::Elective).named("생활과윤리").with_percentile(100.0),
            SubjectScore::new(Subject::Elective).named("한국지리").with_percentile(50.0),
        ]);
        let mut log = CalcLog::new();
        let v = elective_representative(&formula, &scores, None, &mut log);
        assert_eq!(v.picked, Some(70.0));
        assert_eq!(v.max, Some(70.0));
        assert_eq!(v.normalized, 1.0);
    }

    #[test]
    fn converted_highest_excludes_unresolvable_electives() {
        let mut formula = FormulaData::default();
        formula.score_types.elective =
            ScoreTypeRule::new(ScoreType::ConvertedStandard, MaxMethod::CohortHighest);
        let scores = StudentScores::new(vec![
            SubjectScore::new(Subject::Elective).named("물리학1").with_converted(60.0),
            SubjectScore::new(Subject::Elective).named("생활과윤리").with_converted(50.0),
        ]);
        let mut highest = HighestScoreMap::new();
        highest.insert("물리학1".into(), 80.0);
        let mut log = CalcLog::new();
        let v = elective_representative(&formula, &scores, Some(&highest), &mut log);
        assert_eq!(v.normalized, 0.75);
        assert!(log.mentions("excluded"));
    }

    #[test]
    fn math_bonus_applies_before_normalization() {
        let mut formula = FormulaData::default();
        formula.score_types.math =
            ScoreTypeRule::new(ScoreType::Standard, MaxMethod::Fixed).with_fixed_max(150.0);
        formula.bonus_rules.push(BonusRule {
            target: BonusTarget::Math,
            names: vec!["미적분".into()],
            group: None,
            percent: 10.0,
        });
        let scores = StudentScores::new(vec![SubjectScore::new(Subject::Math)
            .named("미적분")
            .with_standard(140.0)]);
        let mut log = CalcLog::new();
        let all = resolve_subjects(&formula, &scores, None, &mut log);
        let m = &all[&Subject::Math];
        assert!((m.picked.unwrap() - 154.0).abs() < 1e-9);
        assert_eq!(m.normalized, 1.0);
        assert_eq!(all[&Subject::Language].picked, None);
    }
}
