//! Special-Formula Context Builder.
//!
//! Derives the flat variable map consumed by `{name}` placeholders. Built only
//! from `FormulaData` + `StudentScores` (+ the optional highest-score map);
//! no side effects beyond the caller's log.
//!
//! Raw per-subject values are inserted only when the student has them, so an
//! absent value shows up as a logged zero substitution. Aggregates treat
//! absent values as 0.

use pe_algo::{
    normalize::{bonus_multiplier, elective_value, grade_table_max, grade_table_score, resolve_max},
    resolve_subjects, FormulaContext,
};
use pe_core::{
    BonusTarget, CalcLog, FormulaData, HighestScoreMap, ScoreType, StudentScores, Subject,
    SubjectScore,
};

/// Every name the builder can emit, in documentation order.
pub const CONTEXT_VARIABLES: &[&str] = &[
    "kor_std",
    "kor_pct",
    "kor_grade",
    "math_std",
    "math_pct",
    "math_grade",
    "eng_grade",
    "eng_score",
    "hist_grade",
    "hist_score",
    "inq1_std",
    "inq1_pct",
    "inq1_grade",
    "inq1_conv",
    "inq2_std",
    "inq2_pct",
    "inq2_grade",
    "inq2_conv",
    "inq_sum_std",
    "inq_sum_pct",
    "inq_avg_std",
    "inq_avg_pct",
    "inq_top1_std",
    "inq_top1_pct",
    "inq_conv_avg",
    "kor_max",
    "math_max",
    "inq_max",
    "eng_max",
    "kor_norm",
    "math_norm",
    "eng_norm",
    "inq_norm",
    "hist_norm",
    "top2_sum_pct",
    "top2_avg_pct",
    "top3_sum_pct",
    "top3_avg_pct",
    "top2_sum_std",
    "top3_sum_std",
    "top2_norm_avg",
    "top3_norm_avg",
    "kor_math_sum_std",
    "kor_math_sum_pct",
    "kor_math_inq_std",
    "kor_math_inq_pct",
    "top1_of_kor_math_std",
    "inq_boost",
    "inq_std_boosted",
    "inq_pct_boosted",
    "math_bonus_pct",
    "math_std_boosted",
    "math_pct_boosted",
    "hist_pass",
    "eng_pass",
    "total",
    "exam_ratio",
    "exam_total",
];

struct Ctx(FormulaContext);

impl Ctx {
    fn set(&mut self, name: &str, v: f64) {
        self.0.insert(name.to_string(), v);
    }

    fn set_opt(&mut self, name: &str, v: Option<f64>) {
        if let Some(v) = v {
            self.set(name, v);
        }
    }
}

fn sum_top(mut xs: Vec<f64>, n: usize) -> f64 {
    xs.sort_by(|a, b| b.total_cmp(a));
    xs.into_iter().take(n).sum()
}

/// Top `n` electives by `key`, best first.
fn top_electives<'a>(
    electives: &[&'a SubjectScore],
    n: usize,
    key: impl Fn(&SubjectScore) -> Option<f64>,
) -> Vec<(&'a SubjectScore, f64)> {
    let mut v: Vec<(&SubjectScore, f64)> =
        electives.iter().filter_map(|e| key(e).map(|x| (*e, x))).collect();
    v.sort_by(|a, b| b.1.total_cmp(&a.1));
    v.truncate(n);
    v
}

/// Build the named-variable context for special formulas.
pub fn build_context(
    formula: &FormulaData,
    scores: &StudentScores,
    highest: Option<&HighestScoreMap>,
    log: &mut CalcLog,
) -> FormulaContext {
    let mut c = Ctx(FormulaContext::new());
    let kor = scores.first(Subject::Language);
    let math = scores.first(Subject::Math);
    let electives = scores.electives();
    let n = usize::from(formula.elective_count.max(1));
    let tables = &formula.elective_conversion;

    // ----- raw per-subject values -----
    c.set_opt("kor_std", kor.and_then(|e| e.standard));
    c.set_opt("kor_pct", kor.and_then(|e| e.percentile));
    c.set_opt("kor_grade", kor.and_then(|e| e.grade).map(f64::from));
    c.set_opt("math_std", math.and_then(|e| e.standard));
    c.set_opt("math_pct", math.and_then(|e| e.percentile));
    c.set_opt("math_grade", math.and_then(|e| e.grade).map(f64::from));

    let eng_grade = scores.grade_of(Subject::English);
    let eng_score = grade_table_score(&formula.english_scores, eng_grade);
    c.set_opt("eng_grade", eng_grade.map(f64::from));
    c.set_opt("eng_score", eng_score);
    let hist_grade = scores.grade_of(Subject::History);
    let hist_score = grade_table_score(&formula.history_scores, hist_grade);
    c.set_opt("hist_grade", hist_grade.map(f64::from));
    c.set_opt("hist_score", hist_score);

    for (i, e) in electives.iter().take(2).enumerate() {
        let p = format!("inq{}", i + 1);
        c.set_opt(&format!("{p}_std"), e.standard);
        c.set_opt(&format!("{p}_pct"), e.percentile);
        c.set_opt(&format!("{p}_grade"), e.grade.map(f64::from));
        c.set_opt(&format!("{p}_conv"), elective_value(e, ScoreType::ConvertedStandard, tables));
    }

    // ----- elective aggregates -----
    let by_std = top_electives(&electives, n, |e| e.standard);
    let by_pct = top_electives(&electives, n, |e| e.percentile);
    let by_conv = top_electives(&electives, n, |e| {
        elective_value(e, ScoreType::ConvertedStandard, tables)
    });
    let inq_sum_std: f64 = by_std.iter().map(|(_, v)| v).sum();
    let inq_sum_pct: f64 = by_pct.iter().map(|(_, v)| v).sum();
    let avg = |sum: f64, k: usize| if k == 0 { 0.0 } else { sum / k as f64 };
    let inq_avg_std = avg(inq_sum_std, by_std.len());
    let inq_avg_pct = avg(inq_sum_pct, by_pct.len());
    c.set("inq_sum_std", inq_sum_std);
    c.set("inq_sum_pct", inq_sum_pct);
    c.set("inq_avg_std", inq_avg_std);
    c.set("inq_avg_pct", inq_avg_pct);
    c.set("inq_top1_std", by_std.first().map(|(_, v)| *v).unwrap_or(0.0));
    c.set("inq_top1_pct", by_pct.first().map(|(_, v)| *v).unwrap_or(0.0));
    c.set(
        "inq_conv_avg",
        avg(by_conv.iter().map(|(_, v)| v).sum(), by_conv.len()),
    );

    // ----- maxima and normalized values -----
    let values = resolve_subjects(formula, scores, highest, log);
    let max_of = |s: Subject, entry: Option<&SubjectScore>| {
        resolve_max(s, entry, &formula.score_types.for_subject(s), highest, tables).unwrap_or(0.0)
    };
    c.set("kor_max", max_of(Subject::Language, kor));
    c.set("math_max", max_of(Subject::Math, math));
    c.set("inq_max", values[&Subject::Elective].max.unwrap_or(0.0));
    c.set("eng_max", grade_table_max(&formula.english_scores).unwrap_or(0.0));
    let norm = |s: Subject| values[&s].normalized;
    c.set("kor_norm", norm(Subject::Language));
    c.set("math_norm", norm(Subject::Math));
    c.set("eng_norm", norm(Subject::English));
    c.set("inq_norm", norm(Subject::Elective));
    c.set("hist_norm", norm(Subject::History));

    // ----- top-N combinations over {language, math, english, elective} -----
    let kor_std = kor.and_then(|e| e.standard).unwrap_or(0.0);
    let kor_pct = kor.and_then(|e| e.percentile).unwrap_or(0.0);
    let math_std = math.and_then(|e| e.standard).unwrap_or(0.0);
    let math_pct = math.and_then(|e| e.percentile).unwrap_or(0.0);
    let eng = eng_score.unwrap_or(0.0);

    let pct4 = vec![kor_pct, math_pct, eng, inq_avg_pct];
    let std4 = vec![kor_std, math_std, eng, inq_avg_std];
    let norm4 = vec![
        norm(Subject::Language),
        norm(Subject::Math),
        norm(Subject::English),
        norm(Subject::Elective),
    ];
    let top2_pct = sum_top(pct4.clone(), 2);
    let top3_pct = sum_top(pct4, 3);
    c.set("top2_sum_pct", top2_pct);
    c.set("top2_avg_pct", top2_pct / 2.0);
    c.set("top3_sum_pct", top3_pct);
    c.set("top3_avg_pct", top3_pct / 3.0);
    c.set("top2_sum_std", sum_top(std4.clone(), 2));
    c.set("top3_sum_std", sum_top(std4, 3));
    c.set("top2_norm_avg", sum_top(norm4.clone(), 2) / 2.0);
    c.set("top3_norm_avg", sum_top(norm4, 3) / 3.0);
    c.set("kor_math_sum_std", kor_std + math_std);
    c.set("kor_math_sum_pct", kor_pct + math_pct);
    c.set("kor_math_inq_std", kor_std + math_std + inq_sum_std);
    c.set("kor_math_inq_pct", kor_pct + math_pct + inq_sum_pct);
    c.set("top1_of_kor_math_std", kor_std.max(math_std));

    // ----- boosts -----
    let rules = &formula.bonus_rules;
    let mults: Vec<f64> = by_std
        .iter()
        .map(|(e, _)| bonus_multiplier(e, BonusTarget::Elective, rules))
        .collect();
    c.set("inq_boost", if mults.is_empty() { 1.0 } else { avg(mults.iter().sum(), mults.len()) });
    c.set(
        "inq_std_boosted",
        by_std.iter().map(|(e, v)| v * bonus_multiplier(e, BonusTarget::Elective, rules)).sum(),
    );
    c.set(
        "inq_pct_boosted",
        by_pct.iter().map(|(e, v)| v * bonus_multiplier(e, BonusTarget::Elective, rules)).sum(),
    );
    let math_mult = math.map(|e| bonus_multiplier(e, BonusTarget::Math, rules)).unwrap_or(1.0);
    c.set("math_bonus_pct", (math_mult - 1.0) * 100.0);
    c.set("math_std_boosted", math_std * math_mult);
    c.set("math_pct_boosted", math_pct * math_mult);

    // ----- indicators and configuration echoes -----
    let pass = |v: Option<f64>| if v.is_some_and(|x| x > 0.0) { 1.0 } else { 0.0 };
    c.set("hist_pass", pass(hist_score));
    c.set("eng_pass", pass(eng_score));
    c.set("total", formula.total_score);
    c.set("exam_ratio", formula.exam_ratio);
    c.set("exam_total", formula.exam_total());

    log.push(format!("formula context: {} variables", c.0.len()));
    c.0
}
