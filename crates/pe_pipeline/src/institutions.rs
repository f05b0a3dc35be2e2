//! Exam institution registry: institution ID → bespoke scoring algorithm.
//!
//! A registered institution bypasses the generic machinery entirely. The
//! built-in set is parameterized grade-table schemes; callers may register
//! further algorithms (any `Fn(&FormulaData, &StudentScores, &mut CalcLog) -> ExamOutcome`).

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use pe_core::{Breakdown, CalcLog, FormulaData, StudentScores, Subject};

/// Score and breakdown of a bespoke algorithm.
#[derive(Clone, Debug, PartialEq)]
pub struct ExamOutcome {
    pub score: f64,
    pub breakdown: Breakdown,
}

/// A fully bespoke exam scoring algorithm.
pub trait ExamAlgorithm: Send + Sync {
    fn score(
        &self,
        formula: &FormulaData,
        scores: &StudentScores,
        log: &mut CalcLog,
    ) -> ExamOutcome;
}

impl<F> ExamAlgorithm for F
where
    F: Fn(&FormulaData, &StudentScores, &mut CalcLog) -> ExamOutcome + Send + Sync,
{
    fn score(
        &self,
        formula: &FormulaData,
        scores: &StudentScores,
        log: &mut CalcLog,
    ) -> ExamOutcome {
        self(formula, scores, log)
    }
}

/// Institution ID → algorithm.
#[derive(Clone, Default)]
pub struct ExamRegistry {
    algorithms: BTreeMap<String, Arc<dyn ExamAlgorithm>>,
}

impl ExamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in institutions.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        r.register("U101", GradeTopK::top2_plus_history());
        r.register("U102", GradeTopK::top3_scaled());
        r.register("U103", PercentileWeighted::language_math_elective());
        r
    }

    pub fn register(&mut self, id: impl Into<String>, algorithm: impl ExamAlgorithm + 'static) {
        self.algorithms.insert(id.into(), Arc::new(algorithm));
    }

    pub fn get(&self, id: &str) -> Option<&dyn ExamAlgorithm> {
        self.algorithms.get(id.trim()).map(|a| a.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.algorithms.keys().map(String::as_str)
    }
}

impl core::fmt::Debug for ExamRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.algorithms.keys()).finish()
    }
}

/// Shared built-in registry.
pub fn builtin_registry() -> &'static ExamRegistry {
    static REGISTRY: OnceLock<ExamRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ExamRegistry::builtin)
}

// ----------------------------- Built-in schemes ----------------------------------------

/// Grade (1..=9) → points, index 0 is grade 1.
pub type GradePoints = [f64; 9];

fn points_for(table: &GradePoints, grade: Option<u8>) -> Option<f64> {
    let g = grade?;
    (1..=9).contains(&g).then(|| table[usize::from(g) - 1])
}

/// Top-K of {language, math, English, best elective} by grade points, plus a
/// history table score. Optionally rescaled so a perfect sum maps to the
/// exam share of the total.
#[derive(Clone, Debug, PartialEq)]
pub struct GradeTopK {
    pub subject_points: GradePoints,
    pub history_points: GradePoints,
    pub k: usize,
    pub rescale: bool,
}

impl GradeTopK {
    pub fn top2_plus_history() -> Self {
        Self {
            subject_points: [100.0, 93.0, 86.0, 79.0, 72.0, 65.0, 58.0, 51.0, 44.0],
            history_points: [10.0, 10.0, 10.0, 10.0, 9.0, 8.0, 7.0, 6.0, 5.0],
            k: 2,
            rescale: false,
        }
    }

    pub fn top3_scaled() -> Self {
        Self {
            subject_points: [200.0, 196.0, 190.0, 180.0, 165.0, 145.0, 120.0, 90.0, 50.0],
            history_points: [0.0, 0.0, 0.0, -1.0, -2.0, -3.0, -4.0, -5.0, -6.0],
            k: 3,
            rescale: true,
        }
    }
}

impl ExamAlgorithm for GradeTopK {
    fn score(
        &self,
        formula: &FormulaData,
        scores: &StudentScores,
        log: &mut CalcLog,
    ) -> ExamOutcome {
        let grades = [
            (Subject::Language, scores.grade_of(Subject::Language)),
            (Subject::Math, scores.grade_of(Subject::Math)),
            (Subject::English, scores.grade_of(Subject::English)),
            (Subject::Elective, scores.best_elective_grade()),
        ];
        let mut breakdown = Breakdown::new();
        let mut pts: Vec<(Subject, f64)> = Vec::new();
        for (s, g) in grades {
            let p = points_for(&self.subject_points, g);
            log.push(format!("{s}: grade {g:?} → {p:?}"));
            breakdown.insert(s.as_str().to_string(), p);
            if let Some(p) = p {
                pts.push((s, p));
            }
        }
        pts.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        pts.truncate(self.k);
        let top: f64 = pts.iter().map(|(_, p)| p).sum();
        let picked: Vec<&str> = pts.iter().map(|(s, _)| s.as_str()).collect();
        log.push(format!("top {} [{}] = {top}", self.k, picked.join(", ")));

        let mut total = top;
        if self.rescale {
            let perfect = self.subject_points[0] * self.k as f64;
            total = if perfect > 0.0 { top / perfect * formula.exam_total() } else { 0.0 };
            log.push(format!("rescaled {top} / {perfect} x {} = {total:.4}", formula.exam_total()));
        }

        let hist_grade = scores.grade_of(Subject::History);
        let hist = points_for(&self.history_points, hist_grade).unwrap_or(0.0);
        log.push(format!("history grade {hist_grade:?} → {hist}"));
        breakdown.insert("top_k".into(), Some(top));
        breakdown.insert("history".into(), Some(hist));
        total += hist;
        breakdown.insert("total".into(), Some(total));
        ExamOutcome { score: total, breakdown }
    }
}

/// Percentile-weighted language/math/best-elective composite with an English
/// grade deduction, scaled to the exam share of the total.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileWeighted {
    pub language: f64,
    pub math: f64,
    pub elective: f64,
    /// Deduction per English grade below 1.
    pub english_step: f64,
}

impl PercentileWeighted {
    pub fn language_math_elective() -> Self {
        Self {
            language: 0.35,
            math: 0.25,
            elective: 0.40,
            english_step: 2.0,
        }
    }
}

impl ExamAlgorithm for PercentileWeighted {
    fn score(
        &self,
        formula: &FormulaData,
        scores: &StudentScores,
        log: &mut CalcLog,
    ) -> ExamOutcome {
        let pct = |s: Subject| scores.first(s).and_then(|e| e.percentile);
        let best_elective = scores
            .all(Subject::Elective)
            .filter_map(|e| e.percentile)
            .reduce(f64::max);
        let parts = [
            ("language", pct(Subject::Language), self.language),
            ("math", pct(Subject::Math), self.math),
            ("elective", best_elective, self.elective),
        ];
        let mut breakdown = Breakdown::new();
        let mut weighted = 0.0;
        for (name, p, w) in parts {
            breakdown.insert(name.to_string(), p);
            weighted += p.unwrap_or(0.0) / 100.0 * w;
            log.push(format!("{name}: percentile {p:?} x {w}"));
        }
        let base = weighted * formula.exam_total();
        let eng_grade = scores.grade_of(Subject::English);
        let deduction = eng_grade
            .map(|g| f64::from(g.saturating_sub(1)) * self.english_step)
            .unwrap_or(0.0);
        log.push(format!(
            "weighted {weighted:.4} x {} = {base:.4}; english {eng_grade:?} deducts {deduction}",
            formula.exam_total()
        ));
        let total = (base - deduction).max(0.0);
        breakdown.insert("english_deduction".into(), Some(deduction));
        breakdown.insert("total".into(), Some(total));
        ExamOutcome { score: total, breakdown }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pe_core::SubjectScore;

    fn graded(lang: u8, math: u8, eng: u8, hist: u8, inq: &[u8]) -> StudentScores {
        let mut v = vec![
            SubjectScore::new(Subject::Language).with_grade(lang),
            SubjectScore::new(Subject::Math).with_grade(math),
            SubjectScore::new(Subject::English).with_grade(eng),
            SubjectScore::new(Subject::History).with_grade(hist),
        ];
        v.extend(inq.iter().map(|g| SubjectScore::new(Subject::Elective).with_grade(*g)));
        StudentScores::new(v)
    }

    #[test]
    fn builtin_ids_resolve() {
        let r = builtin_registry();
        assert!(r.get("U101").is_some());
        assert!(r.get(" U101 ").is_some());
        assert!(r.get("nope").is_none());
        assert_eq!(r.ids().count(), 3);
    }

    #[test]
    fn top3_scaled_maps_perfect_to_exam_share() {
        let mut f = FormulaData::default();
        f.total_score = 1000.0;
        f.exam_ratio = 60.0;
        let mut log = CalcLog::new();
        let out = GradeTopK::top3_scaled().score(&f, &graded(1, 1, 1, 1, &[1]), &mut log);
        assert!((out.score - 600.0).abs() < 1e-9);
    }

    #[test]
    fn registry_accepts_closures() {
        let mut r = ExamRegistry::new();
        r.register("flat", |_: &FormulaData, _: &StudentScores, log: &mut CalcLog| {
            log.push("flat");
            ExamOutcome {
                score: 42.0,
                breakdown: Breakdown::new(),
            }
        });
        let mut log = CalcLog::new();
        let out = r
            .get("flat")
            .unwrap()
            .score(&FormulaData::default(), &StudentScores::default(), &mut log);
        assert_eq!(out.score, 42.0);
    }

    #[test]
    fn percentile_weighted_deducts_english() {
        let mut f = FormulaData::default();
        f.total_score = 100.0;
        let scores = StudentScores::new(vec![
            SubjectScore::new(Subject::Language).with_percentile(100.0),
            SubjectScore::new(Subject::Math).with_percentile(100.0),
            SubjectScore::new(Subject::Elective).with_percentile(90.0),
            SubjectScore::new(Subject::Elective).with_percentile(100.0),
            SubjectScore::new(Subject::English).with_grade(3),
        ]);
        let mut log = CalcLog::new();
        let out = PercentileWeighted::language_math_elective().score(&f, &scores, &mut log);
        assert!((out.score - 96.0).abs() < 1e-9);
    }
}
