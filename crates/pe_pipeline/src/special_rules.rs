//! Practical special-mode registry: institution ID → aggregate rule.
//!
//! Each family is a pure function over the scored events; `Aggregate`
//! carries the parameters of one institution and dispatches to its family.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use pe_algo::EventScore;
use pe_core::{CalcLog, PracticalFormulaData};

/// Everything an aggregate may read.
#[derive(Clone, Copy, Debug)]
pub struct RuleInput<'a> {
    pub events: &'a [EventScore],
    /// Per-event table maximum for the student's gender.
    pub maxima: &'a BTreeMap<String, f64>,
    pub formula: &'a PracticalFormulaData,
}

impl RuleInput<'_> {
    fn points(&self) -> Vec<f64> {
        self.events.iter().map(EventScore::points_or_zero).collect()
    }

    fn sum(&self) -> f64 {
        self.points().iter().sum()
    }

    fn max_of(&self, event: &str) -> f64 {
        self.maxima.get(event).copied().unwrap_or(0.0)
    }
}

/// A special-mode practical aggregate.
pub trait PracticalRule: Send + Sync {
    fn total(&self, input: &RuleInput<'_>, log: &mut CalcLog) -> f64;
}

impl<F> PracticalRule for F
where
    F: Fn(&RuleInput<'_>, &mut CalcLog) -> f64 + Send + Sync,
{
    fn total(&self, input: &RuleInput<'_>, log: &mut CalcLog) -> f64 {
        self(input, log)
    }
}

// ----------------------------- Families ------------------------------------------------

/// Σ points + base score.
pub fn sum_plus_base(input: &RuleInput<'_>, log: &mut CalcLog) -> f64 {
    let sum = input.sum();
    let total = sum + input.formula.base_score;
    log.push(format!("sum {sum} + base {} = {total}", input.formula.base_score));
    total
}

/// Best `n` events, rescaled so their table maxima map to the target maximum.
pub fn top_n_rescaled(input: &RuleInput<'_>, n: usize, log: &mut CalcLog) -> f64 {
    let mut scored: Vec<(&EventScore, f64)> =
        input.events.iter().map(|e| (e, e.points_or_zero())).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(n);
    let got: f64 = scored.iter().map(|(_, p)| p).sum();
    let denom: f64 = scored.iter().map(|(e, _)| input.max_of(&e.event)).sum();
    let names: Vec<&str> = scored.iter().map(|(e, _)| e.event.as_str()).collect();
    if denom <= 0.0 {
        log.push(format!("top {n} [{}]: zero table maximum, score 0", names.join(", ")));
        return 0.0;
    }
    let total = got / denom * input.formula.target_max;
    log.push(format!(
        "top {n} [{}]: {got} / {denom} x {} = {total:.4}",
        names.join(", "),
        input.formula.target_max
    ));
    total
}

fn pass_count(input: &RuleInput<'_>) -> usize {
    input.events.iter().filter(|e| e.passed).count()
}

/// PASS count × points per pass + offset.
pub fn pass_count_linear(
    input: &RuleInput<'_>,
    per_pass: f64,
    offset: f64,
    log: &mut CalcLog,
) -> f64 {
    let passes = pass_count(input);
    let total = passes as f64 * per_pass + offset;
    log.push(format!("PASS x{passes} x {per_pass} + {offset} = {total}"));
    total
}

/// Score indexed by PASS count (counts past the end use the last tier).
pub fn pass_count_tiers(input: &RuleInput<'_>, tiers: &[f64], log: &mut CalcLog) -> f64 {
    let passes = pass_count(input);
    let total = tiers.get(passes).or_else(|| tiers.last()).copied().unwrap_or(0.0);
    log.push(format!("PASS x{passes} → tier score {total}"));
    total
}

/// Σ weight × points for events whose name contains the key, + base score.
pub fn weighted_events(input: &RuleInput<'_>, weights: &[(String, f64)], log: &mut CalcLog) -> f64 {
    let mut total = input.formula.base_score;
    for (key, w) in weights {
        let p: f64 = input
            .events
            .iter()
            .filter(|e| e.event.contains(key.as_str()))
            .map(EventScore::points_or_zero)
            .sum();
        log.push(format!("{key}: {p} x {w}"));
        total += p * w;
    }
    log.push(format!("weighted total (+ base {}) = {total:.4}", input.formula.base_score));
    total
}

/// Step function on Σ points: first step whose threshold the sum reaches.
/// Steps are `(threshold, score)`, tried from the highest threshold.
pub fn step_lookup(input: &RuleInput<'_>, steps: &[(f64, f64)], log: &mut CalcLog) -> f64 {
    let sum = input.sum();
    let mut sorted: Vec<(f64, f64)> = steps.to_vec();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    let total = sorted.iter().find(|(t, _)| sum >= *t).map(|(_, s)| *s).unwrap_or(0.0);
    log.push(format!("step lookup on sum {sum} → {total}"));
    total
}

/// Mean points / mean table maximum × target maximum.
pub fn average_rescaled(input: &RuleInput<'_>, log: &mut CalcLog) -> f64 {
    let n = input.events.len();
    if n == 0 {
        log.push("average: no events, score 0");
        return 0.0;
    }
    let avg = input.sum() / n as f64;
    let max_avg = input.events.iter().map(|e| input.max_of(&e.event)).sum::<f64>() / n as f64;
    if max_avg <= 0.0 {
        log.push("average: zero table maximum, score 0");
        return 0.0;
    }
    let total = avg / max_avg * input.formula.target_max;
    log.push(format!(
        "average {avg:.4} / {max_avg:.4} x {} = {total:.4}",
        input.formula.target_max
    ));
    total
}

/// Best single event relative to its own maximum × target maximum.
pub fn best_single_rescaled(input: &RuleInput<'_>, log: &mut CalcLog) -> f64 {
    let best = input
        .events
        .iter()
        .filter_map(|e| {
            let m = input.max_of(&e.event);
            (m > 0.0).then(|| (e, e.points_or_zero() / m))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    match best {
        Some((e, ratio)) => {
            let total = ratio * input.formula.target_max;
            log.push(format!("best single {}: ratio {ratio:.4} → {total:.4}", e.event));
            total
        }
        None => {
            log.push("best single: no scorable event, score 0");
            0.0
        }
    }
}

/// `start` − Σ deduction tier × per-tier penalty, floored at 0.
pub fn deduction_penalty(
    input: &RuleInput<'_>,
    start: f64,
    per_tier: f64,
    log: &mut CalcLog,
) -> f64 {
    let tiers: u32 = input.events.iter().filter_map(|e| e.tier).sum();
    let total = (start - f64::from(tiers) * per_tier).max(0.0);
    log.push(format!("{start} - {tiers} tiers x {per_tier} = {total}"));
    total
}

/// min(Σ points + base, cap).
pub fn capped_sum(input: &RuleInput<'_>, cap: f64, log: &mut CalcLog) -> f64 {
    let raw = input.sum() + input.formula.base_score;
    let total = raw.min(cap);
    log.push(format!("sum + base = {raw}, capped at {cap} → {total}"));
    total
}

// ----------------------------- Parameterizations ---------------------------------------

/// One institution's aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregate {
    SumPlusBase,
    TopN { n: usize },
    PassCount { per_pass: f64, offset: f64 },
    PassTiers { tiers: Vec<f64> },
    Weighted { weights: Vec<(String, f64)> },
    Steps { steps: Vec<(f64, f64)> },
    Average,
    BestSingle,
    /// Any missing event scores 0; otherwise the inner aggregate.
    AllRequired(Box<Aggregate>),
    DeductionPenalty { start: f64, per_tier: f64 },
    Capped { cap: f64 },
}

impl PracticalRule for Aggregate {
    fn total(&self, input: &RuleInput<'_>, log: &mut CalcLog) -> f64 {
        match self {
            Aggregate::SumPlusBase => sum_plus_base(input, log),
            Aggregate::TopN { n } => top_n_rescaled(input, *n, log),
            Aggregate::PassCount { per_pass, offset } => {
                pass_count_linear(input, *per_pass, *offset, log)
            }
            Aggregate::PassTiers { tiers } => pass_count_tiers(input, tiers, log),
            Aggregate::Weighted { weights } => weighted_events(input, weights, log),
            Aggregate::Steps { steps } => step_lookup(input, steps, log),
            Aggregate::Average => average_rescaled(input, log),
            Aggregate::BestSingle => best_single_rescaled(input, log),
            Aggregate::AllRequired(inner) => {
                let missing: Vec<&str> = input
                    .events
                    .iter()
                    .filter(|e| e.points.is_none())
                    .map(|e| e.event.as_str())
                    .collect();
                if missing.is_empty() {
                    inner.total(input, log)
                } else {
                    log.push(format!(
                        "all events required; missing [{}] → 0",
                        missing.join(", ")
                    ));
                    0.0
                }
            }
            Aggregate::DeductionPenalty { start, per_tier } => {
                deduction_penalty(input, *start, *per_tier, log)
            }
            Aggregate::Capped { cap } => capped_sum(input, *cap, log),
        }
    }
}

fn w(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Institution ID → practical aggregate.
#[derive(Clone, Default)]
pub struct PracticalRegistry {
    rules: BTreeMap<String, Arc<dyn PracticalRule>>,
}

impl PracticalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let table: Vec<(&str, Aggregate)> = vec![
            ("P201", Aggregate::SumPlusBase),
            ("P202", Aggregate::TopN { n: 2 }),
            ("P203", Aggregate::TopN { n: 3 }),
            ("P204", Aggregate::PassCount { per_pass: 100.0, offset: 200.0 }),
            ("P205", Aggregate::PassCount { per_pass: 50.0, offset: 0.0 }),
            ("P206", Aggregate::PassTiers { tiers: vec![0.0, 60.0, 80.0, 100.0] }),
            ("P207", Aggregate::PassTiers { tiers: vec![100.0, 200.0, 300.0] }),
            (
                "P208",
                Aggregate::Weighted {
                    weights: w(&[("멀리", 0.4), ("달리기", 0.3), ("윗몸", 0.3)]),
                },
            ),
            (
                "P209",
                Aggregate::Weighted {
                    weights: w(&[("메디신볼", 0.5), ("제자리", 0.5)]),
                },
            ),
            (
                "P210",
                Aggregate::Steps {
                    steps: vec![
                        (270.0, 300.0),
                        (240.0, 270.0),
                        (200.0, 240.0),
                        (150.0, 200.0),
                        (0.0, 150.0),
                    ],
                },
            ),
            (
                "P211",
                Aggregate::Steps {
                    steps: vec![(180.0, 100.0), (150.0, 90.0), (120.0, 80.0), (0.0, 70.0)],
                },
            ),
            ("P212", Aggregate::Average),
            ("P213", Aggregate::BestSingle),
            ("P214", Aggregate::AllRequired(Box::new(Aggregate::SumPlusBase))),
            ("P215", Aggregate::AllRequired(Box::new(Aggregate::TopN { n: 3 }))),
            ("P216", Aggregate::DeductionPenalty { start: 300.0, per_tier: 5.0 }),
            ("P217", Aggregate::DeductionPenalty { start: 100.0, per_tier: 2.0 }),
            ("P218", Aggregate::Capped { cap: 300.0 }),
            ("P219", Aggregate::Capped { cap: 400.0 }),
            ("P220", Aggregate::AllRequired(Box::new(Aggregate::Average))),
        ];
        let mut r = Self::new();
        for (id, agg) in table {
            r.register(id, agg);
        }
        r
    }

    pub fn register(&mut self, id: impl Into<String>, rule: impl PracticalRule + 'static) {
        self.rules.insert(id.into(), Arc::new(rule));
    }

    pub fn get(&self, id: &str) -> Option<&dyn PracticalRule> {
        self.rules.get(id.trim()).map(|r| r.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl core::fmt::Debug for PracticalRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.rules.keys()).finish()
    }
}

/// Shared built-in registry.
pub fn builtin_practical_registry() -> &'static PracticalRegistry {
    static REGISTRY: OnceLock<PracticalRegistry> = OnceLock::new();
    REGISTRY.get_or_init(PracticalRegistry::builtin)
}
