//! Selection Rule Engine.
//!
//! Rules run in configured order over the normalized ratios. Each rule takes
//! its picks from candidates no earlier rule consumed and reserves a fraction
//! of the total; the unconsumed subjects with a positive ratio share the
//! remaining base pool.

use std::collections::{BTreeMap, BTreeSet};

use pe_core::{CalcLog, SelectionRule, Subject, SubjectRatios};

/// Outcome of one rule.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleOutcome {
    pub rule_index: usize,
    /// Selected subjects, best first.
    pub selected: Vec<Subject>,
    /// Fraction of the total reserved by this rule (after any scaling).
    pub reserved: f64,
    pub contribution: f64,
}

/// Pre-ratio composite.
#[derive(Clone, Debug, PartialEq)]
pub struct Composite {
    pub rules: Vec<RuleOutcome>,
    pub consumed: BTreeSet<Subject>,
    /// Total fraction reserved by rules, at most 1.
    pub reserved: f64,
    /// Subjects that fed the base ratio pool.
    pub base_subjects: Vec<Subject>,
    pub base_total: f64,
    pub base_contribution: f64,
    /// Base pool contribution + rule contributions.
    pub raw_total: f64,
}

fn norm_of(norms: &BTreeMap<Subject, f64>, s: Subject) -> f64 {
    norms.get(&s).copied().unwrap_or(0.0)
}

/// Candidates of `from` not yet consumed, best first. Ties keep subject order.
fn ranked(
    from: &[Subject],
    consumed: &BTreeSet<Subject>,
    norms: &BTreeMap<Subject, f64>,
) -> Vec<Subject> {
    let uniq: BTreeSet<Subject> = from.iter().copied().filter(|s| !consumed.contains(s)).collect();
    let mut out: Vec<Subject> = uniq.into_iter().collect();
    out.sort_by(|a, b| norm_of(norms, *b).total_cmp(&norm_of(norms, *a)).then(a.cmp(b)));
    out
}

/// Weights as fractions; a list with any value above 1 is read as percents.
pub fn weight_fractions(weights: &[f64]) -> Vec<f64> {
    let percent = weights.iter().any(|w| *w > 1.0);
    weights
        .iter()
        .map(|w| {
            let w = if w.is_finite() { w.max(0.0) } else { 0.0 };
            if percent {
                w / 100.0
            } else {
                w
            }
        })
        .collect()
}

fn labels(subjects: &[Subject]) -> String {
    subjects.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

/// Apply `rules` and the base ratio pool to produce the pre-ratio raw total.
pub fn compose(
    norms: &BTreeMap<Subject, f64>,
    ratios: &SubjectRatios,
    rules: &[SelectionRule],
    total: f64,
    log: &mut CalcLog,
) -> Composite {
    let mut consumed: BTreeSet<Subject> = BTreeSet::new();
    let mut outcomes: Vec<RuleOutcome> = Vec::new();

    for (i, rule) in rules.iter().enumerate() {
        let outcome = match rule {
            SelectionRule::SelectN { from, count, ratio } => {
                let mut selected = ranked(from, &consumed, norms);
                selected.truncate(*count);
                let (reserved, contribution) = match ratio {
                    Some(r) => {
                        let frac = (r / 100.0).max(0.0);
                        let avg = if selected.is_empty() {
                            0.0
                        } else {
                            let sum: f64 = selected.iter().map(|s| norm_of(norms, *s)).sum();
                            sum / selected.len() as f64
                        };
                        (frac, avg * frac * total)
                    }
                    None => {
                        let frac: f64 =
                            selected.iter().map(|s| ratios.get(*s).max(0.0) / 100.0).sum();
                        let contrib: f64 = selected
                            .iter()
                            .map(|s| norm_of(norms, *s) * ratios.get(*s).max(0.0) / 100.0 * total)
                            .sum();
                        (frac, contrib)
                    }
                };
                log.push(format!(
                    "rule {i} select_n: top {} of [{}] → [{}], reserve {:.4}, contribution {:.4}",
                    count,
                    labels(from),
                    labels(&selected),
                    reserved,
                    contribution
                ));
                RuleOutcome {
                    rule_index: i,
                    selected,
                    reserved,
                    contribution,
                }
            }
            SelectionRule::SelectRankedWeights { from, weights } => {
                let ws = weight_fractions(weights);
                // `consumed` holds picks of every earlier rule, `select_n` included,
                // so a subject is never weighted twice.
                let mut selected = ranked(from, &consumed, norms);
                selected.truncate(ws.len());
                let contribution: f64 = selected
                    .iter()
                    .zip(ws.iter())
                    .map(|(s, w)| norm_of(norms, *s) * w * total)
                    .sum();
                let reserved: f64 = ws.iter().sum();
                log.push(format!(
                    "rule {i} ranked weights: [{}] x {:?}, reserve {:.4}, contribution {:.4}",
                    labels(&selected),
                    ws,
                    reserved,
                    contribution
                ));
                RuleOutcome {
                    rule_index: i,
                    selected,
                    reserved,
                    contribution,
                }
            }
        };
        consumed.extend(outcome.selected.iter().copied());
        outcomes.push(outcome);
    }

    let mut reserved: f64 = outcomes.iter().map(|o| o.reserved).sum();
    if reserved > 1.0 {
        let scale = 1.0 / reserved;
        for o in &mut outcomes {
            o.reserved *= scale;
            o.contribution *= scale;
        }
        log.push(format!("rules reserve {reserved:.4} > 1; scaled by {scale:.4}"));
        tracing::debug!(reserved, scale, "selection rules scaled to full reserve");
        reserved = 1.0;
    }

    let base_total = total * (1.0 - reserved);
    let mut ratio_sum = 0.0;
    let mut weighted = 0.0;
    let mut base_subjects = Vec::new();
    for s in Subject::ALL {
        let r = ratios.get(s);
        if r > 0.0 && !consumed.contains(&s) {
            ratio_sum += r;
            weighted += r * norm_of(norms, s);
            base_subjects.push(s);
        }
    }
    let base_contribution = if ratio_sum > 0.0 {
        weighted / ratio_sum * base_total
    } else {
        0.0
    };
    log.push(format!(
        "base pool [{}]: ({weighted:.4} / {ratio_sum}) x {base_total:.4} = {base_contribution:.4}",
        labels(&base_subjects)
    ));

    let raw_total = base_contribution + outcomes.iter().map(|o| o.contribution).sum::<f64>();
    log.push(format!("pre-ratio raw total = {raw_total:.4}"));

    Composite {
        rules: outcomes,
        consumed,
        reserved,
        base_subjects,
        base_total,
        base_contribution,
        raw_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norms() -> BTreeMap<Subject, f64> {
        BTreeMap::from([
            (Subject::Language, 0.9),
            (Subject::Math, 0.6),
            (Subject::English, 0.8),
            (Subject::Elective, 0.5),
        ])
    }

    fn ratios() -> SubjectRatios {
        SubjectRatios {
            language: 25.0,
            math: 25.0,
            english: 25.0,
            elective: 25.0,
            history: 0.0,
        }
    }

    #[test]
    fn plain_ratio_pool() {
        let mut log = CalcLog::new();
        let c = compose(&norms(), &ratios(), &[], 100.0, &mut log);
        assert!((c.raw_total - 70.0).abs() < 1e-9);
        assert!(c.consumed.is_empty());
    }

    #[test]
    fn select_n_with_ratio_reserves_share() {
        let rules = vec![SelectionRule::SelectN {
            from: vec![Subject::Language, Subject::Math, Subject::English],
            count: 2,
            ratio: Some(60.0),
        }];
        let mut log = CalcLog::new();
        let c = compose(&norms(), &ratios(), &rules, 100.0, &mut log);
        assert_eq!(c.rules[0].selected, vec![Subject::Language, Subject::English]);
        // (0.9 + 0.8) / 2 * 60 = 51; base: math + elective over 40 = (0.6 + 0.5) / 2 * 40 = 22
        assert!((c.raw_total - 73.0).abs() < 1e-9);
        assert_eq!(c.base_subjects, vec![Subject::Math, Subject::Elective]);
    }

    #[test]
    fn ranked_weights_skip_consumed_and_scale_over_reserve() {
        let rules = vec![
            SelectionRule::SelectN {
                from: vec![Subject::Language],
                count: 1,
                ratio: Some(50.0),
            },
            SelectionRule::SelectRankedWeights {
                from: vec![Subject::Language, Subject::Math, Subject::English],
                weights: vec![60.0, 40.0],
            },
        ];
        let mut log = CalcLog::new();
        let c = compose(&norms(), &ratios(), &rules, 100.0, &mut log);
        assert_eq!(c.rules[1].selected, vec![Subject::English, Subject::Math]);
        assert_eq!(c.reserved, 1.0);
        // raw: 45 + (48 + 24) = 117, scaled by 1/1.5
        assert!((c.raw_total - 78.0).abs() < 1e-9);
        assert_eq!(c.base_total, 0.0);
        assert!(log.mentions("scaled"));
    }

    #[test]
    fn fractions_and_percents_read_alike() {
        assert_eq!(weight_fractions(&[0.5, 0.3]), vec![0.5, 0.3]);
        assert_eq!(weight_fractions(&[50.0, 30.0]), vec![0.5, 0.3]);
    }
}
