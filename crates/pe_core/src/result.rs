//! Calculation result and the per-call audit log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rounding::{format_fixed, round_dp};

/// Decimal places of every reported score.
pub const SCORE_DP: u32 = 2;

/// Named sub-totals. `None` marks an absent input (distinct from a zero score).
pub type Breakdown = BTreeMap<String, Option<f64>>;

/// Append-only, human-readable derivation log. One line per derivation step.
/// Created fresh by every entry point; never shared between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalcLog {
    lines: Vec<String>,
}

impl CalcLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether any line contains `needle` (used by callers and tests to
    /// check that a degradation was recorded).
    pub fn mentions(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

/// Final score, breakdown, and the full audit log of one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Final score rounded to two decimals.
    pub score: f64,
    /// `score` as fixed two-decimal text.
    pub score_text: String,
    pub breakdown: Breakdown,
    pub log: CalcLog,
}

impl CalculationResult {
    pub fn new(score: f64, breakdown: Breakdown, log: CalcLog) -> Self {
        Self {
            score: round_dp(score, SCORE_DP),
            score_text: format_fixed(score, SCORE_DP),
            breakdown,
            log,
        }
    }

    /// Zero score with an empty breakdown; the log explains why.
    pub fn empty(log: CalcLog) -> Self {
        Self::new(0.0, Breakdown::new(), log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_formats_to_two_places() {
        let mut log = CalcLog::new();
        log.push("total = 379.996");
        let r = CalculationResult::new(379.996, Breakdown::new(), log);
        assert_eq!(r.score, 380.0);
        assert_eq!(r.score_text, "380.00");
        assert!(r.log.mentions("379.996"));
    }

    #[test]
    fn log_serializes_as_plain_list() {
        let mut log = CalcLog::new();
        log.push("a");
        log.push("b");
        assert_eq!(serde_json::to_string(&log).unwrap(), r#"["a","b"]"#);
    }
}
