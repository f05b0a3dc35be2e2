//! Practical Lookup: scores one event record against the institution table.
//!
//! - direction: explicit override, then event-name keywords
//! - matching: literal tokens, then range expressions in table order, then
//!   numeric thresholds best-first
//! - deduction tier: explicit row tier, else rank among distinct table scores

use std::collections::BTreeMap;

use pe_core::{
    safe_parse::parse_number_text, CalcLog, Direction, Gender, OutOfRangePolicy,
    PracticalFormulaData, PracticalRow,
};

const HIGHER_KEYWORDS: [&str; 16] = [
    "멀리", "던지기", "높이", "윗몸", "턱걸이", "팔굽혀", "배근력", "악력", "좌전굴", "서전트",
    "점프", "throw", "jump", "cm", "kg", "회",
];

const LOWER_KEYWORDS: [&str; 9] = [
    "달리기", "왕복", "초", "런", "run", "sprint", "sec", "shuttle", "m",
];

const EPS: f64 = 1e-9;

/// Comparison direction for an event. Overrides win; otherwise
/// higher-is-better keywords are checked before lower-is-better ones, and an
/// unrecognized name is higher-is-better.
pub fn infer_direction(event: &str, overrides: &BTreeMap<String, Direction>) -> Direction {
    if let Some(d) = overrides.get(event).or_else(|| overrides.get(event.trim())) {
        return *d;
    }
    let name = event.to_lowercase();
    if HIGHER_KEYWORDS.iter().any(|k| name.contains(k)) {
        return Direction::HigherIsBetter;
    }
    if LOWER_KEYWORDS.iter().any(|k| name.contains(k)) {
        return Direction::LowerIsBetter;
    }
    Direction::HigherIsBetter
}

// ----------------------------- Row criteria --------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
enum Cmp {
    Ge,
    Le,
    Gt,
    Lt,
}

impl Cmp {
    fn holds(self, x: f64, bound: f64) -> bool {
        match self {
            Cmp::Ge => x >= bound - EPS,
            Cmp::Le => x <= bound + EPS,
            Cmp::Gt => x > bound + EPS,
            Cmp::Lt => x < bound - EPS,
        }
    }
}

/// How a table row's record cell is read.
#[derive(Clone, Debug, PartialEq)]
enum Criterion {
    Threshold(f64),
    Range(Cmp, f64),
    Between(f64, f64),
    Token(String),
}

const PREFIXES: [(&str, Cmp); 6] = [
    (">=", Cmp::Ge),
    ("<=", Cmp::Le),
    ("≥", Cmp::Ge),
    ("≤", Cmp::Le),
    (">", Cmp::Gt),
    ("<", Cmp::Lt),
];

const SUFFIXES: [(&str, Cmp); 4] = [
    ("이상", Cmp::Ge),
    ("이하", Cmp::Le),
    ("초과", Cmp::Gt),
    ("미만", Cmp::Lt),
];

fn criterion(record: &str) -> Criterion {
    let t = record.trim();
    if let Some(x) = parse_number_text(t) {
        return Criterion::Threshold(x);
    }
    for (p, cmp) in PREFIXES {
        if let Some(x) = t.strip_prefix(p).and_then(parse_number_text) {
            return Criterion::Range(cmp, x);
        }
    }
    for (s, cmp) in SUFFIXES {
        if let Some(x) = t.strip_suffix(s).and_then(parse_number_text) {
            return Criterion::Range(cmp, x);
        }
    }
    if let Some((a, b)) = t.split_once('~') {
        if let (Some(a), Some(b)) = (parse_number_text(a), parse_number_text(b)) {
            return Criterion::Between(a.min(b), a.max(b));
        }
    }
    Criterion::Token(t.to_string())
}

// ----------------------------- Event scoring -------------------------------------------

/// How an event score was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// No record: no points and no tier.
    Missing,
    Literal,
    Range,
    Threshold,
    /// Present record that no row matched; scored by the out-of-range policy.
    OutOfRange,
}

/// Score of one event for one student.
#[derive(Clone, Debug, PartialEq)]
pub struct EventScore {
    pub event: String,
    pub direction: Direction,
    pub value: Option<String>,
    /// `None` only for a missing record.
    pub points: Option<f64>,
    pub tier: Option<u32>,
    /// Matched row carries a PASS token.
    pub passed: bool,
    pub matched: MatchKind,
}

impl EventScore {
    pub fn points_or_zero(&self) -> f64 {
        self.points.unwrap_or(0.0)
    }
}

/// Number of distinct table scores strictly above `points`.
pub fn deduction_tier(rows: &[&PracticalRow], points: f64) -> u32 {
    let mut distinct: Vec<f64> = rows.iter().map(|r| r.score.points()).collect();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| (*a - *b).abs() < EPS);
    distinct.iter().filter(|s| **s > points + EPS).count() as u32
}

/// Highest score any row of `event` offers `gender`.
pub fn event_max(formula: &PracticalFormulaData, event: &str, gender: Gender) -> Option<f64> {
    formula.rows_for(event, gender).map(|r| r.score.points()).reduce(f64::max)
}

fn find_row<'a>(
    rows: &[&'a PracticalRow],
    value: &str,
    direction: Direction,
) -> Option<(&'a PracticalRow, MatchKind)> {
    let parsed: Vec<(&PracticalRow, Criterion)> =
        rows.iter().map(|r| (*r, criterion(&r.record))).collect();

    let literal = value.trim();
    if let Some((row, _)) = parsed
        .iter()
        .find(|(_, c)| matches!(c, Criterion::Token(t) if t.eq_ignore_ascii_case(literal)))
    {
        return Some((*row, MatchKind::Literal));
    }

    let x = parse_number_text(value)?;

    for (row, c) in &parsed {
        let hit = match c {
            Criterion::Range(cmp, bound) => cmp.holds(x, *bound),
            Criterion::Between(lo, hi) => x >= lo - EPS && x <= hi + EPS,
            _ => false,
        };
        if hit {
            return Some((*row, MatchKind::Range));
        }
    }

    let mut thresholds: Vec<(f64, &PracticalRow)> = parsed
        .iter()
        .filter_map(|(r, c)| match c {
            Criterion::Threshold(t) => Some((*t, *r)),
            _ => None,
        })
        .collect();
    match direction {
        Direction::HigherIsBetter => {
            thresholds.sort_by(|a, b| b.0.total_cmp(&a.0));
            thresholds
                .into_iter()
                .find(|(t, _)| x >= t - EPS)
                .map(|(_, r)| (r, MatchKind::Threshold))
        }
        Direction::LowerIsBetter => {
            thresholds.sort_by(|a, b| a.0.total_cmp(&b.0));
            thresholds
                .into_iter()
                .find(|(t, _)| x <= t + EPS)
                .map(|(_, r)| (r, MatchKind::Threshold))
        }
    }
}

/// Score one event record.
pub fn lookup_event(
    formula: &PracticalFormulaData,
    event: &str,
    gender: Gender,
    value: Option<&str>,
    log: &mut CalcLog,
) -> EventScore {
    let direction = infer_direction(event, &formula.directions);
    let value = value.map(str::trim).filter(|v| !v.is_empty());

    let Some(value) = value else {
        log.push(format!("{event}: no record, not scored"));
        return EventScore {
            event: event.to_string(),
            direction,
            value: None,
            points: None,
            tier: None,
            passed: false,
            matched: MatchKind::Missing,
        };
    };

    let rows: Vec<&PracticalRow> = formula.rows_for(event, gender).collect();
    if rows.is_empty() {
        tracing::warn!(event, gender = gender.as_str(), "no practical table rows for event");
        log.push(format!("{event}: no table rows for gender {gender}"));
    }

    let (points, tier, passed, matched) = match find_row(&rows, value, direction) {
        Some((row, kind)) => {
            let points = row.score.points();
            let tier = row
                .deduction
                .map(u32::from)
                .unwrap_or_else(|| deduction_tier(&rows, points));
            (points, tier, row.score.is_pass(), kind)
        }
        None => {
            let points = match formula.out_of_range {
                OutOfRangePolicy::Zero => 0.0,
                OutOfRangePolicy::Lowest => rows
                    .iter()
                    .map(|r| r.score.points())
                    .reduce(f64::min)
                    .unwrap_or(0.0),
            };
            log.push(format!(
                "{event}: record {value} outside table, policy {} → {points}",
                formula.out_of_range.as_str()
            ));
            (points, deduction_tier(&rows, points), false, MatchKind::OutOfRange)
        }
    };
    log.push(format!(
        "{event} ({}): {value} → {points} (tier {tier}{})",
        direction.as_str(),
        if passed { ", PASS" } else { "" }
    ));

    EventScore {
        event: event.to_string(),
        direction,
        value: Some(value.to_string()),
        points: Some(points),
        tier: Some(tier),
        passed,
        matched,
    }
}
