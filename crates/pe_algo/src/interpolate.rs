//! Grade-cut interpolation and elective percentile → converted-score mapping.
//!
//! Both mappers share the same bracket policy:
//! - rows sorted descending by key
//! - exact key match short-circuits to that row
//! - keys above the top row / below the bottom row clamp to the extreme row
//! - otherwise linear interpolation between the bracketing pair

use core::cmp::Ordering;

use pe_core::{rounding::round_half_away, ConversionRow, GradeCut};

/// Interpolated exam values for one raw score.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Interpolated {
    pub standard: f64,
    pub percentile: f64,
    pub grade: u8,
}

impl From<&GradeCut> for Interpolated {
    fn from(c: &GradeCut) -> Self {
        Self {
            standard: c.standard,
            percentile: c.percentile,
            grade: c.grade,
        }
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Estimate (standard, percentile, grade) for `raw` from an unsorted grade-cut table.
///
/// Interpolated standard score and percentile are rounded to the nearest
/// integer; the grade is taken from the lower bracket row. Returns `None` for
/// an empty table or a non-finite raw score.
pub fn interpolate_score(raw: f64, cuts: &[GradeCut]) -> Option<Interpolated> {
    if cuts.is_empty() || !raw.is_finite() {
        return None;
    }
    let mut rows: Vec<&GradeCut> = cuts.iter().collect();
    rows.sort_by(|a, b| desc(a.raw, b.raw));

    if let Some(hit) = rows.iter().find(|c| c.raw == raw) {
        return Some(Interpolated::from(*hit));
    }
    let top = rows[0];
    let bottom = rows[rows.len() - 1];
    if raw > top.raw {
        return Some(Interpolated::from(top));
    }
    if raw < bottom.raw {
        return Some(Interpolated::from(bottom));
    }

    // rows[i].raw > raw > rows[i + 1].raw for exactly one i.
    let (upper, lower) = rows
        .windows(2)
        .map(|w| (w[0], w[1]))
        .find(|(u, l)| u.raw > raw && raw > l.raw)?;

    let t = (raw - lower.raw) / (upper.raw - lower.raw);
    Some(Interpolated {
        standard: round_half_away(lower.standard + t * (upper.standard - lower.standard)),
        percentile: round_half_away(lower.percentile + t * (upper.percentile - lower.percentile)),
        grade: lower.grade,
    })
}

/// Map an elective percentile to its converted standard score.
///
/// The percentile is clamped to [0, 100] and rounded before lookup.
pub fn percentile_to_converted(percentile: f64, table: &[ConversionRow]) -> Option<f64> {
    if table.is_empty() || percentile.is_nan() {
        return None;
    }
    let p = round_half_away(percentile.clamp(0.0, 100.0));

    let mut rows: Vec<&ConversionRow> = table.iter().collect();
    rows.sort_by(|a, b| desc(a.percentile, b.percentile));

    if let Some(hit) = rows.iter().find(|r| r.percentile == p) {
        return Some(hit.converted);
    }
    let top = rows[0];
    let bottom = rows[rows.len() - 1];
    if p > top.percentile {
        return Some(top.converted);
    }
    if p < bottom.percentile {
        return Some(bottom.converted);
    }
    let (upper, lower) = rows
        .windows(2)
        .map(|w| (w[0], w[1]))
        .find(|(u, l)| u.percentile > p && p > l.percentile)?;
    let t = (p - lower.percentile) / (upper.percentile - lower.percentile);
    Some(lower.converted + t * (upper.converted - lower.converted))
}

/// Highest converted score in a table (the `table` max method).
pub fn table_max(table: &[ConversionRow]) -> Option<f64> {
    table.iter().map(|r| r.converted).reduce(f64::max)
}
