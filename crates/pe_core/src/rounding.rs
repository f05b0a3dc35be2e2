//! Float rounding helpers used when reporting scores.
//!
//! - `round_half_away`: nearest integer, ties away from zero
//! - `round_dp`: round to a fixed number of decimal places
//! - `format_fixed`: fixed-decimal text, `-0.00` printed as `0.00`

/// Nearest integer, ties away from zero (`2.5 → 3`, `-2.5 → -3`).
#[inline]
pub fn round_half_away(x: f64) -> f64 {
    x.round()
}

/// Round to `dp` decimal places. Non-finite input yields 0.
pub fn round_dp(x: f64, dp: u32) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(dp as i32);
    let r = (x * scale).round() / scale;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// Render with exactly `dp` decimals.
pub fn format_fixed(x: f64, dp: u32) -> String {
    format!("{:.*}", dp as usize, round_dp(x, dp))
}
