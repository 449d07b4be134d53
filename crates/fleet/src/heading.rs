//! Compass heading arithmetic.
//!
//! Headings are degrees clockwise from north. Every function here is total:
//! non-finite input is treated as north rather than propagated.

/// Folds any angle into `[0, 360)`. Non-finite input maps to `0`.
#[must_use]
pub fn normalize(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let folded = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if folded >= 360.0 { 0.0 } else { folded }
}

/// Signed difference in `(-180, 180]` that, added to `from`, reaches `to`
/// along the shorter arc.
#[must_use]
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let delta = normalize(to) - normalize(from);
    if delta > 180.0 {
        delta - 360.0
    } else if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

/// Heading after `step` of `steps` equal increments from `from` towards `to`.
/// The final step returns `normalize(to)` exactly.
#[must_use]
pub fn step_towards(from: f64, to: f64, step: u32, steps: u32) -> f64 {
    if steps == 0 || step >= steps {
        return normalize(to);
    }
    let fraction = f64::from(step) / f64::from(steps);
    normalize(shortest_delta(from, to).mul_add(fraction, from))
}
