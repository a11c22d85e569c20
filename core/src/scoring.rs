//! Confidence combination arithmetic
//!
//! Two rules live here:
//!
//! - [`combine_additive`] for type-inference factors: the capped sum of
//!   non-negative contributions. Adding a factor never lowers the result.
//! - [`consolidate`] for relationship strategies: the strongest signal is kept
//!   intact and the remaining signals close part of the gap to 1.0,
//!
//!   `combined = max + (1 - max) * w * (1 - Π_{others} (1 - s_i))`
//!
//!   where `w` is the corroboration weight. The result is in `[0, 1]`, never
//!   below the strongest contributor, strictly increasing in every additional
//!   positive signal when `w > 0`, and independent of contributor order.

/// Clamp a value into `[0, 1]`; NaN becomes 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Capped sum of non-negative contributions
#[must_use]
pub fn combine_additive<I>(contributions: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let sum: f64 = contributions
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .sum();
    clamp_unit(sum)
}

/// Consolidate independent strategy scores into one confidence value
#[must_use]
pub fn consolidate(scores: &[f64], corroboration_weight: f64) -> f64 {
    let scores: Vec<f64> = scores.iter().copied().map(clamp_unit).collect();
    let Some((max_idx, max)) = scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((idx, s)),
        })
    else {
        return 0.0;
    };

    let residual: f64 = scores
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != max_idx)
        .map(|(_, s)| 1.0 - s)
        .product();
    let corroboration = 1.0 - residual;
    let weight = clamp_unit(corroboration_weight);
    clamp_unit(max + (1.0 - max) * weight * corroboration)
}

/// Bucket label for a confidence value (`0.0-0.2` … `0.8-1.0`)
#[must_use]
pub fn bucket_label(score: f64) -> &'static str {
    let score = clamp_unit(score);
    if score < 0.2 {
        "0.0-0.2"
    } else if score < 0.4 {
        "0.2-0.4"
    } else if score < 0.6 {
        "0.4-0.6"
    } else if score < 0.8 {
        "0.6-0.8"
    } else {
        "0.8-1.0"
    }
}

/// All bucket labels in ascending order
pub const BUCKET_LABELS: [&str; 5] = ["0.0-0.2", "0.2-0.4", "0.4-0.6", "0.6-0.8", "0.8-1.0"];

/// Round to six decimals so serialized output is stable across platforms
#[must_use]
pub fn round_score(value: f64) -> f64 {
    (clamp_unit(value) * 1_000_000.0).round() / 1_000_000.0
}
