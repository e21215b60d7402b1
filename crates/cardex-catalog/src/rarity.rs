//! Weighted rarity assignment.
//!
//! Popular items (high appearance counts) are pulled *less* often:
//!
//! ```text
//! total        = Σ score
//! inverted[i]  = total - score[i]
//! adjusted[i]  = inverted[i] - (min(inverted) - 1)     // never 0
//! p[i]         = adjusted[i] / Σ adjusted
//! ```
//!
//! Tiers split `[0, max(p)]` into [`TIER_COUNT`] equal-width buckets. Each
//! probability takes the bucket of the first threshold at or above it, so
//! the least likely items land in bucket 1 (epic) and the most likely in
//! the last bucket (common). Bucket 0 (legendary) is never produced.

use cardex_types::{RarityTier, constants::TIER_COUNT};

/// Probability and tier of one catalog item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RarityAssignment {
    pub probability: f64,
    pub tier: RarityTier,
}

/// Normalized extraction probabilities, in input order.
///
/// Sums to 1 (within floating-point tolerance); every value is > 0.
/// Empty input yields an empty output.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn extraction_probabilities(scores: &[u64]) -> Vec<f64> {
    let total: u128 = scores.iter().map(|&s| u128::from(s)).sum();
    let inverted: Vec<u128> = scores.iter().map(|&s| total - u128::from(s)).collect();
    let Some(floor) = inverted.iter().copied().min() else {
        return Vec::new();
    };

    // Shifting by (floor - 1) keeps the most popular item at weight 1.
    let adjusted: Vec<u128> = inverted.iter().map(|&x| x - floor + 1).collect();
    let sum: u128 = adjusted.iter().sum();

    adjusted.iter().map(|&a| a as f64 / sum as f64).collect()
}

/// Lower bounds of the tier buckets: `[0, step, 2·step, …]` with
/// `step = max / TIER_COUNT`.
///
/// The first bound must be `0.0` so the least likely item still falls
/// into a bucket.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn tier_thresholds(max_probability: f64) -> [f64; TIER_COUNT] {
    let step = max_probability / TIER_COUNT as f64;
    let mut thresholds = [0.0; TIER_COUNT];
    for (i, t) in thresholds.iter_mut().enumerate() {
        *t = step * i as f64;
    }
    thresholds
}

/// Bucket of `probability`: index of the first threshold at or above it,
/// never below 1 and falling back to the last index when every threshold
/// is smaller.
#[must_use]
pub fn bucket_of(thresholds: &[f64], probability: f64) -> usize {
    let last = thresholds.len().saturating_sub(1);
    thresholds
        .partition_point(|&t| t < probability)
        .clamp(1.min(last), last)
}

/// Probability and tier for every score, in input order.
#[must_use]
pub fn assign_rarity(scores: &[u64]) -> Vec<RarityAssignment> {
    let probabilities = extraction_probabilities(scores);
    let max = probabilities.iter().copied().fold(0.0_f64, f64::max);
    let thresholds = tier_thresholds(max);

    probabilities
        .into_iter()
        .map(|probability| RarityAssignment {
            probability,
            tier: RarityTier::from_bucket(bucket_of(&thresholds, probability)),
        })
        .collect()
}
