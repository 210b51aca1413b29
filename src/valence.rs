//! Valence calculation
//!
//! Collapses a 7-way emotion score vector into a single affective valence
//! scalar in [0, 1]: 0 is fully negative, 1 fully positive, 0.5 neutral.

use crate::types::{EmotionCategory, EmotionScoreVector};

/// Valence reported when neutral dominates or no affect is present
pub const NEUTRAL_VALENCE: f64 = 0.5;

/// Compute valence from classifier scores.
///
/// Positive affect is the strongest of happy/surprise, negative affect the
/// strongest of sad/anger/disgust/fear. When neutral is not strictly beaten by
/// either, the frame counts as neutral. A frame with zero positive and zero
/// negative affect is also neutral.
pub fn calculate_valence(scores: &EmotionScoreVector) -> f64 {
    let positive = scores.max_of(&EmotionCategory::POSITIVE);
    let negative = scores.max_of(&EmotionCategory::NEGATIVE);
    let neutral = scores.score(EmotionCategory::Neutral);

    let affect = positive + negative;
    if (neutral < positive || neutral < negative) && affect > 0.0 {
        positive / affect
    } else {
        NEUTRAL_VALENCE
    }
}
